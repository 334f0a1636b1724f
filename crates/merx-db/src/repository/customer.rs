//! # Customer Repository
//!
//! Database operations for buyers. Metrics filter to a company through the
//! buyer's `company_id`; order creation only needs the reference to exist.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use merx_core::Customer;

/// Repository for customer database operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Gets a customer by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            "SELECT id, name, company_id, created_at FROM customers WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Requires a customer to exist inside the caller's transaction.
    pub async fn require(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<Customer> {
        let customer = sqlx::query_as::<_, Customer>(
            "SELECT id, name, company_id, created_at FROM customers WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        customer.ok_or_else(|| DbError::not_found("Customer", id))
    }

    /// Inserts a new customer.
    pub async fn insert(&self, customer: &Customer) -> DbResult<()> {
        debug!(id = %customer.id, name = %customer.name, "Inserting customer");

        sqlx::query(
            "INSERT INTO customers (id, name, company_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.company_id)
        .bind(customer.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Builds a customer with a fresh id and timestamp.
pub fn new_customer(name: &str, company_id: &str) -> Customer {
    Customer {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        company_id: company_id.to_string(),
        created_at: Utc::now(),
    }
}
