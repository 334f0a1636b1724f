//! # Staff Repository
//!
//! Actor resolution for order attribution.
//!
//! ## Resolution Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  resolve_actor("ext-42")                                                │
//! │       │                                                                 │
//! │       ├── administrators.external_ref = 'ext-42'? → Actor::Admin(id)    │
//! │       │                                                                 │
//! │       ├── employees.external_ref = 'ext-42'?      → Actor::Employee(id) │
//! │       │                                                                 │
//! │       └── neither → None (caller reports a validation failure)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An order is attributed to exactly one of the two kinds; the tagged
//! [`Actor`] variant makes the both-set state unrepresentable.

use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use merx_core::Actor;

/// Repository resolving external identity references to actors.
#[derive(Debug, Clone)]
pub struct StaffRepository {
    pool: SqlitePool,
}

impl StaffRepository {
    /// Creates a new StaffRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StaffRepository { pool }
    }

    /// Resolves an external reference: administrators first, employees
    /// second, `None` when neither lookup succeeds.
    pub async fn resolve_actor(&self, external_ref: &str) -> DbResult<Option<Actor>> {
        let admin: Option<String> =
            sqlx::query_scalar("SELECT id FROM administrators WHERE external_ref = ?1")
                .bind(external_ref)
                .fetch_optional(&self.pool)
                .await?;

        if let Some(id) = admin {
            debug!(external_ref = %external_ref, "Resolved actor as administrator");
            return Ok(Some(Actor::Admin(id)));
        }

        let employee: Option<String> =
            sqlx::query_scalar("SELECT id FROM employees WHERE external_ref = ?1")
                .bind(external_ref)
                .fetch_optional(&self.pool)
                .await?;

        Ok(employee.map(|id| {
            debug!(external_ref = %external_ref, "Resolved actor as employee");
            Actor::Employee(id)
        }))
    }

    /// Inserts an administrator; returns the generated id.
    pub async fn insert_admin(&self, external_ref: &str, name: &str) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();

        sqlx::query("INSERT INTO administrators (id, external_ref, name) VALUES (?1, ?2, ?3)")
            .bind(&id)
            .bind(external_ref)
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(id)
    }

    /// Inserts an employee; returns the generated id.
    pub async fn insert_employee(&self, external_ref: &str, name: &str) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();

        sqlx::query("INSERT INTO employees (id, external_ref, name) VALUES (?1, ?2, ?3)")
            .bind(&id)
            .bind(external_ref)
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(id)
    }
}
