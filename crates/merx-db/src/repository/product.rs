//! # Product Repository
//!
//! Database operations for the product catalog.
//!
//! ## Key Operations
//! - Lookup by id (the collaborator interface order creation consumes)
//! - Referential-usage probe for the passivation-over-deletion policy
//! - CRUD needed by stock receiving and tests
//!
//! ## Passivation Probe
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  exists_active_order_referencing(product, exclude)                      │
//! │                                                                         │
//! │  order_lines ──JOIN── orders                                            │
//! │      │                   │                                              │
//! │      │ product_id = ?    │ status = 'active', not soft-deleted          │
//! │      │ is_deleted = 0    │ id <> excluded order (when given)            │
//! │      ▼                   ▼                                              │
//! │  EXISTS? ── yes → the referenced aggregate must be passivated,          │
//! │                   not hard-deleted                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use merx_core::{Product, DEFAULT_TENANT_ID};

const PRODUCT_COLUMNS: &str =
    "id, tenant_id, name, purchase_price_cents, company_id, is_active, created_at, updated_at";

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets an active product inside the caller's transaction.
    ///
    /// Soft-deleted products are reported as not found, the same way a
    /// missing row is.
    pub async fn get_active(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<Product> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1 AND is_active = 1"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        product.ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Inserts a new product.
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, tenant_id, name, purchase_price_cents, company_id,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&product.id)
        .bind(&product.tenant_id)
        .bind(&product.name)
        .bind(product.purchase_price_cents)
        .bind(&product.company_id)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Soft-deletes a product by setting is_active = false.
    ///
    /// Historical order lines keep referencing the row; this is the
    /// passivation half of the two-step deletion protocol.
    pub async fn passivate(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Passivating product");

        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE products
            SET is_active = 0, updated_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Whether any live line of any other active order references the
    /// product.
    ///
    /// ## Arguments
    /// * `exclude_order` - An order to ignore, so an order being deleted
    ///   does not count as its own reference.
    pub async fn exists_active_order_referencing(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        exclude_order: Option<&str>,
    ) -> DbResult<bool> {
        let hits: i64 = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM order_lines l
                INNER JOIN orders o ON o.id = l.order_id
                WHERE l.product_id = ?1
                  AND l.is_deleted = 0
                  AND o.status = 'active'
                  AND o.deleted_at IS NULL
                  AND (?2 IS NULL OR o.id <> ?2)
            )
            "#,
        )
        .bind(product_id)
        .bind(exclude_order)
        .fetch_one(&mut *conn)
        .await?;

        Ok(hits != 0)
    }

    /// Counts active products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Helper to generate a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

/// Builds a product with fresh timestamps, for receiving and tests.
pub fn new_product(name: &str, purchase_price_cents: i64, company_id: &str) -> Product {
    let now = Utc::now();
    Product {
        id: generate_product_id(),
        tenant_id: DEFAULT_TENANT_ID.to_string(),
        name: name.to_string(),
        purchase_price_cents,
        company_id: company_id.to_string(),
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}
