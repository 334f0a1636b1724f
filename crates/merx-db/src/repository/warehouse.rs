//! # Warehouse Repository
//!
//! Database operations for the warehouse directory. Thin by design: the
//! ledger only needs existence checks and names.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use merx_core::Warehouse;

/// Repository for warehouse database operations.
#[derive(Debug, Clone)]
pub struct WarehouseRepository {
    pool: SqlitePool,
}

impl WarehouseRepository {
    /// Creates a new WarehouseRepository.
    pub fn new(pool: SqlitePool) -> Self {
        WarehouseRepository { pool }
    }

    /// Gets a warehouse by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Warehouse>> {
        let warehouse = sqlx::query_as::<_, Warehouse>(
            "SELECT id, name, created_at FROM warehouses WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(warehouse)
    }

    /// Requires a warehouse to exist inside the caller's transaction.
    pub async fn require(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<Warehouse> {
        let warehouse = sqlx::query_as::<_, Warehouse>(
            "SELECT id, name, created_at FROM warehouses WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        warehouse.ok_or_else(|| DbError::not_found("Warehouse", id))
    }

    /// Inserts a new warehouse.
    pub async fn insert(&self, warehouse: &Warehouse) -> DbResult<()> {
        debug!(id = %warehouse.id, name = %warehouse.name, "Inserting warehouse");

        sqlx::query("INSERT INTO warehouses (id, name, created_at) VALUES (?1, ?2, ?3)")
            .bind(&warehouse.id)
            .bind(&warehouse.name)
            .bind(warehouse.created_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Lists all warehouses, oldest first.
    pub async fn list(&self) -> DbResult<Vec<Warehouse>> {
        let warehouses = sqlx::query_as::<_, Warehouse>(
            "SELECT id, name, created_at FROM warehouses ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(warehouses)
    }
}

/// Builds a warehouse with a fresh id and timestamp.
pub fn new_warehouse(name: &str) -> Warehouse {
    Warehouse {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        created_at: Utc::now(),
    }
}
