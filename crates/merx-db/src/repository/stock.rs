//! # Stock Entry Repository
//!
//! Row-level operations on `stock_entries`. All business decisions
//! (allocation across warehouses, availability math, merge-upsert flow)
//! live in [`crate::ledger`]; this module only issues the SQL.
//!
//! ## The Conditional Decrement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UPDATE stock_entries                                                   │
//! │  SET on_hand = on_hand - :q                                             │
//! │  WHERE id = :id AND on_hand >= :q                                       │
//! │                                                                         │
//! │  rows_affected == 1  → the units were taken atomically                  │
//! │  rows_affected == 0  → a concurrent operation got there first;          │
//! │                        the ledger reports InsufficientStock and the     │
//! │                        enclosing transaction rolls back                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! This single statement closes the check-then-write race: availability is
//! still pre-checked for fail-fast behavior, but the decrement itself is
//! the guard that makes a negative on-hand count unrepresentable.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::error::DbResult;
use merx_core::StockEntry;

const STOCK_COLUMNS: &str = "id, product_id, warehouse_id, on_hand, created_at, updated_at";

/// Repository for stock-entry database operations.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    /// Creates a new StockRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Gets the entry for a (product, warehouse) pair.
    pub async fn get_by_pair(
        &self,
        product_id: &str,
        warehouse_id: &str,
    ) -> DbResult<Option<StockEntry>> {
        let entry = sqlx::query_as::<_, StockEntry>(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock_entries WHERE product_id = ?1 AND warehouse_id = ?2"
        ))
        .bind(product_id)
        .bind(warehouse_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Gets the entry for a (product, warehouse) pair inside the caller's
    /// transaction.
    pub async fn get_by_pair_in(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        warehouse_id: &str,
    ) -> DbResult<Option<StockEntry>> {
        let entry = sqlx::query_as::<_, StockEntry>(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock_entries WHERE product_id = ?1 AND warehouse_id = ?2"
        ))
        .bind(product_id)
        .bind(warehouse_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(entry)
    }

    /// Summed on-hand count and entry count for a product, read inside the
    /// caller's transaction.
    ///
    /// The entry count distinguishes "no stock entry exists" (reported as
    /// not found) from "entries exist but are empty" (insufficiency).
    pub async fn on_hand_for_product(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> DbResult<(i64, i64)> {
        let (total, entries): (Option<i64>, i64) = sqlx::query_as(
            "SELECT SUM(on_hand), COUNT(*) FROM stock_entries WHERE product_id = ?1",
        )
        .bind(product_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok((total.unwrap_or(0), entries))
    }

    /// The product's entries ordered for charging: largest on-hand first,
    /// oldest first on ties.
    pub async fn entries_for_charge(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> DbResult<Vec<StockEntry>> {
        let entries = sqlx::query_as::<_, StockEntry>(&format!(
            r#"
            SELECT {STOCK_COLUMNS}
            FROM stock_entries
            WHERE product_id = ?1
            ORDER BY on_hand DESC, created_at ASC, id ASC
            "#
        ))
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(entries)
    }

    /// The product's first-created entry; returned quantities are credited
    /// here.
    pub async fn first_entry(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> DbResult<Option<StockEntry>> {
        let entry = sqlx::query_as::<_, StockEntry>(&format!(
            r#"
            SELECT {STOCK_COLUMNS}
            FROM stock_entries
            WHERE product_id = ?1
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#
        ))
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(entry)
    }

    /// Atomically takes `quantity` units from an entry if it holds enough.
    ///
    /// ## Returns
    /// `true` when the decrement applied, `false` when the guard refused
    /// it (insufficient units at execution time).
    pub async fn try_decrement(
        &self,
        conn: &mut SqliteConnection,
        entry_id: &str,
        quantity: i64,
    ) -> DbResult<bool> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE stock_entries
            SET on_hand = on_hand - ?2, updated_at = ?3
            WHERE id = ?1 AND on_hand >= ?2
            "#,
        )
        .bind(entry_id)
        .bind(quantity)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Adds units to an entry by id.
    pub async fn increment(
        &self,
        conn: &mut SqliteConnection,
        entry_id: &str,
        quantity: i64,
    ) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE stock_entries
            SET on_hand = on_hand + ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(entry_id)
        .bind(quantity)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Merge half of the receiving upsert: increments the pair's entry if
    /// one exists.
    ///
    /// ## Returns
    /// `true` when an existing entry absorbed the quantity.
    pub async fn increment_pair(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        warehouse_id: &str,
        quantity: i64,
    ) -> DbResult<bool> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE stock_entries
            SET on_hand = on_hand + ?3, updated_at = ?4
            WHERE product_id = ?1 AND warehouse_id = ?2
            "#,
        )
        .bind(product_id)
        .bind(warehouse_id)
        .bind(quantity)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Inserts a fresh entry (insert half of the receiving upsert).
    pub async fn insert(&self, conn: &mut SqliteConnection, entry: &StockEntry) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_entries (
                id, product_id, warehouse_id, on_hand, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.product_id)
        .bind(&entry.warehouse_id)
        .bind(entry.on_hand)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

/// Builds a stock entry with fresh id and timestamps.
pub fn new_stock_entry(product_id: &str, warehouse_id: &str, on_hand: i64) -> StockEntry {
    let now = Utc::now();
    StockEntry {
        id: Uuid::new_v4().to_string(),
        product_id: product_id.to_string(),
        warehouse_id: warehouse_id.to_string(),
        on_hand,
        created_at: now,
        updated_at: now,
    }
}
