//! # Exchange Rate Repository
//!
//! Append-only exchange-rate snapshots. The newest row by timestamp is the
//! one metrics and costing consume; there is no per-order rate binding.
//! When the table is empty callers fall back to multipliers of 1.0.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use merx_core::ExchangeRateSnapshot;

/// Repository for exchange-rate snapshots.
#[derive(Debug, Clone)]
pub struct ExchangeRateRepository {
    pool: SqlitePool,
}

impl ExchangeRateRepository {
    /// Creates a new ExchangeRateRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ExchangeRateRepository { pool }
    }

    /// The latest snapshot, if any exists.
    ///
    /// Ties on `created_at` break on the id so the result is stable.
    pub async fn latest(&self) -> DbResult<Option<ExchangeRateSnapshot>> {
        let snapshot = sqlx::query_as::<_, ExchangeRateSnapshot>(
            r#"
            SELECT id, dollar_rate, euro_rate, created_at
            FROM exchange_rates
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(snapshot)
    }

    /// Appends a new snapshot and returns it.
    pub async fn record(&self, dollar_rate: f64, euro_rate: f64) -> DbResult<ExchangeRateSnapshot> {
        let snapshot = ExchangeRateSnapshot {
            id: Uuid::new_v4().to_string(),
            dollar_rate,
            euro_rate,
            created_at: Utc::now(),
        };

        debug!(dollar = %dollar_rate, euro = %euro_rate, "Recording exchange-rate snapshot");

        sqlx::query(
            r#"
            INSERT INTO exchange_rates (id, dollar_rate, euro_rate, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&snapshot.id)
        .bind(snapshot.dollar_rate)
        .bind(snapshot.euro_rate)
        .bind(snapshot.created_at)
        .execute(&self.pool)
        .await?;

        Ok(snapshot)
    }
}
