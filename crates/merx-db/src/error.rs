//! # Database Error Types
//!
//! Error types for database operations plus the public `ServiceError`
//! envelope returned by every service operation.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ServiceError (this module) ← What callers of the services see:         │
//! │       │                        a typed success/failure envelope         │
//! │       ▼                                                                 │
//! │  Caller maps to its own surface (HTTP, queue, ...)                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Recoverable validation failures are reported with no mutation attempted;
//! transactional failures are reported after the rollback has run. No
//! panic crosses the service boundary.

use std::time::Duration;
use thiserror::Error;

use merx_core::{CoreError, ValidationError};

// =============================================================================
// DbError
// =============================================================================

/// Database operation errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for debugging and caller feedback.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - `fetch_one` returns no rows
    /// - ID doesn't exist
    /// - Soft-deleted record
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Unique constraint violation.
    #[error("Duplicate {field}: already exists")]
    UniqueViolation { field: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed to begin or commit.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record",
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite error codes for constraints:
                // UNIQUE constraint: "UNIQUE constraint failed: <table>.<column>"
                // FK constraint: "FOREIGN KEY constraint failed"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation { field }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// ServiceError
// =============================================================================

/// The public success/failure envelope of the service layer.
///
/// Every public operation of StockLedger, OrderLifecycle and
/// FinancialMetrics returns `Result<_, ServiceError>`. The Display string
/// is the human-readable reason callers surface to users.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was malformed; nothing was attempted.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A referenced entity is absent (or soft-deleted).
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Requested quantity exceeds available stock plus relief. The
    /// enclosing transaction has been rolled back.
    #[error("insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// The persistence layer failed; the transaction was rolled back.
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// The operation deadline elapsed; the transaction was rolled back.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ServiceError::NotFound { entity, id },
            other => ServiceError::Transaction(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::from(DbError::from(err))
    }
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProductNotFound(id) => ServiceError::NotFound {
                entity: "Product",
                id,
            },
            CoreError::WarehouseNotFound(id) => ServiceError::NotFound {
                entity: "Warehouse",
                id,
            },
            CoreError::OrderNotFound(id) => ServiceError::NotFound {
                entity: "Order",
                id,
            },
            CoreError::StockEntryNotFound(id) => ServiceError::NotFound {
                entity: "StockEntry",
                id,
            },
            CoreError::InsufficientStock {
                product_id,
                available,
                requested,
            } => ServiceError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            CoreError::Validation(v) => ServiceError::Validation(v),
        }
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

// =============================================================================
// Unit Tests
// =============================================================================
