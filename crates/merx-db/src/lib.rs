//! # merx-db: Database Layer for Merx
//!
//! This crate provides persistence and the transactional services of the
//! Merx order–stock engine. It uses SQLite with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Merx Data Flow                                │
//! │                                                                         │
//! │  Caller (API layer, out of scope)                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                     merx-db (THIS CRATE)                        │    │
//! │  │                                                                 │    │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐    │    │
//! │  │   │   Services    │    │  Repositories │    │  Migrations  │    │    │
//! │  │   │               │    │               │    │  (embedded)  │    │    │
//! │  │   │ OrderLifecycle│───►│ OrderRepo     │    │              │    │    │
//! │  │   │ StockLedger   │───►│ StockRepo     │    │ 001_init.sql │    │    │
//! │  │   │ FinMetrics    │───►│ ProductRepo…  │    │ ...          │    │    │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘    │    │
//! │  │                               │                                 │    │
//! │  └───────────────────────────────┼─────────────────────────────────┘    │
//! │                                  ▼                                      │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                     SQLite Database (WAL)                       │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and the `Database` handle
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - `DbError` and the public `ServiceError` envelope
//! - [`repository`] - Repository implementations (order, stock, etc.)
//! - [`ledger`] - StockLedger: availability, atomic deltas, receiving
//! - [`lifecycle`] - OrderLifecycle: create/update/cancel/delete
//! - [`metrics`] - FinancialMetrics: windowed, currency-normalized sums
//!
//! ## Usage
//!
//! ```rust,ignore
//! use merx_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/merx.db")).await?;
//!
//! let receipt = db.lifecycle().create_order(&request).await?;
//! db.lifecycle().update_order(&receipt.order_id, &new_lines).await?;
//! let sales = db.metrics().sales(Some(2026), None).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod metrics;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult, ServiceError, ServiceResult};
pub use pool::{Database, DbConfig};

// Service re-exports for convenience
pub use ledger::{AvailabilityRequest, QuantityRelief, StockLedger};
pub use lifecycle::{DeleteOutcome, OrderLifecycle, OrderReceipt};
pub use metrics::FinancialMetrics;

// Repository re-exports for convenience
pub use repository::customer::CustomerRepository;
pub use repository::order::OrderRepository;
pub use repository::product::ProductRepository;
pub use repository::rates::ExchangeRateRepository;
pub use repository::staff::StaffRepository;
pub use repository::stock::StockRepository;
pub use repository::warehouse::WarehouseRepository;
