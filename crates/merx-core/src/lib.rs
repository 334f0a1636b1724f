//! # merx-core: Pure Business Logic for Merx
//!
//! This crate is the **heart** of Merx. It contains the order–stock
//! business logic as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Merx Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                 Caller (API layer, out of scope)                │    │
//! │  │    create_order ──► update_order ──► delete_order ──► metrics  │    │
//! │  └─────────────────────────────┬───────────────────────────────────┘    │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │                  merx-db (services + SQLite)                    │    │
//! │  │    OrderLifecycle • StockLedger • FinancialMetrics              │    │
//! │  └─────────────────────────────┬───────────────────────────────────┘    │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │               ★ merx-core (THIS CRATE) ★                        │    │
//! │  │                                                                 │    │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐    │    │
//! │  │   │   types   │  │   money   │  │ reconcile │  │  metrics  │    │    │
//! │  │   │  Order    │  │   Money   │  │ line diff │  │  windows  │    │    │
//! │  │   │  Stock    │  │ discounts │  │  deltas   │  │  pct Δ    │    │    │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘    │    │
//! │  │                                                                 │    │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Order, OrderLine, StockEntry, rates, Actor)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`reconcile`] - The line-set diff producing mutations and stock deltas
//! - [`metrics`] - Reporting-window resolution and percent-change math
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: All persisted amounts are cents (i64); floats only
//!    at the reporting boundary
//! 4. **Explicit Errors**: All errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod metrics;
pub mod money;
pub mod reconcile;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use merx_core::Money` instead of
// `use merx_core::money::Money`

pub use error::{CoreError, CoreResult, ValidationError};
pub use metrics::{percent_change, Metric, MetricResult, ReportWindow};
pub use money::Money;
pub use reconcile::{reconcile, LineUpdate, Reconciliation, StockDelta};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default tenant ID (single-tenant runtime with multi-tenant schema)
///
/// The schema carries tenant_id for multi-tenancy; runtime tenant
/// resolution is a caller concern and out of scope here.
pub const DEFAULT_TENANT_ID: &str = "00000000-0000-0000-0000-000000000001";

/// Maximum lines allowed on a single order
///
/// ## Business Reason
/// Prevents runaway orders and keeps reconciliation work bounded.
pub const MAX_ORDER_LINES: usize = 100;

/// Maximum quantity of a single order line
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 10000 instead of 10).
pub const MAX_LINE_QUANTITY: i64 = 9_999;

/// Maximum discount in basis points (100%).
pub const MAX_DISCOUNT_BPS: u32 = 10_000;
