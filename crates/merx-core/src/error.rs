//! # Error Types
//!
//! Domain-specific error types for merx-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  merx-core errors (this file)                                           │
//! │  ├── CoreError        - Business rule violations                        │
//! │  └── ValidationError  - Input validation failures                       │
//! │                                                                         │
//! │  merx-db errors (separate crate)                                        │
//! │  ├── DbError          - Database operation failures                     │
//! │  └── ServiceError     - Public success/failure envelope                 │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ServiceError → Caller              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product id, quantities)
//! 3. Errors are enum variants, never String
//! 4. Each error variant maps to a user-facing message

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations or domain logic
/// failures. The reconciler itself never produces one (it is a pure,
/// total function); they arise when the surrounding operation checks
/// references and stock.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product cannot be found (missing or soft-deleted).
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Warehouse cannot be found.
    #[error("Warehouse not found: {0}")]
    WarehouseNotFound(String),

    /// Order cannot be found.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// No stock entry exists for the product.
    #[error("No stock entry for product: {0}")]
    StockEntryNotFound(String),

    /// Requested quantity exceeds available stock plus relief.
    ///
    /// ## When This Occurs
    /// - A new or grown line asks for more than the on-hand count
    /// - Two concurrent operations raced for the same units and this one
    ///   lost the atomic decrement
    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when a submitted order or line doesn't meet
/// requirements. Used for early validation before any mutation runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, unknown currency code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., two lines with the same product and discount).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },

    /// The acting party could not be resolved to an administrator or an
    /// employee.
    #[error("no administrator or employee matches reference '{reference}'")]
    UnknownActor { reference: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_id: "p-77".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product p-77: available 3, requested 5"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "customer_id".to_string(),
        };
        assert_eq!(err.to_string(), "customer_id is required");

        let err = ValidationError::UnknownActor {
            reference: "ext-1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no administrator or employee matches reference 'ext-1'"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
