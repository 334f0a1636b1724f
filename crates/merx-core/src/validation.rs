//! # Validation Module
//!
//! Input validation for submitted orders and lines.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (API layer, out of scope)                              │
//! │  └── Shape/format checks, immediate feedback                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                   │
//! │  └── Business rule validation before any mutation is attempted          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                             │
//! │  ├── NOT NULL / UNIQUE / foreign key constraints                        │
//! │  └── CHECK (on_hand >= 0) as the last line of defense                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A request that fails here is rejected before a transaction is opened;
//! "no mutation attempted" is part of the error contract.

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::types::{OrderRequest, SubmittedLine};
use crate::{MAX_DISCOUNT_BPS, MAX_LINE_QUANTITY, MAX_ORDER_LINES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a discount in basis points.
///
/// ## Rules
/// - Must be between 0 and 10000 (0% to 100%)
pub fn validate_discount_bps(bps: u32) -> ValidationResult<()> {
    if bps > MAX_DISCOUNT_BPS {
        return Err(ValidationError::OutOfRange {
            field: "discount".to_string(),
            min: 0,
            max: MAX_DISCOUNT_BPS as i64,
        });
    }

    Ok(())
}

/// Validates a price in cents.
///
/// ## Rules
/// - Must be non-negative (>= 0); zero is allowed (free items)
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string format.
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Line-Set Validators
// =============================================================================

/// Validates one submitted line.
pub fn validate_line(line: &SubmittedLine) -> ValidationResult<()> {
    if line.product_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "product_id".to_string(),
        });
    }
    validate_quantity(line.quantity)?;
    validate_price_cents(line.unit_price_cents)?;
    validate_discount_bps(line.discount_bps)?;
    Ok(())
}

/// Validates a submitted line set.
///
/// ## Rules
/// - Must not be empty and must not exceed MAX_ORDER_LINES
/// - Every line passes [`validate_line`]
/// - No two lines share a `(product_id, discount)` key; the reconciler
///   matches on that pair, so duplicates would be ambiguous
pub fn validate_lines(lines: &[SubmittedLine]) -> ValidationResult<()> {
    if lines.is_empty() {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        });
    }

    if lines.len() > MAX_ORDER_LINES {
        return Err(ValidationError::OutOfRange {
            field: "lines".to_string(),
            min: 1,
            max: MAX_ORDER_LINES as i64,
        });
    }

    let mut seen: HashSet<(&str, u32)> = HashSet::with_capacity(lines.len());
    for line in lines {
        validate_line(line)?;
        if !seen.insert((line.product_id.as_str(), line.discount_bps)) {
            return Err(ValidationError::Duplicate {
                field: "line".to_string(),
                value: format!("{} @ {}bps", line.product_id, line.discount_bps),
            });
        }
    }

    Ok(())
}

/// Validates a full order request before any lookup or transaction.
pub fn validate_order_request(request: &OrderRequest) -> ValidationResult<()> {
    if request.customer_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "customer_id".to_string(),
        });
    }
    if request.placed_by.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "placed_by".to_string(),
        });
    }
    validate_lines(&request.lines)
}

// =============================================================================
// Unit Tests
// =============================================================================
