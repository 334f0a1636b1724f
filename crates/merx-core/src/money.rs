//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Minor Units                                      │
//! │    1000 cents / 3 = 333 cents (×3 = 999 cents)                          │
//! │    We KNOW we lost 1 cent, and handle it explicitly                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every persisted amount in Merx (unit prices, purchase-price snapshots,
//! line totals, order totals) is integer minor units of the order currency.
//! Floating point enters exactly once, at the reporting boundary, when a
//! total is normalized into the reporting currency (see
//! [`Money::normalized`]).
//!
//! ## Usage
//! ```rust
//! use merx_core::money::Money;
//!
//! // Create from cents (preferred)
//! let price = Money::from_cents(1099);
//!
//! // Arithmetic operations
//! let doubled = price * 2;
//! let total = price + Money::from_cents(500);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit.
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for corrections and refunds
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Derives**: Full serde support for JSON serialization
///
/// The unit is interpreted in the currency of the surrounding order; `Money`
/// itself carries no currency tag. Cross-currency math happens only in the
/// metrics layer, through [`Money::normalized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    ///
    /// ## Example
    /// ```rust
    /// use merx_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents (smallest currency unit).
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies money by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use merx_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(299);
    /// let line_total = unit_price.multiply_quantity(3);
    /// assert_eq!(line_total.cents(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Applies a percentage discount and returns the discounted amount.
    ///
    /// ## Arguments
    /// * `discount_bps` - Discount in basis points (1000 = 10%, 10000 = 100%)
    ///
    /// ## Implementation
    /// Integer math with half-up rounding of the discount amount:
    /// `(amount * bps + 5000) / 10000`. Uses i128 internally so large
    /// amounts cannot overflow the intermediate product.
    ///
    /// ## Example
    /// ```rust
    /// use merx_core::money::Money;
    ///
    /// let subtotal = Money::from_cents(10000);
    /// let discounted = subtotal.apply_percentage_discount(1000); // 10% off
    /// assert_eq!(discounted.cents(), 9000);
    /// ```
    pub fn apply_percentage_discount(&self, discount_bps: u32) -> Money {
        // Calculate discount amount, then subtract
        let discount_amount = (self.0 as i128 * discount_bps as i128 + 5000) / 10000;
        Money::from_cents(self.0 - discount_amount as i64)
    }

    /// Converts this amount into the reporting currency.
    ///
    /// ## The Reporting Boundary
    /// Metric sums are computed as `f64` in reporting-currency cents; this
    /// is the single place integer money meets a floating-point exchange
    /// rate. The multiplier for the domestic currency is always `1.0`.
    ///
    /// ## Example
    /// ```rust
    /// use merx_core::money::Money;
    ///
    /// let total = Money::from_cents(1000);
    /// assert_eq!(total.normalized(32.5), 32_500.0);
    /// assert_eq!(total.normalized(1.0), 1000.0);
    /// ```
    #[inline]
    pub fn normalized(&self, multiplier: f64) -> f64 {
        self.0 as f64 * multiplier
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display implementation shows money in a human-readable format.
///
/// ## Note
/// This is for logs and debugging; report formatting is out of scope.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, (self.0 / 100).abs(), (self.0 % 100).abs())
    }
}

/// Default money is zero.
impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

/// Addition of two Money values.
impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

/// Addition assignment (+=).
impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

/// Subtraction of two Money values.
impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

/// Subtraction assignment (-=).
impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

/// Multiplication by integer (for quantity calculations).
impl Mul<i32> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i32) -> Self {
        Money(self.0 * qty as i64)
    }
}

/// Multiplication by i64.
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Line Totals
// =============================================================================

/// Computes a line total: `quantity × unit price`, discounted.
///
/// This is the one formula behind every `line_total_cents` column in the
/// system; reconciliation, order creation and order update all route
/// through it so a recomputed total can never drift from an inserted one.
///
/// ## Example
/// ```rust
/// use merx_core::money::line_total;
///
/// // 4 × 2.50 with 10% off = 9.00
/// assert_eq!(line_total(4, 250, 1000).cents(), 900);
/// ```
pub fn line_total(quantity: i64, unit_price_cents: i64, discount_bps: u32) -> Money {
    Money::from_cents(unit_price_cents)
        .multiply_quantity(quantity)
        .apply_percentage_discount(discount_bps)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "10.99");
        assert_eq!(format!("{}", Money::from_cents(500)), "5.00");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-5.50");
        assert_eq!(format!("{}", Money::from_cents(0)), "0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        let result: Money = a * 3;
        assert_eq!(result.cents(), 3000);
    }

    #[test]
    fn test_percentage_discount() {
        let subtotal = Money::from_cents(10000);
        let discounted = subtotal.apply_percentage_discount(1000); // 10%
        assert_eq!(discounted.cents(), 9000);
    }

    #[test]
    fn test_full_discount_is_zero() {
        let subtotal = Money::from_cents(12345);
        assert_eq!(subtotal.apply_percentage_discount(10000).cents(), 0);
    }

    #[test]
    fn test_discount_rounding() {
        // 999 at 3.33% -> 33.2667 -> rounds to 33
        let amount = Money::from_cents(999);
        assert_eq!(amount.apply_percentage_discount(333).cents(), 999 - 33);
    }

    #[test]
    fn test_line_total() {
        assert_eq!(line_total(4, 250, 0).cents(), 1000);
        assert_eq!(line_total(4, 250, 1000).cents(), 900);
        assert_eq!(line_total(1, 0, 5000).cents(), 0);
    }

    #[test]
    fn test_normalized() {
        let total = Money::from_cents(2000);
        assert_eq!(total.normalized(1.0), 2000.0);
        assert!((total.normalized(0.5) - 1000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_and_checks() {
        let zero = Money::zero();
        assert!(zero.is_zero());
        assert!(!zero.is_positive());
        assert!(!zero.is_negative());

        let positive = Money::from_cents(100);
        assert!(positive.is_positive());

        let negative = Money::from_cents(-100);
        assert!(negative.is_negative());
    }

    /// Documents the intentional precision loss of integer division.
    #[test]
    fn test_division_precision_loss_documented() {
        let ten = Money::from_cents(1000);
        let one_third = Money::from_cents(1000 / 3);
        let reconstructed: Money = one_third * 3;

        assert_eq!(reconstructed.cents(), 999);
        let lost = ten - reconstructed;
        assert_eq!(lost.cents(), 1);
    }
}
