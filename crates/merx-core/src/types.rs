//! # Domain Types
//!
//! Core domain types used throughout Merx.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐        │
//! │  │     Order       │   │   OrderLine     │   │   StockEntry    │        │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │        │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │        │
//! │  │  customer_id    │   │  order_id (FK)  │   │  product_id     │        │
//! │  │  currency       │   │  quantity       │   │  warehouse_id   │        │
//! │  │  actor          │   │  discount_bps   │   │  on_hand (≥0)   │        │
//! │  │  total_cents    │   │  snapshots      │   │                 │        │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘        │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐        │
//! │  │    Currency     │   │     Actor       │   │   OrderStatus   │        │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │        │
//! │  │  Domestic       │   │  Admin(id)      │   │  Active         │        │
//! │  │  Usd / Eur      │   │  Employee(id)   │   │  Passive        │        │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! An order line freezes `unit_price_cents` and `purchase_price_cents` at
//! the moment it is created. Later product price changes never rewrite
//! committed orders; reconciliation only ever touches `quantity` and the
//! recomputed `line_total_cents`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::{line_total, Money};

// =============================================================================
// Currency
// =============================================================================

/// Order currency.
///
/// The enumerated set is closed: the domestic (reporting) currency plus the
/// two foreign currencies the exchange-rate snapshot quotes. Metric sums
/// multiply foreign amounts by the latest snapshot rate; the domestic
/// multiplier is always 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    /// Domestic currency (the reporting currency).
    Domestic,
    /// United States dollar.
    Usd,
    /// Euro.
    Eur,
}

impl Currency {
    /// Parses a currency code. Unknown codes are a validation failure at
    /// the caller, not a panic here.
    pub fn from_code(code: &str) -> Option<Currency> {
        match code.trim().to_ascii_lowercase().as_str() {
            "domestic" | "try" => Some(Currency::Domestic),
            "usd" => Some(Currency::Usd),
            "eur" => Some(Currency::Eur),
            _ => None,
        }
    }

    /// Canonical lowercase code, matching the database representation.
    pub const fn as_code(&self) -> &'static str {
        match self {
            Currency::Domestic => "domestic",
            Currency::Usd => "usd",
            Currency::Eur => "eur",
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::Domestic
    }
}

// =============================================================================
// Exchange Rates
// =============================================================================

/// A persisted point-in-time exchange-rate snapshot.
///
/// Append-only; the newest row by `created_at` is the one reporting uses.
/// There is no historical rate binding per order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ExchangeRateSnapshot {
    pub id: String,
    /// USD → reporting-currency multiplier.
    pub dollar_rate: f64,
    /// EUR → reporting-currency multiplier.
    pub euro_rate: f64,
    pub created_at: DateTime<Utc>,
}

/// Resolved multipliers for one metrics query.
///
/// ## Graceful Degradation
/// When no snapshot exists both multipliers default to 1.0 and reporting
/// proceeds in mixed face-value currency rather than failing. A missing
/// rate is explicitly NOT an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSet {
    pub dollar: f64,
    pub euro: f64,
}

impl RateSet {
    /// Builds a rate set from the latest snapshot, if any.
    pub fn from_snapshot(snapshot: Option<&ExchangeRateSnapshot>) -> RateSet {
        match snapshot {
            Some(s) => RateSet {
                dollar: s.dollar_rate,
                euro: s.euro_rate,
            },
            None => RateSet::default(),
        }
    }

    /// Multiplier for a given order currency. Domestic is always 1.
    pub fn multiplier(&self, currency: Currency) -> f64 {
        match currency {
            Currency::Domestic => 1.0,
            Currency::Usd => self.dollar,
            Currency::Eur => self.euro,
        }
    }
}

impl Default for RateSet {
    fn default() -> Self {
        RateSet {
            dollar: 1.0,
            euro: 1.0,
        }
    }
}

// =============================================================================
// Actor
// =============================================================================

/// Discriminant for the two actor kinds, as stored in the `actor_kind`
/// column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    Admin,
    Employee,
}

/// The party an order is attributed to.
///
/// Exactly one of two mutually exclusive kinds; the tagged variant makes
/// both-set and both-null states unrepresentable, unlike a pair of nullable
/// foreign keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Actor {
    Admin(String),
    Employee(String),
}

impl Actor {
    /// The column discriminant.
    pub fn kind(&self) -> ActorKind {
        match self {
            Actor::Admin(_) => ActorKind::Admin,
            Actor::Employee(_) => ActorKind::Employee,
        }
    }

    /// The referenced administrator or employee id.
    pub fn id(&self) -> &str {
        match self {
            Actor::Admin(id) | Actor::Employee(id) => id,
        }
    }

    /// Reassembles an actor from its persisted parts.
    pub fn from_parts(kind: ActorKind, id: String) -> Actor {
        match kind {
            ActorKind::Admin => Actor::Admin(id),
            ActorKind::Employee => Actor::Employee(id),
        }
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// The lifecycle status of an order.
///
/// `Draft` and `Updated` from the state machine are transient states inside
/// a single transaction and are never persisted; a committed order is
/// either active or passivated. Hard deletion removes the row entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order is live; its lines hold stock reservations.
    Active,
    /// Order was cancelled or passivated in place of a hard delete.
    Passive,
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Active
    }
}

// =============================================================================
// Order
// =============================================================================

/// A committed sales order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub tenant_id: String,
    /// The buyer.
    pub customer_id: String,
    pub currency: Currency,
    /// Administrator or employee the order is attributed to.
    pub actor: Actor,
    /// Denormalized sum of live line totals, in the order currency.
    /// Invariant: equals the recomputed sum after every successful mutation.
    pub total_cents: i64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete timestamp; set when the order is passivated.
    pub deleted_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Order Line
// =============================================================================

/// A line item in an order.
/// Uses the snapshot pattern to freeze prices at line-creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderLine {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    /// Units ordered; always positive.
    pub quantity: i64,
    /// Unit sale price in order-currency cents at line creation (frozen).
    pub unit_price_cents: i64,
    /// Discount in basis points (0..=10000).
    pub discount_bps: u32,
    /// Cost snapshot copied from the product at line creation (frozen).
    pub purchase_price_cents: i64,
    /// quantity × unit price, discounted.
    pub line_total_cents: i64,
    /// Set when the owning order is passivated.
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl OrderLine {
    /// Returns the line total as Money.
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }

    /// Cost of goods for this line: purchase-price snapshot × quantity.
    #[inline]
    pub fn cost_total_cents(&self) -> i64 {
        self.purchase_price_cents * self.quantity
    }

    /// Whether the line's sale value exceeds its cost at quantity.
    /// Loss-making lines are excluded from metric sums.
    #[inline]
    pub fn is_profitable(&self) -> bool {
        self.line_total_cents > self.cost_total_cents()
    }

    /// Recomputes the total this line would have at a new quantity,
    /// keeping the frozen unit price and discount.
    pub fn total_at_quantity(&self, quantity: i64) -> Money {
        line_total(quantity, self.unit_price_cents, self.discount_bps)
    }
}

/// An order together with its live lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAggregate {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

impl OrderAggregate {
    /// Recomputes the order total from the lines.
    pub fn computed_total_cents(&self) -> i64 {
        self.lines.iter().map(|l| l.line_total_cents).sum()
    }
}

// =============================================================================
// Requests
// =============================================================================

/// One desired line in a submitted order state.
///
/// The reconciler diffs a set of these against the persisted lines; see
/// [`crate::reconcile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedLine {
    pub product_id: String,
    pub quantity: i64,
    /// Sale price for the line; snapshotted if the line is inserted,
    /// ignored for a matched line (the persisted snapshot is immutable).
    pub unit_price_cents: i64,
    pub discount_bps: u32,
}

/// A proposed order, as submitted by a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub customer_id: String,
    pub currency: Currency,
    /// External identity reference of the acting party; resolved to an
    /// [`Actor`] by looking up administrators first, then employees.
    pub placed_by: String,
    pub lines: Vec<SubmittedLine>,
}

// =============================================================================
// Stock
// =============================================================================

/// On-hand quantity of one product in one warehouse.
///
/// One entry per (product, warehouse) pair; the pair is UNIQUE in the
/// schema and upserts use lookup-before-insert merge semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockEntry {
    pub id: String,
    pub product_id: String,
    pub warehouse_id: String,
    /// Core invariant: never negative. Enforced by the ledger's atomic
    /// conditional decrement, backed by a CHECK constraint.
    pub on_hand: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Collaborator Entities
// =============================================================================

/// A product in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    /// Current cost; copied onto new order lines as their cost snapshot.
    pub purchase_price_cents: i64,
    pub company_id: String,
    /// Whether product is active (soft delete).
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A warehouse in the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Warehouse {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A buyer. Metrics can filter to a company through this reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub company_id: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_codes() {
        assert_eq!(Currency::from_code("usd"), Some(Currency::Usd));
        assert_eq!(Currency::from_code("EUR"), Some(Currency::Eur));
        assert_eq!(Currency::from_code("domestic"), Some(Currency::Domestic));
        assert_eq!(Currency::from_code("gbp"), None);
        assert_eq!(Currency::Usd.as_code(), "usd");
    }

    #[test]
    fn test_rate_set_defaults_to_one() {
        let rates = RateSet::from_snapshot(None);
        assert_eq!(rates.multiplier(Currency::Usd), 1.0);
        assert_eq!(rates.multiplier(Currency::Eur), 1.0);
        assert_eq!(rates.multiplier(Currency::Domestic), 1.0);
    }

    #[test]
    fn test_rate_set_domestic_always_one() {
        let snapshot = ExchangeRateSnapshot {
            id: "r1".to_string(),
            dollar_rate: 32.5,
            euro_rate: 35.0,
            created_at: Utc::now(),
        };
        let rates = RateSet::from_snapshot(Some(&snapshot));
        assert_eq!(rates.multiplier(Currency::Domestic), 1.0);
        assert_eq!(rates.multiplier(Currency::Usd), 32.5);
        assert_eq!(rates.multiplier(Currency::Eur), 35.0);
    }

    #[test]
    fn test_actor_round_trip() {
        let actor = Actor::Admin("a-1".to_string());
        assert_eq!(actor.kind(), ActorKind::Admin);
        assert_eq!(actor.id(), "a-1");
        assert_eq!(
            Actor::from_parts(ActorKind::Employee, "e-9".to_string()),
            Actor::Employee("e-9".to_string())
        );
    }

    fn line(quantity: i64, unit: i64, discount: u32, cost: i64) -> OrderLine {
        OrderLine {
            id: "l".to_string(),
            order_id: "o".to_string(),
            product_id: "p".to_string(),
            quantity,
            unit_price_cents: unit,
            discount_bps: discount,
            purchase_price_cents: cost,
            line_total_cents: line_total(quantity, unit, discount).cents(),
            is_deleted: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_line_profitability() {
        // 2 × 100 = 200 sale, 2 × 60 = 120 cost
        assert!(line(2, 100, 0, 60).is_profitable());
        // Sold at cost is not profitable
        assert!(!line(2, 100, 0, 100).is_profitable());
        // A deep discount can turn a line loss-making
        assert!(!line(2, 100, 5000, 60).is_profitable());
    }

    #[test]
    fn test_aggregate_total() {
        let order = Order {
            id: "o".to_string(),
            tenant_id: "t".to_string(),
            customer_id: "c".to_string(),
            currency: Currency::Domestic,
            actor: Actor::Employee("e".to_string()),
            total_cents: 0,
            status: OrderStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };
        let agg = OrderAggregate {
            order,
            lines: vec![line(2, 100, 0, 10), line(3, 50, 0, 10)],
        };
        assert_eq!(agg.computed_total_cents(), 350);
    }
}
