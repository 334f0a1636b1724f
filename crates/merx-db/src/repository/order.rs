//! # Order Repository
//!
//! Database operations for orders and order lines.
//!
//! ## Order Lifecycle (persisted states)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Order Lifecycle                                   │
//! │                                                                         │
//! │  1. CREATE                                                              │
//! │     └── insert_order() + insert_line()×N → status 'active'              │
//! │                                                                         │
//! │  2. UPDATE (repeatable)                                                 │
//! │     └── update_line_quantity() / insert_line() / delete_line()          │
//! │     └── update_total() → recomputed sum of live line totals             │
//! │                                                                         │
//! │  3. PASSIVATE (cancel, or delete-when-referenced)                       │
//! │     └── status 'passive', deleted_at set, lines flagged deleted         │
//! │                                                                         │
//! │  4. HARD DELETE (only when no other active order shares a product)      │
//! │     └── rows removed                                                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All mutating methods take the caller's transaction connection; the
//! lifecycle service owns commit/rollback.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use merx_core::{
    Actor, ActorKind, Currency, Order, OrderAggregate, OrderLine, OrderStatus, ReportWindow,
};

const ORDER_COLUMNS: &str = "id, tenant_id, customer_id, currency, actor_kind, actor_id, \
     total_cents, status, created_at, updated_at, deleted_at";

const LINE_COLUMNS: &str = "id, order_id, product_id, quantity, unit_price_cents, discount_bps, \
     purchase_price_cents, line_total_cents, is_deleted, created_at";

// =============================================================================
// Row Types
// =============================================================================

/// Raw order row; the actor is persisted as two columns and reassembled
/// into the tagged [`Actor`] variant on the way out.
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: String,
    tenant_id: String,
    customer_id: String,
    currency: Currency,
    actor_kind: ActorKind,
    actor_id: String,
    total_cents: i64,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Order {
        Order {
            id: row.id,
            tenant_id: row.tenant_id,
            customer_id: row.customer_id,
            currency: row.currency,
            actor: Actor::from_parts(row.actor_kind, row.actor_id),
            total_cents: row.total_cents,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

/// One order line flattened with its order's currency, as consumed by the
/// metrics aggregation.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MetricLineRow {
    pub currency: Currency,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub purchase_price_cents: i64,
    pub line_total_cents: i64,
}

impl MetricLineRow {
    /// Sale value: the materialized total, falling back to
    /// quantity × unit price when the total was never set.
    pub fn sale_value_cents(&self) -> i64 {
        if self.line_total_cents > 0 {
            self.line_total_cents
        } else {
            self.quantity * self.unit_price_cents
        }
    }

    /// Cost of goods: purchase-price snapshot × quantity.
    pub fn cost_cents(&self) -> i64 {
        self.purchase_price_cents * self.quantity
    }

    /// Loss-making lines (total not exceeding cost) are excluded from the
    /// metric sums.
    pub fn is_profitable(&self) -> bool {
        self.sale_value_cents() > self.cost_cents()
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Gets an order by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Order::from))
    }

    /// Gets an order with its live lines.
    pub async fn get_aggregate(&self, id: &str) -> DbResult<Option<OrderAggregate>> {
        let Some(order) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        let lines = sqlx::query_as::<_, OrderLine>(&format!(
            r#"
            SELECT {LINE_COLUMNS}
            FROM order_lines
            WHERE order_id = ?1 AND is_deleted = 0
            ORDER BY created_at, id
            "#
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(OrderAggregate { order, lines }))
    }

    /// Loads an order with its live lines inside the caller's transaction.
    pub async fn load_aggregate(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<OrderAggregate> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Order", id))?;

        let lines = sqlx::query_as::<_, OrderLine>(&format!(
            r#"
            SELECT {LINE_COLUMNS}
            FROM order_lines
            WHERE order_id = ?1 AND is_deleted = 0
            ORDER BY created_at, id
            "#
        ))
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(OrderAggregate {
            order: Order::from(row),
            lines,
        })
    }

    // -------------------------------------------------------------------------
    // Writes (transaction-scoped)
    // -------------------------------------------------------------------------

    /// Inserts an order.
    pub async fn insert_order(&self, conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
        debug!(id = %order.id, customer = %order.customer_id, "Inserting order");

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, tenant_id, customer_id, currency, actor_kind, actor_id,
                total_cents, status, created_at, updated_at, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&order.id)
        .bind(&order.tenant_id)
        .bind(&order.customer_id)
        .bind(order.currency)
        .bind(order.actor.kind())
        .bind(order.actor.id())
        .bind(order.total_cents)
        .bind(order.status)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.deleted_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Inserts an order line.
    ///
    /// ## Snapshot Pattern
    /// The caller has already copied unit price and purchase price onto the
    /// line; this preserves order history even when product prices change.
    pub async fn insert_line(&self, conn: &mut SqliteConnection, line: &OrderLine) -> DbResult<()> {
        debug!(order_id = %line.order_id, product_id = %line.product_id, "Inserting order line");

        sqlx::query(
            r#"
            INSERT INTO order_lines (
                id, order_id, product_id, quantity, unit_price_cents,
                discount_bps, purchase_price_cents, line_total_cents,
                is_deleted, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&line.id)
        .bind(&line.order_id)
        .bind(&line.product_id)
        .bind(line.quantity)
        .bind(line.unit_price_cents)
        .bind(line.discount_bps)
        .bind(line.purchase_price_cents)
        .bind(line.line_total_cents)
        .bind(line.is_deleted)
        .bind(line.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Overwrites a matched line's quantity and recomputed total. The
    /// price and discount snapshots are immutable by design.
    pub async fn update_line_quantity(
        &self,
        conn: &mut SqliteConnection,
        line_id: &str,
        quantity: i64,
        line_total_cents: i64,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE order_lines
            SET quantity = ?2, line_total_cents = ?3
            WHERE id = ?1 AND is_deleted = 0
            "#,
        )
        .bind(line_id)
        .bind(quantity)
        .bind(line_total_cents)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("OrderLine", line_id));
        }

        Ok(())
    }

    /// Removes a line dropped by reconciliation.
    pub async fn delete_line(&self, conn: &mut SqliteConnection, line_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM order_lines WHERE id = ?1")
            .bind(line_id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("OrderLine", line_id));
        }

        Ok(())
    }

    /// Rewrites the denormalized order total.
    ///
    /// ## When To Call
    /// After every line mutation batch; the total must equal the sum of
    /// live line totals when the transaction commits.
    pub async fn update_total(
        &self,
        conn: &mut SqliteConnection,
        order_id: &str,
        total_cents: i64,
    ) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET total_cents = ?2, updated_at = ?3
            WHERE id = ?1 AND status = 'active'
            "#,
        )
        .bind(order_id)
        .bind(total_cents)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Order", order_id));
        }

        Ok(())
    }

    /// Passivates an order: status → passive, soft-delete timestamp set,
    /// lines flagged deleted. Rows stay for history.
    pub async fn passivate(&self, conn: &mut SqliteConnection, order_id: &str) -> DbResult<()> {
        debug!(id = %order_id, "Passivating order");

        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'passive', deleted_at = ?2, updated_at = ?2
            WHERE id = ?1 AND status = 'active'
            "#,
        )
        .bind(order_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Order (active)", order_id));
        }

        sqlx::query("UPDATE order_lines SET is_deleted = 1 WHERE order_id = ?1")
            .bind(order_id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Hard-deletes an order and its lines.
    pub async fn hard_delete(&self, conn: &mut SqliteConnection, order_id: &str) -> DbResult<()> {
        debug!(id = %order_id, "Hard-deleting order");

        sqlx::query("DELETE FROM order_lines WHERE order_id = ?1")
            .bind(order_id)
            .execute(&mut *conn)
            .await?;

        let result = sqlx::query("DELETE FROM orders WHERE id = ?1")
            .bind(order_id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Order", order_id));
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Metrics
    // -------------------------------------------------------------------------

    /// Flattens the live lines of active orders in a window, optionally
    /// filtered to a company through the buyer.
    ///
    /// Timestamps are compared through `datetime()` so the text encoding
    /// of the bound window bounds and the stored values cannot skew the
    /// range.
    pub async fn metric_lines_in_window(
        &self,
        window: &ReportWindow,
        company_id: Option<&str>,
    ) -> DbResult<Vec<MetricLineRow>> {
        let rows = sqlx::query_as::<_, MetricLineRow>(
            r#"
            SELECT
                o.currency AS currency,
                l.quantity AS quantity,
                l.unit_price_cents AS unit_price_cents,
                l.purchase_price_cents AS purchase_price_cents,
                l.line_total_cents AS line_total_cents
            FROM orders o
            INNER JOIN order_lines l ON l.order_id = o.id
            INNER JOIN customers c ON c.id = o.customer_id
            WHERE o.status = 'active'
              AND o.deleted_at IS NULL
              AND l.is_deleted = 0
              AND datetime(o.created_at) >= datetime(?1)
              AND datetime(o.created_at) <= datetime(?2)
              AND (?3 IS NULL OR c.company_id = ?3)
            ORDER BY o.created_at, l.created_at
            "#,
        )
        .bind(window.start)
        .bind(window.end)
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

/// Helper to generate a new order ID.
pub fn generate_order_id() -> String {
    Uuid::new_v4().to_string()
}

/// Helper to generate a new order-line ID.
pub fn generate_line_id() -> String {
    Uuid::new_v4().to_string()
}
