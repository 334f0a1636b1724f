//! # Order Lifecycle
//!
//! Orchestrates create/update/cancel/delete of orders: validation, actor
//! resolution, reconciliation, availability, persistence and stock deltas,
//! all inside one all-or-nothing transaction per operation.
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_order / update_order                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  validate request ──► resolve actor (admin XOR employee)                │
//! │       │                                                                 │
//! │       ▼                    BEGIN ───────────────────────────────┐       │
//! │  reconcile(persisted, submitted)      (pure, merx-core)         │       │
//! │       │                                                         │       │
//! │       ▼                                                         │       │
//! │  StockLedger.check_availability  (+ previous-quantity relief)   │       │
//! │       │                                                         │       │
//! │       ▼                                                         │       │
//! │  persist order + line mutations, recompute total                │       │
//! │       │                                                         │       │
//! │       ▼                                                         │       │
//! │  StockLedger.apply_deltas (atomic guard)                        │       │
//! │       │                                                         │       │
//! │       ▼                    COMMIT ──────────────────────────────┘       │
//! │                                                                         │
//! │  Any failure anywhere → transaction dropped → rollback; no partial      │
//! │  order and no partial stock mutation is ever observable.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every operation runs under a deadline (`DbConfig::operation_timeout`).
//! Expiry drops the in-flight transaction, which rolls it back, and the
//! caller receives a timeout failure rather than a partial commit.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{DbError, ServiceError, ServiceResult};
use crate::ledger::{AvailabilityRequest, QuantityRelief, StockLedger};
use crate::repository::customer::CustomerRepository;
use crate::repository::order::{generate_line_id, generate_order_id, OrderRepository};
use crate::repository::product::ProductRepository;
use crate::repository::staff::StaffRepository;
use merx_core::reconcile::{insert_total_cents, reconcile};
use merx_core::validation::{validate_lines, validate_order_request};
use merx_core::{
    Actor, Order, OrderAggregate, OrderLine, OrderRequest, OrderStatus, SubmittedLine,
    ValidationError, DEFAULT_TENANT_ID,
};

// =============================================================================
// Results
// =============================================================================

/// Summary returned by successful create and update operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    pub order_id: String,
    pub total_cents: i64,
    pub line_count: usize,
}

/// What the two-step deletion protocol decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// No other active order referenced the order's products; rows were
    /// removed.
    Deleted,
    /// Referential usage was detected; the order was passivated instead.
    Passivated,
}

// =============================================================================
// Service
// =============================================================================

/// Orchestrates the order state machine:
/// `Draft → Active → {Updated → Active} → {Passive | Deleted}`.
#[derive(Debug, Clone)]
pub struct OrderLifecycle {
    pool: SqlitePool,
    op_timeout: Duration,
    ledger: StockLedger,
    orders: OrderRepository,
    products: ProductRepository,
    customers: CustomerRepository,
    staff: StaffRepository,
}

impl OrderLifecycle {
    /// Creates a new OrderLifecycle over the shared pool.
    pub fn new(pool: SqlitePool, op_timeout: Duration) -> Self {
        OrderLifecycle {
            ledger: StockLedger::new(pool.clone()),
            orders: OrderRepository::new(pool.clone()),
            products: ProductRepository::new(pool.clone()),
            customers: CustomerRepository::new(pool.clone()),
            staff: StaffRepository::new(pool.clone()),
            pool,
            op_timeout,
        }
    }

    // -------------------------------------------------------------------------
    // Create
    // -------------------------------------------------------------------------

    /// Creates an order from a validated request.
    ///
    /// ## Sequence
    /// 1. Validate lines (non-empty, positive quantities, discount range,
    ///    no duplicate (product, discount) keys) - nothing attempted on
    ///    failure
    /// 2. Resolve the acting party
    /// 3. In one transaction: verify buyer and products, snapshot purchase
    ///    prices, check availability, persist order + lines, charge stock
    pub async fn create_order(&self, request: &OrderRequest) -> ServiceResult<OrderReceipt> {
        validate_order_request(request)?;
        let actor = self.resolve_actor(&request.placed_by).await?;

        self.bounded(self.create_in_tx(request, actor)).await
    }

    async fn create_in_tx(
        &self,
        request: &OrderRequest,
        actor: Actor,
    ) -> ServiceResult<OrderReceipt> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        self.customers.require(&mut tx, &request.customer_id).await?;

        // A create is an update against an empty persisted set; routing it
        // through the reconciler keeps the delta math in one place.
        let rec = reconcile(&[], &request.lines);

        let now = Utc::now();
        let order_id = generate_order_id();

        let mut lines = Vec::with_capacity(rec.inserts.len());
        for submitted in &rec.inserts {
            let product = self.products.get_active(&mut tx, &submitted.product_id).await?;
            lines.push(materialize_line(
                &order_id,
                submitted,
                product.purchase_price_cents,
                now,
            ));
        }

        self.ledger
            .check_availability(
                &mut tx,
                &availability_requests(&request.lines),
                &QuantityRelief::new(),
            )
            .await?;

        let total_cents: i64 = lines.iter().map(|l| l.line_total_cents).sum();
        let order = Order {
            id: order_id.clone(),
            tenant_id: DEFAULT_TENANT_ID.to_string(),
            customer_id: request.customer_id.clone(),
            currency: request.currency,
            actor,
            total_cents,
            status: OrderStatus::Active,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        self.orders.insert_order(&mut tx, &order).await?;
        for line in &lines {
            self.orders.insert_line(&mut tx, line).await?;
        }

        self.ledger.apply_deltas(&mut tx, &rec.deltas).await?;

        tx.commit().await.map_err(DbError::from)?;

        info!(
            order_id = %order_id,
            total = total_cents,
            lines = lines.len(),
            "Order created"
        );

        Ok(OrderReceipt {
            order_id,
            total_cents,
            line_count: lines.len(),
        })
    }

    // -------------------------------------------------------------------------
    // Update
    // -------------------------------------------------------------------------

    /// Replaces an order's line set with the submitted state.
    ///
    /// Availability is checked with previous-quantity relief before any
    /// mutation is applied (fail-fast): a line may grow up to its own
    /// previously reserved amount without a false negative, and a rejected
    /// update leaves no trace.
    pub async fn update_order(
        &self,
        order_id: &str,
        submitted: &[SubmittedLine],
    ) -> ServiceResult<OrderReceipt> {
        validate_lines(submitted)?;

        self.bounded(self.update_in_tx(order_id, submitted)).await
    }

    async fn update_in_tx(
        &self,
        order_id: &str,
        submitted: &[SubmittedLine],
    ) -> ServiceResult<OrderReceipt> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let aggregate = self.orders.load_aggregate(&mut tx, order_id).await?;
        require_active(&aggregate)?;

        let rec = reconcile(&aggregate.lines, submitted);
        if rec.is_noop() {
            debug!(order_id = %order_id, "Update is a no-op");
            return Ok(OrderReceipt {
                order_id: order_id.to_string(),
                total_cents: aggregate.order.total_cents,
                line_count: aggregate.lines.len(),
            });
        }

        // Relief: what this order already holds, per product
        let mut relief = QuantityRelief::new();
        for line in &aggregate.lines {
            *relief.entry(line.product_id.clone()).or_default() += line.quantity;
        }

        self.ledger
            .check_availability(&mut tx, &availability_requests(submitted), &relief)
            .await?;

        // Line mutations
        for update in &rec.updates {
            self.orders
                .update_line_quantity(&mut tx, &update.line_id, update.quantity, update.line_total_cents)
                .await?;
        }
        for removal in &rec.removals {
            self.orders.delete_line(&mut tx, &removal.id).await?;
        }

        let now = Utc::now();
        for submitted_line in &rec.inserts {
            let product = self
                .products
                .get_active(&mut tx, &submitted_line.product_id)
                .await?;
            let line = materialize_line(order_id, submitted_line, product.purchase_price_cents, now);
            self.orders.insert_line(&mut tx, &line).await?;
        }

        // Recompute the denormalized total from the surviving state
        let removed: HashSet<&str> = rec.removals.iter().map(|l| l.id.as_str()).collect();
        let updated: HashMap<&str, i64> = rec
            .updates
            .iter()
            .map(|u| (u.line_id.as_str(), u.line_total_cents))
            .collect();
        let mut total_cents: i64 = aggregate
            .lines
            .iter()
            .filter(|l| !removed.contains(l.id.as_str()))
            .map(|l| updated.get(l.id.as_str()).copied().unwrap_or(l.line_total_cents))
            .sum();
        total_cents += rec.inserts.iter().map(insert_total_cents).sum::<i64>();

        self.orders.update_total(&mut tx, order_id, total_cents).await?;

        self.ledger.apply_deltas(&mut tx, &rec.deltas).await?;

        tx.commit().await.map_err(DbError::from)?;

        let line_count = aggregate.lines.len() - rec.removals.len() + rec.inserts.len();
        info!(
            order_id = %order_id,
            total = total_cents,
            lines = line_count,
            "Order updated"
        );

        Ok(OrderReceipt {
            order_id: order_id.to_string(),
            total_cents,
            line_count,
        })
    }

    // -------------------------------------------------------------------------
    // Cancel / Delete
    // -------------------------------------------------------------------------

    /// Cancels an order: passivates it and returns every line's quantity
    /// to stock.
    pub async fn cancel_order(&self, order_id: &str) -> ServiceResult<()> {
        self.bounded(self.cancel_in_tx(order_id)).await
    }

    async fn cancel_in_tx(&self, order_id: &str) -> ServiceResult<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let aggregate = self.orders.load_aggregate(&mut tx, order_id).await?;
        require_active(&aggregate)?;

        // Dropping every line returns every reserved unit
        let rec = reconcile(&aggregate.lines, &[]);
        self.orders.passivate(&mut tx, order_id).await?;
        self.ledger.apply_deltas(&mut tx, &rec.deltas).await?;

        tx.commit().await.map_err(DbError::from)?;

        info!(order_id = %order_id, "Order cancelled");
        Ok(())
    }

    /// Deletes an order through the two-step protocol.
    ///
    /// ## Passivation Over Deletion
    /// If any line's product appears in another active order, the order is
    /// passivated rather than hard-deleted, preserving referential
    /// history. Both branches release the order's stock reservation; a
    /// previously passivated order releases nothing (it already did).
    pub async fn delete_order(&self, order_id: &str) -> ServiceResult<DeleteOutcome> {
        self.bounded(self.delete_in_tx(order_id)).await
    }

    async fn delete_in_tx(&self, order_id: &str) -> ServiceResult<DeleteOutcome> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let aggregate = self.orders.load_aggregate(&mut tx, order_id).await?;

        // canHardDelete: no live line of any other active order may share
        // a product with this order
        let mut referenced = false;
        let products: HashSet<&str> = aggregate.lines.iter().map(|l| l.product_id.as_str()).collect();
        for product_id in products {
            if self
                .products
                .exists_active_order_referencing(&mut tx, product_id, Some(order_id))
                .await?
            {
                referenced = true;
                break;
            }
        }

        // A passive order's stock was already returned at passivation time
        if aggregate.order.status == OrderStatus::Active {
            let rec = reconcile(&aggregate.lines, &[]);
            self.ledger.apply_deltas(&mut tx, &rec.deltas).await?;
        }

        let outcome = if referenced {
            if aggregate.order.status == OrderStatus::Active {
                self.orders.passivate(&mut tx, order_id).await?;
            }
            DeleteOutcome::Passivated
        } else {
            self.orders.hard_delete(&mut tx, order_id).await?;
            DeleteOutcome::Deleted
        };

        tx.commit().await.map_err(DbError::from)?;

        info!(order_id = %order_id, ?outcome, "Order deleted");
        Ok(outcome)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Fetches an order with its live lines.
    pub async fn get_order(&self, order_id: &str) -> ServiceResult<OrderAggregate> {
        self.orders
            .get_aggregate(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound {
                entity: "Order",
                id: order_id.to_string(),
            })
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Resolves the acting party: administrator lookup first, employee
    /// second; failing both is a validation failure.
    async fn resolve_actor(&self, reference: &str) -> ServiceResult<Actor> {
        self.staff
            .resolve_actor(reference)
            .await?
            .ok_or_else(|| {
                ServiceError::Validation(ValidationError::UnknownActor {
                    reference: reference.to_string(),
                })
            })
    }

    /// Runs a transactional operation under the configured deadline.
    /// Expiry drops the future (and its transaction: rollback) and
    /// reports a timeout.
    async fn bounded<T>(
        &self,
        operation: impl Future<Output = ServiceResult<T>>,
    ) -> ServiceResult<T> {
        match timeout(self.op_timeout, operation).await {
            Ok(result) => result,
            Err(_) => {
                warn!(deadline = ?self.op_timeout, "Operation deadline elapsed; rolled back");
                Err(ServiceError::Timeout(self.op_timeout))
            }
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Update and cancel only apply to active orders.
fn require_active(aggregate: &OrderAggregate) -> ServiceResult<()> {
    if aggregate.order.status != OrderStatus::Active || aggregate.order.deleted_at.is_some() {
        return Err(ServiceError::NotFound {
            entity: "Order (active)",
            id: aggregate.order.id.clone(),
        });
    }
    Ok(())
}

/// Availability requests for the full submitted state: the new quantity
/// per product, summed across discount keys. Relief covers what the order
/// already holds, so the check is exactly
/// `(on_hand + previously reserved) ≥ newly requested`.
fn availability_requests(submitted: &[SubmittedLine]) -> Vec<AvailabilityRequest> {
    let mut per_product: BTreeMap<&str, i64> = BTreeMap::new();
    for line in submitted {
        *per_product.entry(line.product_id.as_str()).or_default() += line.quantity;
    }
    per_product
        .into_iter()
        .map(|(product_id, quantity)| AvailabilityRequest {
            product_id: product_id.to_string(),
            quantity,
        })
        .collect()
}

/// Materializes a submitted line: ids, price snapshots, computed total.
fn materialize_line(
    order_id: &str,
    submitted: &SubmittedLine,
    purchase_price_cents: i64,
    now: DateTime<Utc>,
) -> OrderLine {
    OrderLine {
        id: generate_line_id(),
        order_id: order_id.to_string(),
        product_id: submitted.product_id.clone(),
        quantity: submitted.quantity,
        unit_price_cents: submitted.unit_price_cents,
        discount_bps: submitted.discount_bps,
        purchase_price_cents,
        line_total_cents: insert_total_cents(submitted),
        is_deleted: false,
        created_at: now,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::customer::new_customer;
    use crate::repository::product::new_product;
    use crate::repository::warehouse::new_warehouse;
    use merx_core::Currency;

    struct Fixture {
        db: Database,
        product_id: String,
        customer_id: String,
    }

    async fn setup() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let product = new_product("Widget", 100, "co-1");
        db.products().insert(&product).await.unwrap();
        let warehouse = new_warehouse("Main");
        db.warehouses().insert(&warehouse).await.unwrap();
        let customer = new_customer("Acme", "co-2");
        db.customers().insert(&customer).await.unwrap();
        db.staff().insert_employee("ext-emp", "Dana").await.unwrap();

        db.ledger()
            .receive_stock(&product.id, &warehouse.id, 10)
            .await
            .unwrap();

        Fixture {
            db,
            product_id: product.id,
            customer_id: customer.id,
        }
    }

    fn request(fixture: &Fixture, qty: i64) -> OrderRequest {
        OrderRequest {
            customer_id: fixture.customer_id.clone(),
            currency: Currency::Domestic,
            placed_by: "ext-emp".to_string(),
            lines: vec![SubmittedLine {
                product_id: fixture.product_id.clone(),
                quantity: qty,
                unit_price_cents: 250,
                discount_bps: 0,
            }],
        }
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_actor() {
        let fixture = setup().await;
        let mut req = request(&fixture, 2);
        req.placed_by = "nobody".to_string();

        let err = fixture.db.lifecycle().create_order(&req).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ValidationError::UnknownActor { .. })));
    }

    #[tokio::test]
    async fn test_create_attributes_actor() {
        let fixture = setup().await;
        // An admin sharing the reference wins the lookup order
        let admin_id = fixture.db.staff().insert_admin("ext-adm", "Root").await.unwrap();
        let mut req = request(&fixture, 1);
        req.placed_by = "ext-adm".to_string();

        let receipt = fixture.db.lifecycle().create_order(&req).await.unwrap();
        let aggregate = fixture.db.lifecycle().get_order(&receipt.order_id).await.unwrap();
        assert_eq!(aggregate.order.actor, Actor::Admin(admin_id));
    }

    #[tokio::test]
    async fn test_create_rolls_back_completely_on_missing_product() {
        let fixture = setup().await;
        let mut req = request(&fixture, 2);
        req.lines.push(SubmittedLine {
            product_id: "ghost".to_string(),
            quantity: 1,
            unit_price_cents: 50,
            discount_bps: 0,
        });

        let err = fixture.db.lifecycle().create_order(&req).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { entity: "Product", .. }));

        // No order row, no stock mutation
        let (on_hand, _) = {
            let mut conn = fixture.db.pool().acquire().await.unwrap();
            fixture
                .db
                .stock()
                .on_hand_for_product(&mut conn, &fixture.product_id)
                .await
                .unwrap()
        };
        assert_eq!(on_hand, 10);
    }

    #[tokio::test]
    async fn test_create_rejects_insufficient_stock_without_mutation() {
        let fixture = setup().await;
        let err = fixture
            .db
            .lifecycle()
            .create_order(&request(&fixture, 11))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientStock { available: 10, .. }));
    }

    #[tokio::test]
    async fn test_update_keeps_total_invariant() {
        let fixture = setup().await;
        let lifecycle = fixture.db.lifecycle();
        let receipt = lifecycle.create_order(&request(&fixture, 4)).await.unwrap();
        assert_eq!(receipt.total_cents, 4 * 250);

        let updated = lifecycle
            .update_order(
                &receipt.order_id,
                &[SubmittedLine {
                    product_id: fixture.product_id.clone(),
                    quantity: 7,
                    unit_price_cents: 250,
                    discount_bps: 0,
                }],
            )
            .await
            .unwrap();
        assert_eq!(updated.total_cents, 7 * 250);

        let aggregate = lifecycle.get_order(&receipt.order_id).await.unwrap();
        assert_eq!(aggregate.order.total_cents, aggregate.computed_total_cents());
    }

    #[tokio::test]
    async fn test_update_is_fail_fast_on_insufficiency() {
        let fixture = setup().await;
        let lifecycle = fixture.db.lifecycle();
        let receipt = lifecycle.create_order(&request(&fixture, 4)).await.unwrap();

        // 10 on hand, 4 reserved: 6 + 4 relief = 10 < 11
        let err = lifecycle
            .update_order(&receipt.order_id, &request(&fixture, 11).lines)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientStock { available: 10, requested: 11, .. }));

        // Nothing changed
        let aggregate = lifecycle.get_order(&receipt.order_id).await.unwrap();
        assert_eq!(aggregate.lines[0].quantity, 4);
        assert_eq!(aggregate.order.total_cents, 4 * 250);
    }

    #[tokio::test]
    async fn test_update_rejects_passive_order() {
        let fixture = setup().await;
        let lifecycle = fixture.db.lifecycle();
        let receipt = lifecycle.create_order(&request(&fixture, 2)).await.unwrap();
        lifecycle.cancel_order(&receipt.order_id).await.unwrap();

        let err = lifecycle
            .update_order(&receipt.order_id, &request(&fixture, 1).lines)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { entity: "Order (active)", .. }));
    }

    #[tokio::test]
    async fn test_matched_line_keeps_price_snapshot() {
        let fixture = setup().await;
        let lifecycle = fixture.db.lifecycle();
        let receipt = lifecycle.create_order(&request(&fixture, 4)).await.unwrap();

        // Same (product, discount) key but a different submitted price:
        // the persisted snapshot must win
        let mut lines = request(&fixture, 5).lines;
        lines[0].unit_price_cents = 999;
        lifecycle.update_order(&receipt.order_id, &lines).await.unwrap();

        let aggregate = lifecycle.get_order(&receipt.order_id).await.unwrap();
        assert_eq!(aggregate.lines[0].unit_price_cents, 250);
        assert_eq!(aggregate.lines[0].line_total_cents, 5 * 250);
    }
}
