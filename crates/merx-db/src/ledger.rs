//! # Stock Ledger
//!
//! The single owner of stock mutation. Orders and direct receiving both
//! route every on-hand change through this service; no other component
//! writes stock counts.
//!
//! ## Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          StockLedger                                    │
//! │                                                                         │
//! │  check_availability(requests, relief)                                   │
//! │     └── (on_hand + relief) ≥ requested, summed across warehouses        │
//! │         relief = quantities the order being edited already holds,       │
//! │         so a line can grow into its own reservation                     │
//! │                                                                         │
//! │  apply_deltas(tx, deltas)          ← inside the order's transaction     │
//! │     ├── change < 0: charge entries, largest on-hand first, each slice   │
//! │     │   taken with UPDATE ... WHERE on_hand >= slice                    │
//! │     └── change > 0: credit the product's first-created entry            │
//! │                                                                         │
//! │  receive_stock(product, warehouse, qty)                                 │
//! │     └── merge-upsert: existing pair increments, otherwise insert        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Closing the Check-Then-Write Race
//! `check_availability` is the fail-fast validation, not the guard. The
//! guard is the conditional decrement in [`StockRepository::try_decrement`]:
//! when two transactions race for the last units, the loser's decrement
//! affects zero rows, the ledger reports `InsufficientStock`, and the
//! enclosing transaction rolls back. A batch is therefore applied fully or
//! not at all, and on-hand can never go negative.

use std::collections::{BTreeMap, HashMap};

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::error::{DbError, ServiceError, ServiceResult};
use crate::repository::product::ProductRepository;
use crate::repository::stock::{new_stock_entry, StockRepository};
use crate::repository::warehouse::WarehouseRepository;
use merx_core::validation::validate_quantity;
use merx_core::{StockDelta, StockEntry};

// =============================================================================
// Requests
// =============================================================================

/// One product's requested quantity in an availability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityRequest {
    pub product_id: String,
    pub quantity: i64,
}

impl AvailabilityRequest {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        AvailabilityRequest {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Previously reserved quantities per product of the order being edited.
pub type QuantityRelief = HashMap<String, i64>;

// =============================================================================
// Service
// =============================================================================

/// Owns per (product, warehouse) on-hand quantities.
#[derive(Debug, Clone)]
pub struct StockLedger {
    pool: SqlitePool,
    stock: StockRepository,
    products: ProductRepository,
    warehouses: WarehouseRepository,
}

impl StockLedger {
    /// Creates a new StockLedger over the shared pool.
    pub fn new(pool: SqlitePool) -> Self {
        StockLedger {
            stock: StockRepository::new(pool.clone()),
            products: ProductRepository::new(pool.clone()),
            warehouses: WarehouseRepository::new(pool.clone()),
            pool,
        }
    }

    // -------------------------------------------------------------------------
    // Availability
    // -------------------------------------------------------------------------

    /// Checks that every requested product has enough on-hand stock,
    /// reading inside the caller's transaction.
    ///
    /// Requests for the same product (e.g. two lines at different
    /// discounts) are summed before checking. A product with no stock
    /// entry at all is reported as not found rather than treated as zero.
    ///
    /// The check is read-only and idempotent: rerunning it against
    /// unchanged state yields the same verdict.
    pub async fn check_availability(
        &self,
        conn: &mut SqliteConnection,
        requests: &[AvailabilityRequest],
        relief: &QuantityRelief,
    ) -> ServiceResult<()> {
        let mut requested: BTreeMap<&str, i64> = BTreeMap::new();
        for request in requests {
            *requested.entry(request.product_id.as_str()).or_default() += request.quantity;
        }

        for (product_id, quantity) in requested {
            let (on_hand, entries) = self.stock.on_hand_for_product(conn, product_id).await?;

            if entries == 0 {
                return Err(ServiceError::NotFound {
                    entity: "StockEntry",
                    id: product_id.to_string(),
                });
            }

            let available = on_hand + relief.get(product_id).copied().unwrap_or(0);
            if available < quantity {
                debug!(
                    product_id = %product_id,
                    available,
                    requested = quantity,
                    "Availability check failed"
                );
                return Err(ServiceError::InsufficientStock {
                    product_id: product_id.to_string(),
                    available,
                    requested: quantity,
                });
            }
        }

        Ok(())
    }

    /// Standalone availability check against current state, for callers
    /// outside an order transaction.
    pub async fn check_availability_now(
        &self,
        requests: &[AvailabilityRequest],
    ) -> ServiceResult<()> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        self.check_availability(&mut conn, requests, &QuantityRelief::new())
            .await
    }

    // -------------------------------------------------------------------------
    // Deltas
    // -------------------------------------------------------------------------

    /// Applies a batch of signed per-product deltas inside the caller's
    /// transaction.
    ///
    /// Partial application is never observable: any failure propagates to
    /// the caller, which rolls the whole transaction back.
    pub async fn apply_deltas(
        &self,
        conn: &mut SqliteConnection,
        deltas: &[StockDelta],
    ) -> ServiceResult<()> {
        for delta in deltas {
            match delta.change {
                0 => {}
                change if change < 0 => self.charge(conn, &delta.product_id, -change).await?,
                change => self.credit(conn, &delta.product_id, change).await?,
            }
        }

        Ok(())
    }

    /// Takes `quantity` units of a product, draining entries largest
    /// on-hand first and splitting across warehouses when needed.
    async fn charge(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        quantity: i64,
    ) -> ServiceResult<()> {
        let entries = self.stock.entries_for_charge(conn, product_id).await?;
        if entries.is_empty() {
            return Err(ServiceError::NotFound {
                entity: "StockEntry",
                id: product_id.to_string(),
            });
        }

        let available: i64 = entries.iter().map(|e| e.on_hand).sum();
        let mut remaining = quantity;

        for entry in &entries {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(entry.on_hand);
            if take == 0 {
                continue;
            }
            if self.stock.try_decrement(conn, &entry.id, take).await? {
                remaining -= take;
            } else {
                // The guard refused a slice the snapshot said was there: a
                // concurrent transaction won those units first.
                warn!(
                    product_id = %product_id,
                    warehouse_id = %entry.warehouse_id,
                    take,
                    "Atomic decrement refused; concurrent depletion detected"
                );
            }
        }

        if remaining > 0 {
            warn!(
                product_id = %product_id,
                requested = quantity,
                short_by = remaining,
                "Stock charge could not be satisfied; rolling back"
            );
            return Err(ServiceError::InsufficientStock {
                product_id: product_id.to_string(),
                available,
                requested: quantity,
            });
        }

        debug!(product_id = %product_id, quantity, "Stock charged");
        Ok(())
    }

    /// Returns `quantity` units of a product to its first-created entry.
    async fn credit(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        quantity: i64,
    ) -> ServiceResult<()> {
        let entry = self
            .stock
            .first_entry(conn, product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound {
                entity: "StockEntry",
                id: product_id.to_string(),
            })?;

        self.stock.increment(conn, &entry.id, quantity).await?;

        debug!(product_id = %product_id, quantity, "Stock credited");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Receiving
    // -------------------------------------------------------------------------

    /// Receives stock into a warehouse with merge-upsert semantics.
    ///
    /// ## Merge Semantics
    /// If an entry for the (product, warehouse) pair exists its count is
    /// incremented; otherwise a new entry is created. Repeated stock-ins
    /// against the same pair accumulate; this behavior is load-bearing for
    /// inventory receiving.
    ///
    /// Missing products and warehouses are reported, not silently
    /// ignored. Runs in its own transaction.
    pub async fn receive_stock(
        &self,
        product_id: &str,
        warehouse_id: &str,
        quantity: i64,
    ) -> ServiceResult<StockEntry> {
        validate_quantity(quantity).map_err(ServiceError::Validation)?;

        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        self.products.get_active(&mut tx, product_id).await?;
        self.warehouses.require(&mut tx, warehouse_id).await?;

        let merged = self
            .stock
            .increment_pair(&mut tx, product_id, warehouse_id, quantity)
            .await?;

        if !merged {
            let entry = new_stock_entry(product_id, warehouse_id, quantity);
            self.stock.insert(&mut tx, &entry).await?;
        }

        let entry = self
            .stock
            .get_by_pair_in(&mut tx, product_id, warehouse_id)
            .await?
            .ok_or_else(|| ServiceError::Transaction("upserted stock entry vanished".to_string()))?;

        tx.commit().await.map_err(DbError::from)?;

        debug!(
            product_id = %product_id,
            warehouse_id = %warehouse_id,
            quantity,
            on_hand = entry.on_hand,
            "Stock received"
        );

        Ok(entry)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::product::new_product;
    use crate::repository::warehouse::new_warehouse;
    use merx_core::StockDelta;

    async fn setup() -> (Database, String, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let product = new_product("Widget", 100, "co-1");
        db.products().insert(&product).await.unwrap();

        let warehouse = new_warehouse("Main");
        db.warehouses().insert(&warehouse).await.unwrap();

        (db, product.id, warehouse.id)
    }

    fn delta(product: &str, change: i64) -> StockDelta {
        StockDelta {
            product_id: product.to_string(),
            change,
        }
    }

    #[tokio::test]
    async fn test_receive_stock_merges_repeated_ins() {
        let (db, product, warehouse) = setup().await;
        let ledger = db.ledger();

        let first = ledger.receive_stock(&product, &warehouse, 10).await.unwrap();
        assert_eq!(first.on_hand, 10);

        let second = ledger.receive_stock(&product, &warehouse, 5).await.unwrap();
        assert_eq!(second.on_hand, 15);
        // Same entry, not a second row
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_receive_stock_reports_missing_references() {
        let (db, product, warehouse) = setup().await;
        let ledger = db.ledger();

        let err = ledger.receive_stock("nope", &warehouse, 5).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { entity: "Product", .. }));

        let err = ledger.receive_stock(&product, "nope", 5).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { entity: "Warehouse", .. }));

        let err = ledger.receive_stock(&product, &warehouse, 0).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_availability_boundary() {
        let (db, product, warehouse) = setup().await;
        let ledger = db.ledger();
        ledger.receive_stock(&product, &warehouse, 10).await.unwrap();

        // requested == on_hand succeeds
        ledger
            .check_availability_now(&[AvailabilityRequest::new(&product, 10)])
            .await
            .unwrap();

        // on_hand + 1 fails
        let err = ledger
            .check_availability_now(&[AvailabilityRequest::new(&product, 11)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InsufficientStock { available: 10, requested: 11, .. }
        ));
    }

    #[tokio::test]
    async fn test_availability_is_idempotent() {
        let (db, product, warehouse) = setup().await;
        let ledger = db.ledger();
        ledger.receive_stock(&product, &warehouse, 4).await.unwrap();

        let request = [AvailabilityRequest::new(&product, 4)];
        ledger.check_availability_now(&request).await.unwrap();
        // Unchanged state, same verdict
        ledger.check_availability_now(&request).await.unwrap();
    }

    #[tokio::test]
    async fn test_availability_relief_allows_growth_into_reservation() {
        let (db, product, warehouse) = setup().await;
        let ledger = db.ledger();
        ledger.receive_stock(&product, &warehouse, 6).await.unwrap();

        // An order already holding 4 may grow to 7 even though on-hand is 6
        let mut relief = QuantityRelief::new();
        relief.insert(product.clone(), 4);

        let mut conn = db.pool().acquire().await.unwrap();
        ledger
            .check_availability(&mut conn, &[AvailabilityRequest::new(&product, 7)], &relief)
            .await
            .unwrap();

        // But not beyond on-hand + relief
        let err = ledger
            .check_availability(&mut conn, &[AvailabilityRequest::new(&product, 11)], &relief)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientStock { available: 10, .. }));
    }

    #[tokio::test]
    async fn test_unknown_product_is_reported_not_zeroed() {
        let (db, _, _) = setup().await;
        let ledger = db.ledger();

        let err = ledger
            .check_availability_now(&[AvailabilityRequest::new("ghost", 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { entity: "StockEntry", .. }));
    }

    #[tokio::test]
    async fn test_apply_deltas_round_trip_restores_counts() {
        let (db, product, warehouse) = setup().await;
        let ledger = db.ledger();
        ledger.receive_stock(&product, &warehouse, 10).await.unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        ledger
            .apply_deltas(&mut tx, &[delta(&product, -7)])
            .await
            .unwrap();
        // Exact inverse restores the original count
        ledger
            .apply_deltas(&mut tx, &[delta(&product, 7)])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let entry = db.stock().get_by_pair(&product, &warehouse).await.unwrap().unwrap();
        assert_eq!(entry.on_hand, 10);
    }

    #[tokio::test]
    async fn test_charge_splits_across_warehouses() {
        let (db, product, warehouse_a) = setup().await;
        let warehouse_b = new_warehouse("Annex");
        db.warehouses().insert(&warehouse_b).await.unwrap();

        let ledger = db.ledger();
        ledger.receive_stock(&product, &warehouse_a, 6).await.unwrap();
        ledger.receive_stock(&product, &warehouse_b.id, 4).await.unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        ledger
            .apply_deltas(&mut tx, &[delta(&product, -8)])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let a = db.stock().get_by_pair(&product, &warehouse_a).await.unwrap().unwrap();
        let b = db.stock().get_by_pair(&product, &warehouse_b.id).await.unwrap().unwrap();
        // Largest first: 6 drained, then 2 of 4
        assert_eq!(a.on_hand, 0);
        assert_eq!(b.on_hand, 2);
    }

    #[tokio::test]
    async fn test_overcharge_fails_and_rolls_back() {
        let (db, product, warehouse) = setup().await;
        let ledger = db.ledger();
        ledger.receive_stock(&product, &warehouse, 5).await.unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        let err = ledger
            .apply_deltas(&mut tx, &[delta(&product, -6)])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientStock { available: 5, .. }));
        drop(tx); // rollback

        let entry = db.stock().get_by_pair(&product, &warehouse).await.unwrap().unwrap();
        assert_eq!(entry.on_hand, 5);
    }
}
