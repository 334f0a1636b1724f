//! Shared fixture for scenario tests: an in-memory database seeded with a
//! product, a warehouse, a buyer and an employee actor.

use merx_core::{Currency, OrderRequest, SubmittedLine};
use merx_db::repository::customer::new_customer;
use merx_db::repository::product::new_product;
use merx_db::repository::warehouse::new_warehouse;
use merx_db::{Database, DbConfig};

pub const EMPLOYEE_REF: &str = "ext-emp-1";

pub struct Fixture {
    pub db: Database,
    pub product_id: String,
    pub warehouse_id: String,
    pub customer_id: String,
}

impl Fixture {
    /// Seeds the world with `on_hand` units of one product (cost 100) in
    /// one warehouse.
    pub async fn with_stock(on_hand: i64) -> Fixture {
        // RUST_LOG=debug cargo test -- --nocapture shows the service logs
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();

        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let product = new_product("Widget", 100, "company-seller");
        db.products().insert(&product).await.unwrap();

        let warehouse = new_warehouse("Main");
        db.warehouses().insert(&warehouse).await.unwrap();

        let customer = new_customer("Acme", "company-acme");
        db.customers().insert(&customer).await.unwrap();

        db.staff().insert_employee(EMPLOYEE_REF, "Dana").await.unwrap();

        if on_hand > 0 {
            db.ledger()
                .receive_stock(&product.id, &warehouse.id, on_hand)
                .await
                .unwrap();
        }

        Fixture {
            db,
            product_id: product.id,
            warehouse_id: warehouse.id,
            customer_id: customer.id,
        }
    }

    /// A single-line order request for the seeded product.
    pub fn order_request(&self, quantity: i64, unit_price_cents: i64) -> OrderRequest {
        OrderRequest {
            customer_id: self.customer_id.clone(),
            currency: Currency::Domestic,
            placed_by: EMPLOYEE_REF.to_string(),
            lines: vec![SubmittedLine {
                product_id: self.product_id.clone(),
                quantity,
                unit_price_cents,
                discount_bps: 0,
            }],
        }
    }

    /// Current on-hand count for the seeded (product, warehouse) pair.
    pub async fn on_hand(&self) -> i64 {
        self.db
            .stock()
            .get_by_pair(&self.product_id, &self.warehouse_id)
            .await
            .unwrap()
            .map(|entry| entry.on_hand)
            .unwrap_or(0)
    }
}
