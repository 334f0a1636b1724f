//! End-to-end order lifecycle against the stock ledger: create reserves,
//! update charges only the difference (previous-quantity relief), delete
//! returns everything.

mod common;

use common::Fixture;
use merx_db::DeleteOutcome;

#[tokio::test]
async fn create_update_delete_round_trips_stock() {
    // Product P has on-hand 10 in warehouse W
    let fixture = Fixture::with_stock(10).await;
    let lifecycle = fixture.db.lifecycle();

    // Create order with line (P, qty 4) → on-hand becomes 6
    let receipt = lifecycle
        .create_order(&fixture.order_request(4, 250))
        .await
        .unwrap();
    assert_eq!(fixture.on_hand().await, 6);
    assert_eq!(receipt.total_cents, 4 * 250);

    // Update the line to qty 7 → relief of the previous 4 applies before
    // charging 7: 6 + 4 − 7 = 3
    let updated = lifecycle
        .update_order(&receipt.order_id, &fixture.order_request(7, 250).lines)
        .await
        .unwrap();
    assert_eq!(fixture.on_hand().await, 3);
    assert_eq!(updated.total_cents, 7 * 250);

    // Delete the order (no other order references P) → on-hand returns
    // to 10 and the rows are gone
    let outcome = lifecycle.delete_order(&receipt.order_id).await.unwrap();
    assert_eq!(outcome, DeleteOutcome::Deleted);
    assert_eq!(fixture.on_hand().await, 10);

    let err = lifecycle.get_order(&receipt.order_id).await.unwrap_err();
    assert!(matches!(err, merx_db::ServiceError::NotFound { .. }));
}

#[tokio::test]
async fn shrinking_a_line_returns_the_difference() {
    let fixture = Fixture::with_stock(10).await;
    let lifecycle = fixture.db.lifecycle();

    let receipt = lifecycle
        .create_order(&fixture.order_request(8, 250))
        .await
        .unwrap();
    assert_eq!(fixture.on_hand().await, 2);

    lifecycle
        .update_order(&receipt.order_id, &fixture.order_request(3, 250).lines)
        .await
        .unwrap();
    assert_eq!(fixture.on_hand().await, 7);
}

#[tokio::test]
async fn removing_a_line_in_an_update_returns_its_quantity() {
    let fixture = Fixture::with_stock(10).await;
    let lifecycle = fixture.db.lifecycle();

    // Two lines on the same product at different discounts
    let mut request = fixture.order_request(4, 250);
    let mut second = request.lines[0].clone();
    second.quantity = 2;
    second.discount_bps = 1000;
    request.lines.push(second);

    let receipt = lifecycle.create_order(&request).await.unwrap();
    assert_eq!(fixture.on_hand().await, 4);

    // Submitting only the first line drops the second and returns its 2
    let updated = lifecycle
        .update_order(&receipt.order_id, &request.lines[..1])
        .await
        .unwrap();
    assert_eq!(updated.line_count, 1);
    assert_eq!(fixture.on_hand().await, 6);
}

#[tokio::test]
async fn cancel_passivates_and_returns_stock() {
    let fixture = Fixture::with_stock(10).await;
    let lifecycle = fixture.db.lifecycle();

    let receipt = lifecycle
        .create_order(&fixture.order_request(5, 250))
        .await
        .unwrap();
    assert_eq!(fixture.on_hand().await, 5);

    lifecycle.cancel_order(&receipt.order_id).await.unwrap();
    assert_eq!(fixture.on_hand().await, 10);

    // The order survives as a passive row with its lines flagged deleted
    let order = fixture
        .db
        .orders()
        .get_by_id(&receipt.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, merx_core::OrderStatus::Passive);
    assert!(order.deleted_at.is_some());

    let aggregate = fixture
        .db
        .orders()
        .get_aggregate(&receipt.order_id)
        .await
        .unwrap()
        .unwrap();
    assert!(aggregate.lines.is_empty());

    // Cancelling twice is reported, not double-credited
    let err = lifecycle.cancel_order(&receipt.order_id).await.unwrap_err();
    assert!(matches!(err, merx_db::ServiceError::NotFound { .. }));
    assert_eq!(fixture.on_hand().await, 10);
}

#[tokio::test]
async fn deleting_a_cancelled_order_does_not_return_stock_twice() {
    let fixture = Fixture::with_stock(10).await;
    let lifecycle = fixture.db.lifecycle();

    let receipt = lifecycle
        .create_order(&fixture.order_request(5, 250))
        .await
        .unwrap();
    lifecycle.cancel_order(&receipt.order_id).await.unwrap();
    assert_eq!(fixture.on_hand().await, 10);

    let outcome = lifecycle.delete_order(&receipt.order_id).await.unwrap();
    assert_eq!(outcome, DeleteOutcome::Deleted);
    assert_eq!(fixture.on_hand().await, 10);
}
