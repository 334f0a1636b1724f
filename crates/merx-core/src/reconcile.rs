//! # Order Line Reconciliation
//!
//! Diffs the persisted line set of an order against a newly submitted line
//! set and derives the minimal set of line mutations and stock deltas.
//!
//! ## The Diff
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │              reconcile(persisted, submitted)                            │
//! │                                                                         │
//! │  persisted lines          submitted lines                               │
//! │  ┌──────────────┐         ┌──────────────┐                              │
//! │  │ (P1, 0%) × 4 │ ──┬──── │ (P1, 0%) × 7 │   MATCHED → update qty,      │
//! │  │ (P2, 0%) × 2 │   │     │ (P3, 5%) × 1 │             delta 4−7 = −3   │
//! │  └──────────────┘   │     └──────────────┘                              │
//! │                     │                                                   │
//! │    (P2, 0%) only on the left   → REMOVED  → delta +2                    │
//! │    (P3, 5%) only on the right  → INSERTED → delta −1                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Matching is keyed by `(product_id, discount_bps)`, not by line identity.
//! Changing a line's discount while keeping its product therefore shows up
//! as a removal plus an insertion. This mirrors the observed behavior of
//! the system this engine replaces and is deliberately preserved; callers
//! that want in-place discount edits must submit them as such a pair.
//!
//! ## Purity
//! `reconcile` performs no I/O, never fails, and is deterministic: output
//! ordering follows the input ordering of the two slices. It is the most
//! directly testable component in the workspace, including a randomized
//! delta-sum property test below.
//!
//! Negative deltas charge stock (a sale grew), positive deltas return it.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::money::line_total;
use crate::types::{OrderLine, SubmittedLine};

// =============================================================================
// Output Types
// =============================================================================

/// An in-place mutation of a matched persisted line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineUpdate {
    pub line_id: String,
    pub product_id: String,
    /// The overwritten quantity.
    pub quantity: i64,
    /// Recomputed from the frozen unit price and discount at the new
    /// quantity.
    pub line_total_cents: i64,
}

/// A signed per-product stock adjustment.
///
/// `change < 0` decreases on-hand (sale or quantity growth);
/// `change > 0` increases it (removal, deletion, cancellation, shrink).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockDelta {
    pub product_id: String,
    pub change: i64,
}

/// The full result of reconciling two line sets.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Matched lines whose quantity is overwritten.
    pub updates: Vec<LineUpdate>,
    /// Submitted lines with no persisted counterpart; to be materialized
    /// with a fresh purchase-price snapshot.
    pub inserts: Vec<SubmittedLine>,
    /// Persisted lines absent from the submitted set; to be deleted with
    /// their quantity returned to stock.
    pub removals: Vec<OrderLine>,
    /// Per-product summed stock deltas, zero entries elided, ordered by
    /// product id.
    pub deltas: Vec<StockDelta>,
}

impl Reconciliation {
    /// True when the submitted state equals the persisted state.
    pub fn is_noop(&self) -> bool {
        self.updates.is_empty() && self.inserts.is_empty() && self.removals.is_empty()
    }
}

// =============================================================================
// Reconcile
// =============================================================================

/// Diffs `persisted` (the live lines of the order, empty for a create)
/// against `submitted` (the desired state).
///
/// ## Rules
/// - Match key is `(product_id, discount_bps)`.
/// - Matched: quantity overwritten, total recomputed from the frozen
///   snapshot; stock delta `old − new`.
/// - Inserted: stock delta `−new`.
/// - Removed: stock delta `+old`.
/// - Deltas are summed per product; products that net to zero are elided.
///
/// The caller is expected to have validated `submitted` (positive
/// quantities, discount range, no duplicate keys); see
/// [`crate::validation::validate_lines`].
pub fn reconcile(persisted: &[OrderLine], submitted: &[SubmittedLine]) -> Reconciliation {
    // Index persisted lines by match key. Duplicate keys cannot occur in
    // committed state because inserts go through the same validation.
    let mut by_key: HashMap<(String, u32), &OrderLine> = HashMap::with_capacity(persisted.len());
    for line in persisted {
        by_key.insert((line.product_id.clone(), line.discount_bps), line);
    }

    let mut deltas: BTreeMap<String, i64> = BTreeMap::new();
    let mut updates = Vec::new();
    let mut inserts = Vec::new();
    let mut matched_ids: HashSet<&str> = HashSet::new();

    for want in submitted {
        match by_key.remove(&(want.product_id.clone(), want.discount_bps)) {
            Some(have) => {
                matched_ids.insert(have.id.as_str());
                *deltas.entry(have.product_id.clone()).or_default() +=
                    have.quantity - want.quantity;
                if have.quantity != want.quantity {
                    updates.push(LineUpdate {
                        line_id: have.id.clone(),
                        product_id: have.product_id.clone(),
                        quantity: want.quantity,
                        line_total_cents: have.total_at_quantity(want.quantity).cents(),
                    });
                }
            }
            None => {
                *deltas.entry(want.product_id.clone()).or_default() -= want.quantity;
                inserts.push(want.clone());
            }
        }
    }

    // Whatever was not matched is removed. Iterate the original slice so
    // the output order stays deterministic.
    let mut removals = Vec::new();
    for line in persisted {
        if !matched_ids.contains(line.id.as_str()) {
            *deltas.entry(line.product_id.clone()).or_default() += line.quantity;
            removals.push(line.clone());
        }
    }

    let deltas = deltas
        .into_iter()
        .filter(|(_, change)| *change != 0)
        .map(|(product_id, change)| StockDelta { product_id, change })
        .collect();

    Reconciliation {
        updates,
        inserts,
        removals,
        deltas,
    }
}

/// Materializes the totals of lines about to be inserted.
///
/// Small helper shared by create and update so the total formula lives in
/// exactly one place ([`line_total`]).
pub fn insert_total_cents(line: &SubmittedLine) -> i64 {
    line_total(line.quantity, line.unit_price_cents, line.discount_bps).cents()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;

    fn persisted_line(id: &str, product: &str, qty: i64, discount: u32) -> OrderLine {
        OrderLine {
            id: id.to_string(),
            order_id: "o-1".to_string(),
            product_id: product.to_string(),
            quantity: qty,
            unit_price_cents: 250,
            discount_bps: discount,
            purchase_price_cents: 100,
            line_total_cents: line_total(qty, 250, discount).cents(),
            is_deleted: false,
            created_at: Utc::now(),
        }
    }

    fn submitted_line(product: &str, qty: i64, discount: u32) -> SubmittedLine {
        SubmittedLine {
            product_id: product.to_string(),
            quantity: qty,
            unit_price_cents: 250,
            discount_bps: discount,
        }
    }

    fn delta_for<'a>(rec: &'a Reconciliation, product: &str) -> Option<i64> {
        rec.deltas
            .iter()
            .find(|d| d.product_id == product)
            .map(|d| d.change)
    }

    #[test]
    fn test_create_is_all_inserts() {
        let rec = reconcile(&[], &[submitted_line("p1", 4, 0), submitted_line("p2", 2, 500)]);

        assert!(rec.updates.is_empty());
        assert!(rec.removals.is_empty());
        assert_eq!(rec.inserts.len(), 2);
        assert_eq!(delta_for(&rec, "p1"), Some(-4));
        assert_eq!(delta_for(&rec, "p2"), Some(-2));
    }

    #[test]
    fn test_clear_is_all_removals() {
        let persisted = vec![persisted_line("l1", "p1", 4, 0)];
        let rec = reconcile(&persisted, &[]);

        assert!(rec.inserts.is_empty());
        assert_eq!(rec.removals.len(), 1);
        assert_eq!(delta_for(&rec, "p1"), Some(4));
    }

    #[test]
    fn test_matched_quantity_change() {
        let persisted = vec![persisted_line("l1", "p1", 4, 0)];
        let rec = reconcile(&persisted, &[submitted_line("p1", 7, 0)]);

        assert_eq!(rec.updates.len(), 1);
        assert!(rec.inserts.is_empty());
        assert!(rec.removals.is_empty());
        assert_eq!(rec.updates[0].quantity, 7);
        assert_eq!(rec.updates[0].line_total_cents, 7 * 250);
        // delta = old − new
        assert_eq!(delta_for(&rec, "p1"), Some(-3));
    }

    #[test]
    fn test_unchanged_line_is_noop() {
        let persisted = vec![persisted_line("l1", "p1", 4, 0)];
        let rec = reconcile(&persisted, &[submitted_line("p1", 4, 0)]);

        assert!(rec.is_noop());
        assert!(rec.deltas.is_empty());
    }

    #[test]
    fn test_discount_change_is_remove_plus_insert() {
        // Preserved policy: the match key includes the discount, so a
        // discount edit shows up as removal + insertion.
        let persisted = vec![persisted_line("l1", "p1", 4, 0)];
        let rec = reconcile(&persisted, &[submitted_line("p1", 4, 1000)]);

        assert_eq!(rec.removals.len(), 1);
        assert_eq!(rec.inserts.len(), 1);
        assert!(rec.updates.is_empty());
        // +4 for the removal, −4 for the insertion: nets to zero
        assert_eq!(delta_for(&rec, "p1"), None);
    }

    #[test]
    fn test_matched_total_uses_frozen_price() {
        // The persisted snapshot is 250/line; the submitted price of 999
        // must not leak into the recomputed total.
        let persisted = vec![persisted_line("l1", "p1", 2, 0)];
        let mut submitted = submitted_line("p1", 5, 0);
        submitted.unit_price_cents = 999;

        let rec = reconcile(&persisted, &[submitted]);
        assert_eq!(rec.updates[0].line_total_cents, 5 * 250);
    }

    #[test]
    fn test_mixed_diff() {
        let persisted = vec![
            persisted_line("l1", "p1", 4, 0),
            persisted_line("l2", "p2", 2, 0),
        ];
        let submitted = vec![submitted_line("p1", 7, 0), submitted_line("p3", 1, 500)];
        let rec = reconcile(&persisted, &submitted);

        assert_eq!(rec.updates.len(), 1);
        assert_eq!(rec.inserts.len(), 1);
        assert_eq!(rec.removals.len(), 1);
        assert_eq!(delta_for(&rec, "p1"), Some(-3));
        assert_eq!(delta_for(&rec, "p2"), Some(2));
        assert_eq!(delta_for(&rec, "p3"), Some(-1));
    }

    #[test]
    fn test_deltas_sum_across_discount_keys_of_one_product() {
        let submitted = vec![
            submitted_line("p1", 3, 0),
            submitted_line("p1", 2, 1000),
            submitted_line("p2", 1, 0),
        ];
        let rec = reconcile(&[], &submitted);
        assert_eq!(delta_for(&rec, "p1"), Some(-5));
        assert_eq!(delta_for(&rec, "p2"), Some(-1));
    }

    /// Property: for every product, the summed delta equals
    /// `Σ old quantity − Σ new quantity` over randomized line sets.
    #[test]
    fn test_delta_sum_property_randomized() {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        let products = ["p1", "p2", "p3", "p4", "p5"];
        let discounts = [0u32, 500, 1000];

        for _ in 0..500 {
            // Random distinct-key subsets for the old and new states
            let mut old_lines = Vec::new();
            let mut new_lines = Vec::new();
            let mut line_no = 0;
            for product in &products {
                for discount in &discounts {
                    if rng.gen_bool(0.4) {
                        line_no += 1;
                        old_lines.push(persisted_line(
                            &format!("l{line_no}"),
                            product,
                            rng.gen_range(1..=9),
                            *discount,
                        ));
                    }
                    if rng.gen_bool(0.4) {
                        new_lines.push(submitted_line(product, rng.gen_range(1..=9), *discount));
                    }
                }
            }

            let rec = reconcile(&old_lines, &new_lines);

            let mut expected: BTreeMap<String, i64> = BTreeMap::new();
            for l in &old_lines {
                *expected.entry(l.product_id.clone()).or_default() += l.quantity;
            }
            for l in &new_lines {
                *expected.entry(l.product_id.clone()).or_default() -= l.quantity;
            }

            for product in &products {
                let want = expected.get(*product).copied().unwrap_or(0);
                let got = rec
                    .deltas
                    .iter()
                    .find(|d| d.product_id == *product)
                    .map(|d| d.change)
                    .unwrap_or(0);
                assert_eq!(got, want, "delta mismatch for {product}");
            }

            // Every submitted line is either matched or inserted, and every
            // unmatched persisted line is removed
            let old_keys: std::collections::HashSet<(String, u32)> = old_lines
                .iter()
                .map(|l| (l.product_id.clone(), l.discount_bps))
                .collect();
            let matched = new_lines
                .iter()
                .filter(|l| old_keys.contains(&(l.product_id.clone(), l.discount_bps)))
                .count();
            assert_eq!(rec.inserts.len(), new_lines.len() - matched);
            assert_eq!(rec.removals.len(), old_lines.len() - matched);
        }
    }
}
