//! # Financial Metrics
//!
//! Currency-normalized rolling-window aggregation over committed orders:
//! sales, cost of goods and profit, each reported for a current window and
//! the immediately preceding window of equal length, with percent change.
//!
//! ## One Algorithm, Three Extractors
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  salesMetric / expenseMetric / profitMetric                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  resolve windows (calendar year, or trailing 30 days)                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  resolve the latest rate snapshot ONCE (absent → multipliers of 1.0)    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  per window: active, non-deleted orders in range                        │
//! │              → live lines (deleted lines excluded)                      │
//! │              → loss-making lines excluded                               │
//! │              → Σ extractor(line) × multiplier(order currency)           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  percent change between the two sums                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Read-only: runs against committed state outside any order transaction
//! and tolerates stale rate data by design. Results are recomputed on
//! every query and never cached.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::ServiceResult;
use crate::repository::order::{MetricLineRow, OrderRepository};
use crate::repository::rates::ExchangeRateRepository;
use merx_core::{percent_change, Metric, MetricResult, RateSet, ReportWindow};

// =============================================================================
// Service
// =============================================================================

/// Computes sales, expense and profit metrics.
#[derive(Debug, Clone)]
pub struct FinancialMetrics {
    orders: OrderRepository,
    rates: ExchangeRateRepository,
}

impl FinancialMetrics {
    /// Creates a new FinancialMetrics service over the shared pool.
    pub fn new(pool: SqlitePool) -> Self {
        FinancialMetrics {
            orders: OrderRepository::new(pool.clone()),
            rates: ExchangeRateRepository::new(pool),
        }
    }

    /// Sum of discounted line totals.
    pub async fn sales(
        &self,
        year: Option<i32>,
        company_id: Option<&str>,
    ) -> ServiceResult<MetricResult> {
        self.compute(Metric::Sales, year, company_id, false).await
    }

    /// Sum of cost of goods (purchase-price snapshot × quantity).
    ///
    /// ## Arguments
    /// * `cost_in_order_currency` - when set, cost snapshots are treated
    ///   as denominated in the order currency and converted with its
    ///   multiplier; otherwise they are summed at face value (domestic).
    pub async fn expense(
        &self,
        year: Option<i32>,
        company_id: Option<&str>,
        cost_in_order_currency: bool,
    ) -> ServiceResult<MetricResult> {
        self.compute(Metric::Expense, year, company_id, cost_in_order_currency)
            .await
    }

    /// Discounted sale value minus cost, per line.
    ///
    /// Profit is NOT `sales − expense`: the discount applies to the sale
    /// value of each line before currency conversion, so a discounted
    /// foreign-currency line contributes its converted margin, not the
    /// difference of two separately converted sums.
    pub async fn profit(
        &self,
        year: i32,
        company_id: Option<&str>,
        cost_in_order_currency: bool,
    ) -> ServiceResult<MetricResult> {
        self.compute(Metric::Profit, Some(year), company_id, cost_in_order_currency)
            .await
    }

    // -------------------------------------------------------------------------
    // Shared algorithm
    // -------------------------------------------------------------------------

    async fn compute(
        &self,
        metric: Metric,
        year: Option<i32>,
        company_id: Option<&str>,
        cost_in_order_currency: bool,
    ) -> ServiceResult<MetricResult> {
        let (window, prior_window) = ReportWindow::resolve(year, chrono::Utc::now())?;

        // One snapshot per query; both windows see the same multipliers
        let rates = RateSet::from_snapshot(self.rates.latest().await?.as_ref());

        let current_total = self
            .window_total(metric, &window, company_id, rates, cost_in_order_currency)
            .await?;
        let previous_total = self
            .window_total(metric, &prior_window, company_id, rates, cost_in_order_currency)
            .await?;

        let change_pct = percent_change(current_total, previous_total);

        debug!(
            %metric,
            current_total,
            previous_total,
            change_pct,
            "Metric computed"
        );

        Ok(MetricResult {
            metric,
            window,
            prior_window,
            company_id: company_id.map(str::to_string),
            current_total,
            previous_total,
            change_pct,
        })
    }

    async fn window_total(
        &self,
        metric: Metric,
        window: &ReportWindow,
        company_id: Option<&str>,
        rates: RateSet,
        cost_in_order_currency: bool,
    ) -> ServiceResult<f64> {
        let rows = self.orders.metric_lines_in_window(window, company_id).await?;

        let total = rows
            .iter()
            .filter(|row| row.is_profitable())
            .map(|row| line_value(metric, row, rates, cost_in_order_currency))
            .sum();

        Ok(total)
    }
}

/// The per-line contribution of one metric, in reporting-currency cents.
pub fn line_value(
    metric: Metric,
    row: &MetricLineRow,
    rates: RateSet,
    cost_in_order_currency: bool,
) -> f64 {
    let multiplier = rates.multiplier(row.currency);
    let cost_multiplier = if cost_in_order_currency { multiplier } else { 1.0 };

    match metric {
        Metric::Sales => row.sale_value_cents() as f64 * multiplier,
        Metric::Expense => row.cost_cents() as f64 * cost_multiplier,
        // Discount first, conversion second
        Metric::Profit => {
            row.sale_value_cents() as f64 * multiplier
                - row.cost_cents() as f64 * cost_multiplier
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use merx_core::Currency;

    fn row(currency: Currency, qty: i64, unit: i64, total: i64, cost: i64) -> MetricLineRow {
        MetricLineRow {
            currency,
            quantity: qty,
            unit_price_cents: unit,
            purchase_price_cents: cost,
            line_total_cents: total,
        }
    }

    fn rates() -> RateSet {
        RateSet {
            dollar: 2.0,
            euro: 3.0,
        }
    }

    #[test]
    fn test_sales_extractor_converts_sale_value() {
        let usd = row(Currency::Usd, 2, 500, 900, 100);
        assert_eq!(line_value(Metric::Sales, &usd, rates(), false), 1800.0);

        let domestic = row(Currency::Domestic, 2, 500, 900, 100);
        assert_eq!(line_value(Metric::Sales, &domestic, rates(), false), 900.0);
    }

    #[test]
    fn test_sales_extractor_falls_back_to_quantity_times_unit() {
        // Total never materialized: quantity × unit price stands in
        let legacy = row(Currency::Domestic, 3, 400, 0, 100);
        assert_eq!(line_value(Metric::Sales, &legacy, rates(), false), 1200.0);
    }

    #[test]
    fn test_expense_extractor_cost_currency_flag() {
        let eur = row(Currency::Eur, 4, 500, 2000, 100);
        // Face-value cost by default
        assert_eq!(line_value(Metric::Expense, &eur, rates(), false), 400.0);
        // Converted when the cost is denominated in the order currency
        assert_eq!(line_value(Metric::Expense, &eur, rates(), true), 1200.0);
    }

    #[test]
    fn test_profit_applies_discount_before_conversion() {
        // 2 × 500 with a 10% discount → sale value 900, cost 200
        let usd = row(Currency::Usd, 2, 500, 900, 100);

        // Domestic-cost profit: 900×2 − 200 = 1600
        assert_eq!(line_value(Metric::Profit, &usd, rates(), false), 1600.0);

        // Order-currency cost: (900 − 200)×2 = 1400
        assert_eq!(line_value(Metric::Profit, &usd, rates(), true), 1400.0);
    }
}
