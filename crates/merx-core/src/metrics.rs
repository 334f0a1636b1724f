//! # Reporting Windows and Metric Math
//!
//! Pure time-window resolution and percent-change arithmetic for the
//! financial metrics. The I/O half (order selection, rate lookup) lives in
//! `merx-db::metrics`; everything here is deterministic given its inputs.
//!
//! ## Window Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  year given:      current = [Jan 1 00:00:00, Dec 31 23:59:59] of year   │
//! │                   prior   = same bounds of year − 1                     │
//! │                                                                         │
//! │  no year:         current = trailing 30 days ending now                 │
//! │                   prior   = the 30 days immediately before that         │
//! │                                                                         │
//! │        prior                current                                     │
//! │  ──┬───────────────┬───────────────┬──►  time                           │
//! │    now−60d       now−30d          now                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// Length of the rolling window used when no calendar year is given.
pub const ROLLING_WINDOW_DAYS: i64 = 30;

// =============================================================================
// Metric
// =============================================================================

/// The three reportable metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Sum of discounted line totals.
    Sales,
    /// Sum of cost of goods (purchase price × quantity).
    Expense,
    /// Discounted sale value minus cost, per line.
    Profit,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Sales => "sales",
            Metric::Expense => "expense",
            Metric::Profit => "profit",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Report Window
// =============================================================================

/// An inclusive date window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportWindow {
    /// Builds a window, rejecting `end < start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<ReportWindow, ValidationError> {
        if end < start {
            return Err(ValidationError::InvalidFormat {
                field: "window".to_string(),
                reason: "end precedes start".to_string(),
            });
        }
        Ok(ReportWindow { start, end })
    }

    /// The calendar-year window `[Jan 1 00:00:00, Dec 31 23:59:59]`.
    pub fn calendar_year(year: i32) -> Result<ReportWindow, ValidationError> {
        let bounds = Utc
            .with_ymd_and_hms(year, 1, 1, 0, 0, 0)
            .single()
            .zip(Utc.with_ymd_and_hms(year, 12, 31, 23, 59, 59).single());
        match bounds {
            Some((start, end)) => Ok(ReportWindow { start, end }),
            None => Err(ValidationError::OutOfRange {
                field: "year".to_string(),
                min: 1,
                max: 9999,
            }),
        }
    }

    /// The trailing window of `days` ending at `end`.
    pub fn trailing_days(end: DateTime<Utc>, days: i64) -> ReportWindow {
        ReportWindow {
            start: end - Duration::days(days),
            end,
        }
    }

    /// Resolves the current and prior windows for a metrics query.
    ///
    /// With a year, the prior window is the previous calendar year (not a
    /// naive same-length shift, which would drift across leap years).
    /// Without one, it is the preceding [`ROLLING_WINDOW_DAYS`]-day span.
    pub fn resolve(
        year: Option<i32>,
        now: DateTime<Utc>,
    ) -> Result<(ReportWindow, ReportWindow), ValidationError> {
        match year {
            Some(y) => Ok((
                ReportWindow::calendar_year(y)?,
                ReportWindow::calendar_year(y - 1)?,
            )),
            None => {
                let current = ReportWindow::trailing_days(now, ROLLING_WINDOW_DAYS);
                let prior = ReportWindow::trailing_days(current.start, ROLLING_WINDOW_DAYS);
                Ok((current, prior))
            }
        }
    }

    /// Whether `at` falls inside the window (inclusive bounds).
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

// =============================================================================
// Metric Result
// =============================================================================

/// The ephemeral result of one metrics query.
///
/// Recomputed on every call; never persisted or cached. Totals are in
/// reporting-currency cents, as `f64` because foreign amounts pass through
/// a floating-point multiplier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricResult {
    pub metric: Metric,
    pub window: ReportWindow,
    pub prior_window: ReportWindow,
    /// Company filter the query ran with, if any.
    pub company_id: Option<String>,
    pub current_total: f64,
    pub previous_total: f64,
    pub change_pct: f64,
}

/// Percent change between two period totals.
///
/// ## Rules
/// - both zero → 0
/// - prior zero, current positive → 100
/// - otherwise `(current − previous) / previous × 100`
pub fn percent_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        if current > 0.0 {
            100.0
        } else {
            0.0
        }
    } else {
        (current - previous) / previous * 100.0
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
