//! Calendar-month return and volatility buckets.

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use quantsim_core::domain::EquityPoint;

use crate::metrics::{bar_returns, std_dev};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyBucket {
    pub year: i32,
    pub month: u32,
    /// Equity change over the month, relative to the prior month's closing
    /// equity (initial capital for the first month).
    pub return_pct: f64,
    /// Population std-dev of the month's bar returns.
    pub volatility: f64,
    pub bars: usize,
}

/// Group the equity curve into calendar months (UTC), in time order.
pub fn monthly_buckets(equity_curve: &[EquityPoint], initial_capital: f64) -> Vec<MonthlyBucket> {
    let returns = bar_returns(equity_curve, initial_capital);
    let mut buckets: Vec<MonthlyBucket> = Vec::new();
    let mut month_returns: Vec<f64> = Vec::new();
    let mut opening = initial_capital;

    for (i, point) in equity_curve.iter().enumerate() {
        let key = (point.timestamp.year(), point.timestamp.month());
        let same_month = buckets
            .last()
            .is_some_and(|b| (b.year, b.month) == key);

        if !same_month {
            if let Some(prev) = buckets.last_mut() {
                prev.volatility = std_dev(&month_returns);
                opening = equity_curve[i - 1].equity;
            }
            month_returns.clear();
            buckets.push(MonthlyBucket {
                year: key.0,
                month: key.1,
                return_pct: 0.0,
                volatility: 0.0,
                bars: 0,
            });
        }

        month_returns.push(returns[i]);
        if let Some(current) = buckets.last_mut() {
            current.bars += 1;
            current.return_pct = if opening > 0.0 {
                (point.equity - opening) / opening * 100.0
            } else {
                0.0
            };
        }
    }
    if let Some(last) = buckets.last_mut() {
        last.volatility = std_dev(&month_returns);
    }
    buckets
}
