//! Equity curve points and running drawdown bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Equity snapshot after a bar has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    /// Capital plus unrealized P&L of open trades.
    pub equity: f64,
    /// Fractional decline from the running peak (0.0 at a new high).
    pub drawdown: f64,
}

/// Running peak / drawdown tracker.
///
/// `peak` and `max_drawdown` only ever increase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawdownTracker {
    pub peak: f64,
    /// Largest fractional drawdown seen so far (positive fraction).
    pub max_drawdown: f64,
    /// Largest absolute drawdown seen so far (currency).
    pub max_drawdown_abs: f64,
}

impl DrawdownTracker {
    pub fn new(initial_equity: f64) -> Self {
        Self {
            peak: initial_equity,
            max_drawdown: 0.0,
            max_drawdown_abs: 0.0,
        }
    }

    /// Fold a new equity value in; returns the current drawdown fraction.
    pub fn update(&mut self, equity: f64) -> f64 {
        if equity > self.peak {
            self.peak = equity;
        }
        let drop = (self.peak - equity).max(0.0);
        let drawdown = if self.peak > 0.0 { drop / self.peak } else { 0.0 };
        if drawdown > self.max_drawdown {
            self.max_drawdown = drawdown;
        }
        if drop > self.max_drawdown_abs {
            self.max_drawdown_abs = drop;
        }
        drawdown
    }
}
