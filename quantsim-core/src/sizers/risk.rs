//! Fixed-fractional risk sizer with Kelly and notional caps.
//!
//! # Formula
//! ```text
//! risk_amount   = capital * risk_per_trade
//! stop_distance = |price - stop|            (or price * default_stop_fraction)
//! quantity      = risk_amount / stop_distance
//! notional     <= capital * max(0, kelly_fraction * kelly)   (when an edge is known)
//! notional     <= capital * max_position_fraction
//! ```
//!
//! # Example
//! - Capital: $100,000, risk 1% ($1,000)
//! - Price $100, stop $98: 500 units ($50,000)
//! - Position cap 20%: $20,000, so 200 units

use crate::config::SizingConfig;
use crate::domain::{EdgeEstimate, Signal};
use crate::sizers::{stop_distance, Sizer};

#[derive(Debug, Clone, PartialEq)]
pub struct RiskSizer {
    risk_per_trade: f64,
    sizing: SizingConfig,
}

impl RiskSizer {
    pub fn new(risk_per_trade: f64, sizing: SizingConfig) -> Self {
        Self {
            risk_per_trade,
            sizing,
        }
    }

    fn truncate(&self, quantity: f64) -> f64 {
        let scale = 10f64.powi(self.sizing.quantity_precision as i32);
        ((quantity * scale) + 1e-9).floor() / scale
    }
}

impl Sizer for RiskSizer {
    fn size(
        &self,
        capital: f64,
        signal: &Signal,
        price: f64,
        strategy_edge: Option<&EdgeEstimate>,
    ) -> f64 {
        if !(capital.is_finite() && capital > 0.0) || !(price.is_finite() && price > 0.0) {
            return 0.0;
        }
        let Some(direction) = signal.direction.trade_direction() else {
            return 0.0;
        };
        let risk_amount = capital * self.risk_per_trade;
        let distance = stop_distance(signal.stop_loss, direction, price, &self.sizing);
        if !(risk_amount > 0.0) || !(distance > 0.0) {
            return 0.0;
        }

        let mut notional = (risk_amount / distance) * price;

        if let Some(edge) = signal.edge.as_ref().or(strategy_edge) {
            let kelly_cap = capital * (self.sizing.kelly_fraction * edge.kelly_fraction()).max(0.0);
            notional = notional.min(kelly_cap);
        }
        notional = notional.min(capital * self.sizing.max_position_fraction);

        self.truncate((notional / price).max(0.0))
    }

    fn name(&self) -> &str {
        "RiskSizer"
    }
}
