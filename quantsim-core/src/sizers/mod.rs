//! Position sizers: determine trade quantity.
//!
//! Sizers turn capital, a risk budget and a candidate signal into a
//! quantity. They never decide whether to trade.

pub mod risk;

pub use risk::RiskSizer;

use crate::config::SizingConfig;
use crate::domain::{EdgeEstimate, Signal, TradeDirection};

/// Position sizing logic.
///
/// Returns a quantity ≥ 0; 0 means "do not open".
pub trait Sizer: Send + Sync {
    fn size(
        &self,
        capital: f64,
        signal: &Signal,
        price: f64,
        strategy_edge: Option<&EdgeEstimate>,
    ) -> f64;

    fn name(&self) -> &str;
}

/// Stop level for a new trade: the signal's stop when it lies on the losing
/// side of `price`, otherwise the default fractional distance.
pub fn resolve_stop(
    stop_loss: Option<f64>,
    direction: TradeDirection,
    price: f64,
    sizing: &SizingConfig,
) -> f64 {
    match stop_loss {
        Some(stop) if direction.is_valid_stop(price, stop) => stop,
        _ => price * (1.0 - direction.sign() * sizing.default_stop_fraction),
    }
}

/// Distance between `price` and the resolved stop.
pub fn stop_distance(
    stop_loss: Option<f64>,
    direction: TradeDirection,
    price: f64,
    sizing: &SizingConfig,
) -> f64 {
    (price - resolve_stop(stop_loss, direction, price, sizing)).abs()
}
