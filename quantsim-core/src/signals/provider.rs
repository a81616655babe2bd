//! Signal provider contract and raw provider output.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Timeframe;
use crate::domain::{EdgeEstimate, MarketBar, Signal, SignalDirection};

/// Provider failure. Always recovered by the aggregator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("insufficient data: need {required} bars, have {available}")]
    InsufficientData { required: usize, available: usize },
    #[error("provider failed: {0}")]
    Failed(String),
}

/// Pattern-recognition source of trading signals.
///
/// # Invariants
/// - `evaluate()` sees only bars up to and including the current bar
/// - `evaluate()` is deterministic for the same window
/// - providers are shared across concurrent runs, so they hold no run state
pub trait SignalProvider: Send + Sync {
    /// Unique name; becomes the `source` tag of every signal it emits.
    fn name(&self) -> &str;

    /// Bars required before the provider can say anything.
    fn min_bars(&self) -> usize {
        1
    }

    fn evaluate(
        &self,
        window: &[MarketBar],
        timeframe: Timeframe,
    ) -> Result<Vec<ProviderSignal>, ProviderError>;

    /// Convenience guard for implementors.
    fn require_bars(&self, window: &[MarketBar]) -> Result<(), ProviderError> {
        if window.len() < self.min_bars() {
            return Err(ProviderError::InsufficientData {
                required: self.min_bars(),
                available: window.len(),
            });
        }
        Ok(())
    }
}

/// Un-normalized provider output.
///
/// Confidence and strength may arrive on a 0–100 scale, strength may be
/// missing, and several take-profit targets may be given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSignal {
    pub direction: SignalDirection,
    pub confidence: f64,
    pub strength: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profits: Vec<f64>,
    pub entry_price: Option<f64>,
    pub risk_reward: Option<f64>,
    pub edge: Option<EdgeEstimate>,
}

impl ProviderSignal {
    pub fn new(direction: SignalDirection, confidence: f64) -> Self {
        Self {
            direction,
            confidence,
            strength: None,
            stop_loss: None,
            take_profits: Vec::new(),
            entry_price: None,
            risk_reward: None,
            edge: None,
        }
    }

    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = Some(strength);
        self
    }

    pub fn with_stop(mut self, stop_loss: f64) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }

    pub fn with_target(mut self, take_profit: f64) -> Self {
        self.take_profits.push(take_profit);
        self
    }

    pub fn with_entry(mut self, entry_price: f64) -> Self {
        self.entry_price = Some(entry_price);
        self
    }

    pub fn with_risk_reward(mut self, risk_reward: f64) -> Self {
        self.risk_reward = Some(risk_reward);
        self
    }

    pub fn with_edge(mut self, edge: EdgeEstimate) -> Self {
        self.edge = Some(edge);
        self
    }

    /// Normalize into a [`Signal`] tagged with `source`.
    ///
    /// Returns `None` for HOLD and for outputs without a finite confidence.
    /// `reference_price` (the bar close) stands in for a missing entry price
    /// when picking the take-profit target and checking the stop side. A stop
    /// that is not strictly on the losing side is dropped.
    pub fn normalize(self, source: &str, reference_price: f64) -> Option<Signal> {
        if self.direction == SignalDirection::Hold {
            return None;
        }
        let confidence = unit_scale(self.confidence)?;
        let strength = self.strength.and_then(unit_scale).unwrap_or(confidence);
        let entry_price = self.entry_price.and_then(valid_price);
        let anchor = entry_price.unwrap_or(reference_price);
        let take_profit = nearest_target(self.direction, anchor, &self.take_profits);
        let stop_loss = self.stop_loss.and_then(valid_price).filter(|&stop| {
            self.direction
                .trade_direction()
                .is_some_and(|d| d.is_valid_stop(anchor, stop))
        });

        Some(Signal {
            direction: self.direction,
            confidence,
            strength,
            stop_loss,
            take_profit,
            entry_price,
            risk_reward: self.risk_reward.filter(|r| r.is_finite() && *r >= 0.0),
            edge: self.edge,
            source: source.to_string(),
        })
    }
}

/// Rescale a 0–100 value to 0–1 and clamp.
fn unit_scale(value: f64) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    let scaled = if value > 1.0 { value / 100.0 } else { value };
    Some(scaled.clamp(0.0, 1.0))
}

fn valid_price(price: f64) -> Option<f64> {
    (price.is_finite() && price > 0.0).then_some(price)
}

/// Nearest target on the profitable side of `anchor`.
fn nearest_target(direction: SignalDirection, anchor: f64, targets: &[f64]) -> Option<f64> {
    let valid = targets.iter().copied().filter_map(valid_price);
    match direction {
        SignalDirection::Buy => valid.filter(|&t| t > anchor).reduce(f64::min),
        SignalDirection::Sell => valid.filter(|&t| t < anchor).reduce(f64::max),
        SignalDirection::Hold => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hold_is_discarded() {
        assert!(ProviderSignal::new(SignalDirection::Hold, 0.9)
            .normalize("p", 100.0)
            .is_none());
    }

    #[test]
    fn percent_scale_is_rescaled() {
        let s = ProviderSignal::new(SignalDirection::Buy, 85.0)
            .with_strength(140.0)
            .normalize("p", 100.0)
            .unwrap();
        assert!((s.confidence - 0.85).abs() < 1e-12);
        assert_eq!(s.strength, 1.0);
        assert_eq!(s.source, "p");
    }

    #[test]
    fn missing_strength_defaults_to_confidence() {
        let s = ProviderSignal::new(SignalDirection::Sell, 0.7)
            .normalize("p", 100.0)
            .unwrap();
        assert_eq!(s.strength, 0.7);
    }

    #[test]
    fn nan_confidence_dropped() {
        assert!(ProviderSignal::new(SignalDirection::Buy, f64::NAN)
            .normalize("p", 100.0)
            .is_none());
    }

    #[test]
    fn nearest_profitable_target_kept() {
        let long = ProviderSignal::new(SignalDirection::Buy, 0.8)
            .with_target(110.0)
            .with_target(104.0)
            .with_target(95.0)
            .normalize("p", 100.0)
            .unwrap();
        assert_eq!(long.take_profit, Some(104.0));

        let short = ProviderSignal::new(SignalDirection::Sell, 0.8)
            .with_entry(100.0)
            .with_target(90.0)
            .with_target(96.0)
            .with_target(f64::NAN)
            .normalize("p", 120.0)
            .unwrap();
        assert_eq!(short.take_profit, Some(96.0));
    }

    #[test]
    fn stop_on_profitable_side_dropped() {
        let long = ProviderSignal::new(SignalDirection::Buy, 0.8)
            .with_stop(102.0)
            .with_target(110.0)
            .normalize("p", 100.0)
            .unwrap();
        assert_eq!(long.stop_loss, None);
        assert_eq!(long.take_profit, Some(110.0));

        let short = ProviderSignal::new(SignalDirection::Sell, 0.8)
            .with_entry(100.0)
            .with_stop(97.0)
            .normalize("p", 95.0)
            .unwrap();
        assert_eq!(short.stop_loss, None);

        let at_entry = ProviderSignal::new(SignalDirection::Buy, 0.8)
            .with_stop(100.0)
            .normalize("p", 100.0)
            .unwrap();
        assert_eq!(at_entry.stop_loss, None);

        let kept = ProviderSignal::new(SignalDirection::Sell, 0.8)
            .with_stop(103.0)
            .normalize("p", 100.0)
            .unwrap();
        assert_eq!(kept.stop_loss, Some(103.0));
    }

    #[test]
    fn non_finite_prices_dropped() {
        let s = ProviderSignal::new(SignalDirection::Buy, 0.8)
            .with_stop(f64::INFINITY)
            .with_entry(-1.0)
            .normalize("p", 100.0)
            .unwrap();
        assert_eq!(s.stop_loss, None);
        assert_eq!(s.entry_price, None);
    }
}
