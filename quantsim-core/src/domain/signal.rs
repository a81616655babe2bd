//! Signal: a normalized, immutable trading intent produced by a provider.

use serde::{Deserialize, Serialize};

use super::trade::TradeDirection;

/// Direction of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalDirection {
    Buy,
    Sell,
    Hold,
}

impl SignalDirection {
    /// The trade direction this signal would open, if any.
    pub fn trade_direction(self) -> Option<TradeDirection> {
        match self {
            Self::Buy => Some(TradeDirection::Long),
            Self::Sell => Some(TradeDirection::Short),
            Self::Hold => None,
        }
    }

    /// True if this signal points against an open trade's direction.
    pub fn opposes(self, direction: TradeDirection) -> bool {
        matches!(
            (self, direction),
            (Self::Sell, TradeDirection::Long) | (Self::Buy, TradeDirection::Short)
        )
    }
}

/// Historical edge statistics: win probability and average win/loss magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeEstimate {
    /// Probability of a winning trade, in [0, 1].
    pub win_rate: f64,
    /// Average winning trade magnitude (positive).
    pub average_win: f64,
    /// Average losing trade magnitude (positive).
    pub average_loss: f64,
}

impl EdgeEstimate {
    /// Full Kelly fraction `f = (p·W − (1−p)·L) / W`.
    ///
    /// Returns 0.0 when the average win is not positive or any input is non-finite.
    pub fn kelly_fraction(&self) -> f64 {
        let p = self.win_rate;
        let w = self.average_win;
        let l = self.average_loss.abs();
        if !(p.is_finite() && w.is_finite() && l.is_finite()) || w <= 0.0 {
            return 0.0;
        }
        (p * w - (1.0 - p) * l) / w
    }
}

/// A normalized signal. Never mutated after the aggregator emits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub direction: SignalDirection,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Strength in [0, 1].
    pub strength: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub entry_price: Option<f64>,
    /// Planned risk-reward ratio, when the provider states one explicitly.
    pub risk_reward: Option<f64>,
    pub edge: Option<EdgeEstimate>,
    /// Name of the provider that produced this signal.
    pub source: String,
}

impl Signal {
    /// Minimal signal with no price levels.
    pub fn new(direction: SignalDirection, confidence: f64, strength: f64, source: &str) -> Self {
        Self {
            direction,
            confidence,
            strength,
            stop_loss: None,
            take_profit: None,
            entry_price: None,
            risk_reward: None,
            edge: None,
            source: source.to_string(),
        }
    }

    pub fn with_levels(mut self, stop_loss: Option<f64>, take_profit: Option<f64>) -> Self {
        self.stop_loss = stop_loss;
        self.take_profit = take_profit;
        self
    }

    pub fn with_entry_price(mut self, entry_price: f64) -> Self {
        self.entry_price = Some(entry_price);
        self
    }

    pub fn with_edge(mut self, edge: EdgeEstimate) -> Self {
        self.edge = Some(edge);
        self
    }

    /// Planned risk-reward ratio.
    ///
    /// Uses the explicit ratio if present, else `|tp − entry| / |entry − stop|`
    /// with `reference_price` standing in for a missing entry price.
    /// Returns `None` when it cannot be determined.
    pub fn planned_risk_reward(&self, reference_price: f64) -> Option<f64> {
        if let Some(rrr) = self.risk_reward {
            return Some(rrr);
        }
        let entry = self.entry_price.unwrap_or(reference_price);
        let (stop, target) = (self.stop_loss?, self.take_profit?);
        let sign = self.direction.trade_direction()?.sign();
        let risk = (entry - stop) * sign;
        let reward = (target - entry) * sign;
        if risk <= f64::EPSILON || reward < 0.0 {
            return None;
        }
        Some(reward / risk)
    }
}
