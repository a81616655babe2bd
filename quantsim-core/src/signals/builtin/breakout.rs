//! Channel breakout provider
//!
//! BUY when the close breaks above the highest high of the previous
//! `period` bars, SELL when it breaks below the lowest low. The stop is the
//! channel midpoint.

use crate::config::{ConfigError, Timeframe};
use crate::domain::{MarketBar, SignalDirection};
use crate::signals::{ProviderError, ProviderSignal, SignalProvider};

#[derive(Debug, Clone)]
pub struct BreakoutProvider {
    name: String,
    period: usize,
    reward_ratio: f64,
}

impl BreakoutProvider {
    pub fn new(period: usize) -> Result<Self, ConfigError> {
        if period < 2 {
            return Err(ConfigError::Invalid {
                field: "breakout.period",
                reason: format!("must be >= 2, got {period}"),
            });
        }
        Ok(Self {
            name: format!("breakout_{period}"),
            period,
            reward_ratio: 2.0,
        })
    }

    pub fn with_reward_ratio(mut self, reward_ratio: f64) -> Self {
        self.reward_ratio = reward_ratio;
        self
    }
}

impl SignalProvider for BreakoutProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_bars(&self) -> usize {
        self.period + 1
    }

    fn evaluate(
        &self,
        window: &[MarketBar],
        _timeframe: Timeframe,
    ) -> Result<Vec<ProviderSignal>, ProviderError> {
        self.require_bars(window)?;
        let last = window.len() - 1;
        let channel = &window[last - self.period..last];
        let high = channel.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let low = channel.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        let width = high - low;
        if !(width > 0.0) {
            return Ok(Vec::new());
        }

        let close = window[last].close;
        let (direction, excess) = if close > high {
            (SignalDirection::Buy, close - high)
        } else if close < low {
            (SignalDirection::Sell, low - close)
        } else {
            return Ok(Vec::new());
        };

        let stop = (high + low) / 2.0;
        let target = close + (close - stop) * self.reward_ratio;
        let thrust = (excess / width).min(1.0);

        Ok(vec![ProviderSignal::new(direction, 0.65 + 0.3 * thrust)
            .with_strength(0.55 + 0.45 * thrust)
            .with_entry(close)
            .with_stop(stop)
            .with_target(target)
            .with_risk_reward(self.reward_ratio)])
    }
}
