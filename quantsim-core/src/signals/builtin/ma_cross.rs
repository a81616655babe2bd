//! Moving-average crossover provider
//!
//! - BUY when the fast SMA crosses above the slow SMA on the current bar
//! - SELL when it crosses below
//! - nothing otherwise
//!
//! Stops sit `stop_fraction` away from the close; the target is
//! `reward_ratio` stop distances away on the other side.

use crate::config::{ConfigError, Timeframe};
use crate::domain::{MarketBar, SignalDirection};
use crate::signals::{ProviderError, ProviderSignal, SignalProvider};

#[derive(Debug, Clone)]
pub struct MaCrossProvider {
    name: String,
    fast_period: usize,
    slow_period: usize,
    stop_fraction: f64,
    reward_ratio: f64,
}

impl MaCrossProvider {
    pub fn new(fast_period: usize, slow_period: usize) -> Result<Self, ConfigError> {
        if fast_period == 0 || slow_period <= fast_period {
            return Err(ConfigError::Invalid {
                field: "ma_cross.periods",
                reason: format!("need 0 < fast < slow, got {fast_period}/{slow_period}"),
            });
        }
        Ok(Self {
            name: format!("ma_cross_{fast_period}_{slow_period}"),
            fast_period,
            slow_period,
            stop_fraction: 0.02,
            reward_ratio: 2.0,
        })
    }

    pub fn with_levels(mut self, stop_fraction: f64, reward_ratio: f64) -> Self {
        self.stop_fraction = stop_fraction;
        self.reward_ratio = reward_ratio;
        self
    }

    fn sma(bars: &[MarketBar], period: usize) -> f64 {
        let recent = &bars[bars.len() - period..];
        recent.iter().map(|b| b.close).sum::<f64>() / period as f64
    }
}

impl SignalProvider for MaCrossProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_bars(&self) -> usize {
        self.slow_period + 1
    }

    fn evaluate(
        &self,
        window: &[MarketBar],
        _timeframe: Timeframe,
    ) -> Result<Vec<ProviderSignal>, ProviderError> {
        self.require_bars(window)?;
        let prev = &window[..window.len() - 1];
        let fast_now = Self::sma(window, self.fast_period);
        let slow_now = Self::sma(window, self.slow_period);
        let fast_prev = Self::sma(prev, self.fast_period);
        let slow_prev = Self::sma(prev, self.slow_period);

        let direction = if fast_prev <= slow_prev && fast_now > slow_now {
            SignalDirection::Buy
        } else if fast_prev >= slow_prev && fast_now < slow_now {
            SignalDirection::Sell
        } else {
            return Ok(Vec::new());
        };

        let close = window[window.len() - 1].close;
        let spread = if slow_now > 0.0 {
            (fast_now - slow_now).abs() / slow_now
        } else {
            0.0
        };
        let sign = if direction == SignalDirection::Buy { 1.0 } else { -1.0 };
        let stop = close * (1.0 - sign * self.stop_fraction);
        let target = close * (1.0 + sign * self.stop_fraction * self.reward_ratio);

        Ok(vec![ProviderSignal::new(direction, 0.7 + (spread * 10.0).min(0.3))
            .with_strength(0.6 + (spread * 20.0).min(0.4))
            .with_entry(close)
            .with_stop(stop)
            .with_target(target)])
    }
}
