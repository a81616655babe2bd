//! Execution cost model: commission, slippage, price impact, liquidity and
//! latency cost for a trade of a given notional.
//!
//! Costs are returned in currency, never folded into the fill price. The
//! model is a pure function of its inputs.

use crate::config::CostModelConfig;
use crate::domain::{CostBreakdown, MarketBar};

/// Market state at the moment of execution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketConditions {
    pub price: f64,
    /// Annualized realized volatility.
    pub volatility: f64,
    /// Trailing average volume in units; `None` when unknown.
    pub average_volume: Option<f64>,
}

impl MarketConditions {
    pub fn new(price: f64, volatility: f64, average_volume: Option<f64>) -> Self {
        Self {
            price,
            volatility,
            average_volume,
        }
    }

    /// Conditions at the last bar of `window`, using the trailing
    /// `config.volatility_window` bars for volatility and volume.
    pub fn from_window(window: &[MarketBar], config: &CostModelConfig) -> Self {
        let price = window.last().map(|b| b.close).unwrap_or(0.0);
        Self {
            price,
            volatility: realized_volatility(
                window,
                config.volatility_window,
                config.annualization_factor,
                config.default_volatility,
            ),
            average_volume: average_volume(window, config.volatility_window),
        }
    }
}

/// Annualized population standard deviation of the trailing `lookback`
/// close-to-close returns. Falls back to `default` with fewer than 2 returns.
pub fn realized_volatility(
    bars: &[MarketBar],
    lookback: usize,
    annualization: f64,
    default: f64,
) -> f64 {
    let start = bars.len().saturating_sub(lookback + 1);
    let returns: Vec<f64> = bars[start..]
        .windows(2)
        .filter(|w| w[0].close > 0.0)
        .map(|w| w[1].close / w[0].close - 1.0)
        .collect();
    if returns.len() < 2 {
        return default;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    var.sqrt() * annualization.sqrt()
}

/// Mean volume of the trailing `lookback` bars; `None` for an empty window.
pub fn average_volume(bars: &[MarketBar], lookback: usize) -> Option<f64> {
    let start = bars.len().saturating_sub(lookback);
    let tail = &bars[start..];
    if tail.is_empty() {
        return None;
    }
    Some(tail.iter().map(|b| b.volume).sum::<f64>() / tail.len() as f64)
}

/// Five-term execution cost model.
#[derive(Debug, Clone, PartialEq)]
pub struct CostModel {
    config: CostModelConfig,
}

impl CostModel {
    pub fn new(config: CostModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CostModelConfig {
        &self.config
    }

    /// Cost of executing `notional` (quantity × price) under `market`.
    pub fn cost(&self, notional: f64, market: &MarketConditions) -> CostBreakdown {
        if !(notional.is_finite() && notional > 0.0) || !(market.price > 0.0) {
            return CostBreakdown::zero();
        }
        let c = &self.config;
        let ratio = self.volume_ratio(notional, market);

        let commission = self.commission(notional);
        let slippage = notional * c.slippage * ratio.sqrt();
        let impact =
            notional * c.price_impact * (notional / c.impact_reference_notional).sqrt();
        let liquidity = notional * c.liquidity_cost * (1.0 + 2.0 * ratio);
        let volatility = if market.volatility.is_finite() {
            market.volatility.max(0.0)
        } else {
            c.default_volatility
        };
        let latency =
            notional * volatility * (c.latency_ms / 1000.0).sqrt() * c.latency_coefficient;

        CostBreakdown {
            commission,
            slippage,
            impact,
            liquidity,
            latency,
            total: commission + slippage + impact + liquidity + latency,
        }
    }

    /// Order size relative to average volume; 1.0 when volume is unknown.
    fn volume_ratio(&self, notional: f64, market: &MarketConditions) -> f64 {
        match market.average_volume {
            Some(v) if v > 0.0 && v.is_finite() => (notional / market.price) / v,
            _ => 1.0,
        }
    }

    /// Tiered commission. Each band charges its own rate on the slice of
    /// notional that falls inside it.
    pub fn commission(&self, notional: f64) -> f64 {
        let c = &self.config;
        let tiers = &c.commission_tiers;
        let mut commission = 0.0;
        for (i, tier) in tiers.iter().enumerate() {
            if notional <= tier.from_notional {
                break;
            }
            let upper = tiers
                .get(i + 1)
                .map(|next| next.from_notional)
                .unwrap_or(f64::INFINITY);
            let band = notional.min(upper) - tier.from_notional;
            commission += band * c.commission_percent * tier.rate_multiplier;
        }
        commission
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::new(CostModelConfig::default())
    }
}
