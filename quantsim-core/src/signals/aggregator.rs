//! Signal aggregator: runs every registered provider over the current window,
//! normalizes the output and filters it against the strategy thresholds.
//!
//! Each provider call sits behind a failure boundary. An error or a panic
//! costs that provider its contribution for the bar and nothing else.

use std::ops::AddAssign;
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Timeframe;
use crate::domain::{MarketBar, Signal};
use crate::strategy::StrategyDefinition;

use super::provider::{ProviderError, ProviderSignal};
use super::registry::SignalProviderRegistry;

/// Counters accumulated across the bars of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationStats {
    /// Provider calls made.
    pub evaluations: usize,
    /// Normalized BUY/SELL signals produced before filtering.
    pub raw_signals: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// Calls that returned `Failed` or panicked.
    pub provider_failures: usize,
    /// Calls that returned `InsufficientData`.
    pub insufficient_data: usize,
}

impl AddAssign for AggregationStats {
    fn add_assign(&mut self, rhs: Self) {
        self.evaluations += rhs.evaluations;
        self.raw_signals += rhs.raw_signals;
        self.accepted += rhs.accepted;
        self.rejected += rhs.rejected;
        self.provider_failures += rhs.provider_failures;
        self.insufficient_data += rhs.insufficient_data;
    }
}

/// Accepted signals for one bar, in provider order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    pub signals: Vec<Signal>,
    pub stats: AggregationStats,
}

/// Why a normalized signal was filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    LowConfidence,
    LowStrength,
    LowRiskReward,
}

/// Check a normalized signal against the strategy thresholds.
///
/// A signal whose risk-reward ratio cannot be determined passes the RRR check.
pub fn check_thresholds(
    signal: &Signal,
    strategy: &StrategyDefinition,
    reference_price: f64,
) -> Result<(), Rejection> {
    let params = &strategy.parameters;
    if signal.confidence < params.min_confidence {
        return Err(Rejection::LowConfidence);
    }
    if signal.strength < params.min_strength {
        return Err(Rejection::LowStrength);
    }
    match signal.planned_risk_reward(reference_price) {
        Some(rrr) if rrr < strategy.risk_management.min_risk_reward_ratio => {
            Err(Rejection::LowRiskReward)
        }
        _ => Ok(()),
    }
}

/// Trailing window handed to providers at bar `index`: `bars[..=index]`,
/// limited to the last `lookback` bars when set.
pub fn evaluation_window(bars: &[MarketBar], index: usize, lookback: Option<usize>) -> &[MarketBar] {
    let end = (index + 1).min(bars.len());
    let start = lookback.map_or(0, |l| end.saturating_sub(l));
    &bars[start..end]
}

pub struct SignalAggregator<'a> {
    registry: &'a SignalProviderRegistry,
    strategy: &'a StrategyDefinition,
    timeframe: Timeframe,
}

impl<'a> SignalAggregator<'a> {
    pub fn new(
        registry: &'a SignalProviderRegistry,
        strategy: &'a StrategyDefinition,
        timeframe: Timeframe,
    ) -> Self {
        Self {
            registry,
            strategy,
            timeframe,
        }
    }

    /// Evaluate every provider on `window` (whose last bar is the current bar).
    pub fn aggregate(&self, window: &[MarketBar]) -> Aggregation {
        let mut out = Aggregation::default();
        let Some(current) = window.last() else {
            return out;
        };
        let reference_price = current.close;

        for provider in self.registry.iter() {
            out.stats.evaluations += 1;
            let name = provider.name();
            let call = panic::catch_unwind(AssertUnwindSafe(|| {
                provider.evaluate(window, self.timeframe)
            }));

            let raw: Vec<ProviderSignal> = match call {
                Ok(Ok(signals)) => signals,
                Ok(Err(ProviderError::InsufficientData {
                    required,
                    available,
                })) => {
                    out.stats.insufficient_data += 1;
                    debug!(provider = name, required, available, "provider skipped bar");
                    continue;
                }
                Ok(Err(err)) => {
                    out.stats.provider_failures += 1;
                    warn!(provider = name, error = %err, at = %current.timestamp, "provider failed");
                    continue;
                }
                Err(payload) => {
                    out.stats.provider_failures += 1;
                    warn!(
                        provider = name,
                        panic = panic_message(payload.as_ref()),
                        at = %current.timestamp,
                        "provider panicked"
                    );
                    continue;
                }
            };

            for signal in raw
                .into_iter()
                .filter_map(|s| s.normalize(name, reference_price))
            {
                out.stats.raw_signals += 1;
                match check_thresholds(&signal, self.strategy, reference_price) {
                    Ok(()) => {
                        out.stats.accepted += 1;
                        out.signals.push(signal);
                    }
                    Err(reason) => {
                        out.stats.rejected += 1;
                        debug!(provider = name, ?reason, "signal filtered");
                    }
                }
            }
        }
        out
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
