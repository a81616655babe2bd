//! Cost-model Monte Carlo: sensitivity of a strategy to execution costs.
//!
//! Each sample scales every cost coefficient by its own uniform factor in
//! `[1 − p, 1 + p]` and reruns the backtest. Samples are independent and
//! run in parallel; sample `i` draws from its own seeded stream.

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use quantsim_core::config::{BacktestConfig, ConfigError, CostModelConfig};
use quantsim_core::engine::CancelFlag;
use quantsim_core::rng::RngHierarchy;
use quantsim_core::signals::SignalProviderRegistry;
use quantsim_core::strategy::StrategyDefinition;

use crate::metrics::{mean, std_dev};
use crate::runner::{run_backtest, MarketData};

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    pub samples: usize,
    /// Maximum relative perturbation of each cost coefficient.
    pub perturbation: f64,
    /// `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            samples: 100,
            perturbation: 0.2,
            seed: Some(42),
        }
    }
}

impl MonteCarloConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.samples == 0 {
            return Err(ConfigError::invalid("monte_carlo.samples", "must be >= 1"));
        }
        if !(0.0..1.0).contains(&self.perturbation) {
            return Err(ConfigError::invalid(
                "monte_carlo.perturbation",
                format!("must be in [0, 1), got {}", self.perturbation),
            ));
        }
        Ok(())
    }
}

// ─── Result types ────────────────────────────────────────────────────

/// One completed sample: its cost coefficients and headline metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McSample {
    pub index: usize,
    pub slippage: f64,
    pub commission_percent: f64,
    pub total_return_pct: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub trades: usize,
}

/// Mean, spread and 5th/95th percentiles of one metric across samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributionStats {
    pub mean: f64,
    pub std_dev: f64,
    pub p5: f64,
    pub p95: f64,
}

impl DistributionStats {
    pub fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        Self {
            mean: mean(values),
            std_dev: std_dev(values),
            p5: percentile(&sorted, 0.05),
            p95: percentile(&sorted, 0.95),
        }
    }
}

/// Nearest-rank percentile of an ascending slice: `sorted[round(q · (n − 1))]`.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = (q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[index.min(sorted.len() - 1)]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloReport {
    pub strategy: String,
    pub requested: usize,
    /// Completed samples, in index order.
    pub samples: Vec<McSample>,
    pub failed: usize,
    pub total_return_pct: DistributionStats,
    pub sharpe: DistributionStats,
    pub max_drawdown: DistributionStats,
    /// Fraction of completed samples with a positive total return.
    pub success_rate: f64,
}

#[derive(Debug, Error)]
pub enum McError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("all {failed} Monte Carlo samples failed")]
    NoSamples { failed: usize },
}

// ─── Sampling ────────────────────────────────────────────────────────

/// Scale every cost coefficient by an independent factor in `[1 − p, 1 + p]`.
pub fn perturb_costs<R: Rng>(base: &CostModelConfig, perturbation: f64, rng: &mut R) -> CostModelConfig {
    let mut factor = || {
        if perturbation > 0.0 {
            rng.gen_range(1.0 - perturbation..=1.0 + perturbation)
        } else {
            1.0
        }
    };
    CostModelConfig {
        slippage: base.slippage * factor(),
        commission_percent: base.commission_percent * factor(),
        liquidity_cost: base.liquidity_cost * factor(),
        latency_ms: base.latency_ms * factor(),
        price_impact: base.price_impact * factor(),
        latency_coefficient: base.latency_coefficient * factor(),
        ..base.clone()
    }
}

/// Run `mc.samples` perturbed backtests of one strategy.
///
/// Failed samples are logged and counted; the distribution covers the rest.
pub fn run_monte_carlo(
    data: &MarketData,
    registry: &SignalProviderRegistry,
    strategy: &StrategyDefinition,
    config: &BacktestConfig,
    mc: &MonteCarloConfig,
    cancel: Option<&CancelFlag>,
) -> Result<MonteCarloReport, McError> {
    mc.validate()?;
    config.validate()?;
    let rngs = RngHierarchy::from_option(mc.seed);
    info!(
        strategy = %strategy.name,
        samples = mc.samples,
        perturbation = mc.perturbation,
        master_seed = rngs.master_seed(),
        "starting Monte Carlo"
    );

    let outcomes: Vec<Option<McSample>> = (0..mc.samples)
        .into_par_iter()
        .map(|index| {
            let mut rng = rngs.rng_for("monte_carlo", index as u64);
            let sample_config = BacktestConfig {
                cost_model: perturb_costs(&config.cost_model, mc.perturbation, &mut rng),
                ..config.clone()
            };
            match run_backtest(data, registry, strategy, &sample_config, cancel) {
                Ok(result) => Some(McSample {
                    index,
                    slippage: sample_config.cost_model.slippage,
                    commission_percent: sample_config.cost_model.commission_percent,
                    total_return_pct: result.metrics.total_return_pct,
                    sharpe: result.metrics.sharpe_ratio,
                    max_drawdown: result.metrics.max_drawdown,
                    trades: result.metrics.total_trades,
                }),
                Err(err) => {
                    warn!(sample = index, error = %err, "Monte Carlo sample failed, skipped");
                    None
                }
            }
        })
        .collect();

    let samples: Vec<McSample> = outcomes.into_iter().flatten().collect();
    let failed = mc.samples - samples.len();
    if samples.is_empty() {
        return Err(McError::NoSamples { failed });
    }

    let column = |f: fn(&McSample) -> f64| -> Vec<f64> { samples.iter().map(f).collect() };
    let returns = column(|s| s.total_return_pct);
    let profitable = returns.iter().filter(|&&r| r > 0.0).count();

    let report = MonteCarloReport {
        strategy: strategy.name.clone(),
        requested: mc.samples,
        failed,
        total_return_pct: DistributionStats::of(&returns),
        sharpe: DistributionStats::of(&column(|s| s.sharpe)),
        max_drawdown: DistributionStats::of(&column(|s| s.max_drawdown)),
        success_rate: profitable as f64 / samples.len() as f64,
        samples,
    };
    info!(
        strategy = %report.strategy,
        completed = report.samples.len(),
        failed,
        mean_return_pct = report.total_return_pct.mean,
        success_rate = report.success_rate,
        "Monte Carlo complete"
    );
    Ok(report)
}
