//! Multi-strategy comparison across lookback periods.
//!
//! Every (strategy × period) pair is an independent run over the last
//! `period` bars of one shared series. Runs fan out on rayon and join before
//! any aggregate is computed. A failed run is recorded as a [`RunFailure`]
//! and never touches the aggregates of the runs that succeeded.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use quantsim_core::config::BacktestConfig;
use quantsim_core::domain::RunId;
use quantsim_core::engine::CancelFlag;
use quantsim_core::signals::SignalProviderRegistry;
use quantsim_core::strategy::StrategyDefinition;

use crate::metrics::{mean, variance, PerformanceMetrics};
use crate::portfolio::{
    correlation_matrix, efficient_frontier, optimize_weights, CorrelationMatrix,
    EfficientFrontier, FrontierConfig, OptimizerConfig, PortfolioAllocation, PortfolioInputs,
    ReturnSeries,
};
use crate::regime::{MarketRegime, PeriodProfile, RegimeThresholds};
use crate::runner::{run_backtest, MarketData, RunError};

/// A strategy and the providers that feed it.
#[derive(Debug, Clone)]
pub struct StrategyCandidate {
    pub strategy: StrategyDefinition,
    pub registry: SignalProviderRegistry,
}

/// Weights of the three ranking dimensions in the composite score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    pub risk_adjusted: f64,
    pub consistency: f64,
    pub regime: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            risk_adjusted: 0.4,
            consistency: 0.3,
            regime: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Lookback lengths in bars, warm-up included.
    pub periods: Vec<usize>,
    pub weights: RankingWeights,
    pub regimes: RegimeThresholds,
    pub optimizer: OptimizerConfig,
    pub frontier: FrontierConfig,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            periods: vec![150, 250, 500],
            weights: RankingWeights::default(),
            regimes: RegimeThresholds::default(),
            optimizer: OptimizerConfig::default(),
            frontier: FrontierConfig::default(),
        }
    }
}

/// One successful (strategy, period) run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodRun {
    pub strategy: String,
    pub period: usize,
    pub run_id: RunId,
    pub regime: MarketRegime,
    pub profile: PeriodProfile,
    pub metrics: PerformanceMetrics,
    #[serde(skip)]
    pub returns: Vec<(DateTime<Utc>, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub strategy: String,
    pub period: usize,
    pub error: String,
}

/// Cross-period aggregate of one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySummary {
    pub strategy: String,
    pub periods_run: usize,
    /// Mean Sharpe across periods: the risk-adjusted score.
    pub mean_sharpe: f64,
    pub mean_return_pct: f64,
    pub mean_annualized_return: f64,
    pub worst_drawdown: f64,
    pub mean_win_rate: f64,
    /// `1 / (1 + variance of annualized returns)`.
    pub consistency: f64,
    /// Mean percent return per regime the strategy was run in.
    pub regime_returns: BTreeMap<MarketRegime, f64>,
    /// Mean of `regime_returns`.
    pub regime_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRanking {
    pub strategy: String,
    pub risk_adjusted_rank: usize,
    pub consistency_rank: usize,
    pub regime_rank: usize,
    /// Weighted sum of ranks. Lower is better.
    pub composite_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub runs: Vec<PeriodRun>,
    pub failures: Vec<RunFailure>,
    pub summaries: Vec<StrategySummary>,
    /// Best first.
    pub ranking: Vec<StrategyRanking>,
    pub correlation: CorrelationMatrix,
    /// Present when at least two strategies produced runs.
    pub allocation: Option<PortfolioAllocation>,
    pub frontier: Option<EfficientFrontier>,
}

impl ComparisonReport {
    pub fn summary(&self, strategy: &str) -> Option<&StrategySummary> {
        self.summaries.iter().find(|s| s.strategy == strategy)
    }
}

/// Run every candidate over every configured period and aggregate.
pub fn compare_strategies(
    data: &MarketData,
    candidates: &[StrategyCandidate],
    config: &BacktestConfig,
    comparison: &ComparisonConfig,
    cancel: Option<&CancelFlag>,
) -> ComparisonReport {
    let jobs: Vec<(&StrategyCandidate, usize)> = candidates
        .iter()
        .flat_map(|c| comparison.periods.iter().map(move |&p| (c, p)))
        .collect();
    info!(
        strategies = candidates.len(),
        periods = comparison.periods.len(),
        runs = jobs.len(),
        "starting comparison"
    );

    let outcomes: Vec<Result<PeriodRun, RunFailure>> = jobs
        .par_iter()
        .map(|&(candidate, period)| run_period(data, candidate, period, config, comparison, cancel))
        .collect();

    let mut runs = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(run) => runs.push(run),
            Err(failure) => {
                warn!(
                    strategy = %failure.strategy,
                    period = failure.period,
                    error = %failure.error,
                    "comparison run failed, skipped"
                );
                failures.push(failure);
            }
        }
    }

    let summaries: Vec<StrategySummary> = candidates
        .iter()
        .filter_map(|c| summarize(&c.strategy.name, &runs))
        .collect();
    let ranking = rank_strategies(&summaries, &comparison.weights);

    let series = longest_period_series(&summaries, &runs);
    let correlation = correlation_matrix(&series);
    let (allocation, frontier) = if series.len() >= 2 {
        let inputs = PortfolioInputs::from_series(
            &series,
            config.timeframe.bars_per_year(),
            config.risk_free_rate,
        );
        (
            Some(optimize_weights(&inputs, &comparison.optimizer)),
            Some(efficient_frontier(&inputs, &comparison.frontier)),
        )
    } else {
        (None, None)
    };

    info!(
        succeeded = runs.len(),
        failed = failures.len(),
        leader = ranking.first().map(|r| r.strategy.as_str()).unwrap_or("-"),
        "comparison complete"
    );

    ComparisonReport {
        runs,
        failures,
        summaries,
        ranking,
        correlation,
        allocation,
        frontier,
    }
}

fn run_period(
    data: &MarketData,
    candidate: &StrategyCandidate,
    period: usize,
    config: &BacktestConfig,
    comparison: &ComparisonConfig,
    cancel: Option<&CancelFlag>,
) -> Result<PeriodRun, RunFailure> {
    let name = &candidate.strategy.name;
    let failure = |error: RunError| RunFailure {
        strategy: name.clone(),
        period,
        error: error.to_string(),
    };

    let window = data.tail(period).ok_or_else(|| {
        failure(RunError::InsufficientData {
            required: period,
            available: data.len(),
        })
    })?;
    let result = run_backtest(&window, &candidate.registry, &candidate.strategy, config, cancel)
        .map_err(failure)?;

    let profile = PeriodProfile::of(window.bars(), config.timeframe);
    let returns =
        ReturnSeries::from_equity(name.clone(), &result.equity_curve, result.initial_capital).returns;
    Ok(PeriodRun {
        strategy: name.clone(),
        period,
        run_id: result.run_id,
        regime: profile.classify(&comparison.regimes),
        profile,
        metrics: result.metrics,
        returns,
    })
}

/// Aggregate the successful runs of `strategy`; `None` when it has none.
pub fn summarize(strategy: &str, runs: &[PeriodRun]) -> Option<StrategySummary> {
    let mine: Vec<&PeriodRun> = runs.iter().filter(|r| r.strategy == strategy).collect();
    if mine.is_empty() {
        return None;
    }
    let column = |f: fn(&PerformanceMetrics) -> f64| -> Vec<f64> {
        mine.iter().map(|r| f(&r.metrics)).collect()
    };

    let annualized = column(|m| m.annualized_return);
    let mut by_regime: BTreeMap<MarketRegime, Vec<f64>> = BTreeMap::new();
    for run in &mine {
        by_regime
            .entry(run.regime)
            .or_default()
            .push(run.metrics.total_return_pct);
    }
    let regime_returns: BTreeMap<MarketRegime, f64> =
        by_regime.into_iter().map(|(k, v)| (k, mean(&v))).collect();
    let regime_score = mean(&regime_returns.values().copied().collect::<Vec<_>>());

    Some(StrategySummary {
        strategy: strategy.to_string(),
        periods_run: mine.len(),
        mean_sharpe: mean(&column(|m| m.sharpe_ratio)),
        mean_return_pct: mean(&column(|m| m.total_return_pct)),
        mean_annualized_return: mean(&annualized),
        worst_drawdown: column(|m| m.max_drawdown).into_iter().fold(0.0, f64::max),
        mean_win_rate: mean(&column(|m| m.win_rate)),
        consistency: 1.0 / (1.0 + variance(&annualized)),
        regime_returns,
        regime_score,
    })
}

/// Rank each dimension (1 = best, ties broken by name) and sort by the
/// weighted composite, lowest first.
pub fn rank_strategies(summaries: &[StrategySummary], weights: &RankingWeights) -> Vec<StrategyRanking> {
    let risk = dimension_ranks(summaries, |s| s.mean_sharpe);
    let consistency = dimension_ranks(summaries, |s| s.consistency);
    let regime = dimension_ranks(summaries, |s| s.regime_score);

    let mut ranking: Vec<StrategyRanking> = summaries
        .iter()
        .enumerate()
        .map(|(i, s)| StrategyRanking {
            strategy: s.strategy.clone(),
            risk_adjusted_rank: risk[i],
            consistency_rank: consistency[i],
            regime_rank: regime[i],
            composite_score: weights.risk_adjusted * risk[i] as f64
                + weights.consistency * consistency[i] as f64
                + weights.regime * regime[i] as f64,
        })
        .collect();
    ranking.sort_by(|a, b| {
        a.composite_score
            .total_cmp(&b.composite_score)
            .then_with(|| a.strategy.cmp(&b.strategy))
    });
    ranking
}

/// Rank of each summary (by index) on `score`, higher score = better rank.
fn dimension_ranks(summaries: &[StrategySummary], score: impl Fn(&StrategySummary) -> f64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..summaries.len()).collect();
    order.sort_by(|&a, &b| {
        score(&summaries[b])
            .total_cmp(&score(&summaries[a]))
            .then_with(|| summaries[a].strategy.cmp(&summaries[b].strategy))
    });
    let mut ranks = vec![0; summaries.len()];
    for (rank, &index) in order.iter().enumerate() {
        ranks[index] = rank + 1;
    }
    ranks
}

/// Bar returns of each summarized strategy's longest successful period.
fn longest_period_series(summaries: &[StrategySummary], runs: &[PeriodRun]) -> Vec<ReturnSeries> {
    summaries
        .iter()
        .filter_map(|s| {
            runs.iter()
                .filter(|r| r.strategy == s.strategy)
                .max_by_key(|r| r.period)
                .map(|r| ReturnSeries {
                    name: r.strategy.clone(),
                    returns: r.returns.clone(),
                })
        })
        .collect()
}
