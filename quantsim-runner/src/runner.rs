//! Backtest runner: wires together the engine and the metrics.
//!
//! `run_backtest()` takes shared, pre-loaded bars and performs no I/O. It is
//! the unit of work for the CLI, strategy comparison and Monte Carlo.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use quantsim_core::config::BacktestConfig;
use quantsim_core::domain::{ClosedTrade, EquityPoint, MarketBar, OpenTrade, RunId};
use quantsim_core::engine::{run_simulation, CancelFlag, EngineError, MarginCall};
use quantsim_core::signals::{AggregationStats, SignalProviderRegistry};
use quantsim_core::strategy::StrategyDefinition;

use crate::data_loader::dataset_hash;
use crate::metrics::{MetricsInput, PerformanceMetrics};

/// Errors from the runner.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("need at least {required} bars for one evaluable bar, got {available}")]
    InsufficientData { required: usize, available: usize },
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Read-only view over a shared bar series.
///
/// Clones share the underlying `Arc`, so every run of a batch reads the
/// same allocation. A view may start part-way into the series.
#[derive(Clone, Default)]
pub struct MarketData {
    bars: Arc<Vec<MarketBar>>,
    start: usize,
}

impl MarketData {
    pub fn new(bars: Vec<MarketBar>) -> Self {
        Self::from_shared(Arc::new(bars))
    }

    pub fn from_shared(bars: Arc<Vec<MarketBar>>) -> Self {
        Self { bars, start: 0 }
    }

    pub fn bars(&self) -> &[MarketBar] {
        &self.bars[self.start.min(self.bars.len())..]
    }

    pub fn len(&self) -> usize {
        self.bars().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars().is_empty()
    }

    /// View of the last `len` bars, or `None` when fewer are available.
    pub fn tail(&self, len: usize) -> Option<Self> {
        let available = self.len();
        if len > available {
            return None;
        }
        Some(Self {
            bars: Arc::clone(&self.bars),
            start: self.start + (available - len),
        })
    }

    /// True when both views share one allocation.
    pub fn shares_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.bars, &other.bars)
    }
}

impl fmt::Debug for MarketData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketData")
            .field("bars", &self.len())
            .field("start", &self.start)
            .finish()
    }
}

/// Complete result of a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub strategy: StrategyDefinition,
    pub config: BacktestConfig,
    /// Bars the run was replayed over. Not persisted.
    #[serde(skip)]
    pub market_data: MarketData,
    pub dataset_hash: String,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub final_equity: f64,
    pub closed_trades: Vec<ClosedTrade>,
    pub open_trades: Vec<OpenTrade>,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: PerformanceMetrics,
    pub margin_calls: Vec<MarginCall>,
    pub signal_stats: AggregationStats,
    pub bar_count: usize,
    pub bars_evaluated: usize,
    pub warmup_bars: usize,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl BacktestResult {
    /// Buy-and-hold return of the replayed bars, as a fraction.
    pub fn buy_and_hold_return(&self) -> Option<f64> {
        let bars = self.market_data.bars();
        let first = bars.first()?;
        let last = bars.last()?;
        Some(last.close / first.close - 1.0)
    }
}

/// Content-addressable run ID: BLAKE3 over the strategy, the config and the
/// dataset fingerprint.
pub fn run_id(strategy: &StrategyDefinition, config: &BacktestConfig, dataset_hash: &str) -> RunId {
    let mut payload = serde_json::to_vec(&(strategy, config)).unwrap_or_default();
    payload.extend_from_slice(dataset_hash.as_bytes());
    RunId::from_bytes(&payload)
}

/// Run one strategy over `data` and score it.
///
/// Fails with `InsufficientData` when the series does not reach past the
/// warm-up window.
pub fn run_backtest(
    data: &MarketData,
    registry: &SignalProviderRegistry,
    strategy: &StrategyDefinition,
    config: &BacktestConfig,
    cancel: Option<&CancelFlag>,
) -> Result<BacktestResult, RunError> {
    let bars = data.bars();
    let required = config.min_history_bars + 1;
    if bars.len() < required {
        return Err(RunError::InsufficientData {
            required,
            available: bars.len(),
        });
    }

    let run = run_simulation(bars, registry, strategy, config, cancel)?;
    let metrics = PerformanceMetrics::compute(MetricsInput {
        trades: &run.closed_trades,
        equity_curve: &run.equity_curve,
        initial_capital: run.initial_capital,
        risk_free_rate: config.risk_free_rate,
        timeframe: config.timeframe,
        max_drawdown: run.max_drawdown,
        max_drawdown_abs: run.max_drawdown_abs,
    });

    let hash = dataset_hash(bars);
    let id = run_id(strategy, config, &hash);
    info!(
        run_id = id.short(),
        strategy = %strategy.name,
        trades = metrics.total_trades,
        return_pct = metrics.total_return_pct,
        sharpe = metrics.sharpe_ratio,
        "backtest complete"
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id: id,
        strategy: strategy.clone(),
        config: config.clone(),
        market_data: data.clone(),
        dataset_hash: hash,
        initial_capital: run.initial_capital,
        final_capital: run.final_capital,
        final_equity: run.final_equity,
        closed_trades: run.closed_trades,
        open_trades: run.open_trades,
        equity_curve: run.equity_curve,
        metrics,
        margin_calls: run.margin_calls,
        signal_stats: run.signal_stats,
        bar_count: run.bar_count,
        bars_evaluated: run.bars_evaluated,
        warmup_bars: run.warmup_bars,
    })
}
