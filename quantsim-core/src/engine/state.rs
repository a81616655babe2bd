//! Simulation state, cancellation and run result types.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::{BarError, ClosedTrade, DrawdownTracker, EquityPoint, IdGen, OpenTrade};
use crate::signals::AggregationStats;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Bars(#[from] BarError),
    #[error("run cancelled before bar {bar_index}")]
    Cancelled { bar_index: usize },
}

/// Cooperative cancellation flag, checked between bars.
///
/// Clones share the same flag, so one flag can stop a whole batch of runs.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Non-fatal margin warning. No position is liquidated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarginCall {
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
    /// `capital × margin_requirement` at the time of the call.
    pub threshold: f64,
}

/// Everything that evolves bar-by-bar during one run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    /// Initial capital plus realized P&L of closed trades.
    pub capital: f64,
    pub open_trades: Vec<OpenTrade>,
    pub closed_trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<EquityPoint>,
    pub drawdown: DrawdownTracker,
    pub margin_calls: Vec<MarginCall>,
    pub signal_stats: AggregationStats,
    pub ids: IdGen,
    pub bars_evaluated: usize,
}

impl SimulationState {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            capital: initial_capital,
            open_trades: Vec::new(),
            closed_trades: Vec::new(),
            equity_curve: Vec::new(),
            drawdown: DrawdownTracker::new(initial_capital),
            margin_calls: Vec::new(),
            signal_stats: AggregationStats::default(),
            ids: IdGen::default(),
            bars_evaluated: 0,
        }
    }

    /// Σ unrealized P&L of open trades marked at `price`.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.open_trades.iter().map(|t| t.unrealized_pnl(price)).sum()
    }

    /// Capital plus unrealized P&L at `price`.
    pub fn equity_at(&self, price: f64) -> f64 {
        self.capital + self.unrealized_pnl(price)
    }

    pub fn realized_pnl(&self) -> f64 {
        self.closed_trades.iter().map(|t| t.realized_pnl).sum()
    }
}

/// Result of one simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub initial_capital: f64,
    /// Capital after every trade has been closed.
    pub final_capital: f64,
    /// Last recorded equity (equals `initial_capital` when no bar was evaluated).
    pub final_equity: f64,
    pub closed_trades: Vec<ClosedTrade>,
    /// Always empty for a completed run; trades still open at the end are force-closed.
    pub open_trades: Vec<OpenTrade>,
    pub equity_curve: Vec<EquityPoint>,
    pub max_drawdown: f64,
    pub max_drawdown_abs: f64,
    pub margin_calls: Vec<MarginCall>,
    pub signal_stats: AggregationStats,
    pub bar_count: usize,
    pub bars_evaluated: usize,
    pub warmup_bars: usize,
}

impl RunResult {
    pub(crate) fn from_state(
        state: SimulationState,
        initial_capital: f64,
        bar_count: usize,
        warmup_bars: usize,
    ) -> Self {
        let final_equity = state
            .equity_curve
            .last()
            .map_or(initial_capital, |p| p.equity);
        Self {
            initial_capital,
            final_capital: state.capital,
            final_equity,
            closed_trades: state.closed_trades,
            open_trades: state.open_trades,
            equity_curve: state.equity_curve,
            max_drawdown: state.drawdown.max_drawdown,
            max_drawdown_abs: state.drawdown.max_drawdown_abs,
            margin_calls: state.margin_calls,
            signal_stats: state.signal_stats,
            bar_count,
            bars_evaluated: state.bars_evaluated,
            warmup_bars,
        }
    }

    pub fn total_return(&self) -> f64 {
        self.final_equity - self.initial_capital
    }
}
