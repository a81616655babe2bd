//! Bar-by-bar simulation loop.
//!
//! Per evaluable bar (index ≥ `min_history_bars`):
//! 1. Signals: run the aggregator over the trailing window
//! 2. Exits: stop-loss, take-profit, opposing signal, time exit
//! 3. Entries: size and open while below `max_open_positions`
//!    (on the final bar, force-close everything instead)
//! 4. Equity: capital + unrealized P&L, drawdown tracking, margin check

use tracing::{info, warn};

use crate::config::BacktestConfig;
use crate::domain::{validate_series, EquityPoint, ExitReason, MarketBar};
use crate::execution::CostModel;
use crate::signals::{evaluation_window, SignalAggregator, SignalProviderRegistry};
use crate::sizers::{RiskSizer, Sizer};
use crate::strategy::StrategyDefinition;

use super::lifecycle::{check_exit, Execution};
use super::state::{CancelFlag, EngineError, MarginCall, RunResult, SimulationState};

/// Read-only collaborators shared by every step of a run.
pub struct StepContext<'a> {
    pub config: &'a BacktestConfig,
    pub aggregator: SignalAggregator<'a>,
    pub execution: Execution<'a>,
}

/// Advance the simulation by the bar at `index`. `bars` is the full series.
pub fn step(
    mut state: SimulationState,
    ctx: &StepContext<'_>,
    bars: &[MarketBar],
    index: usize,
) -> SimulationState {
    let config = ctx.config;
    let bar = &bars[index];
    let history = &bars[..=index];
    let is_final = index + 1 == bars.len();
    state.bars_evaluated += 1;

    // ─── Signals ───
    let window = evaluation_window(bars, index, config.lookback_window);
    let aggregation = ctx.aggregator.aggregate(window);
    state.signal_stats += aggregation.stats;
    let signals = aggregation.signals;

    // ─── Exits ───
    let mut still_open = Vec::with_capacity(state.open_trades.len());
    for trade in std::mem::take(&mut state.open_trades) {
        match check_exit(&trade, bar, &signals, config) {
            Some(exit) => {
                let closed = ctx
                    .execution
                    .close(trade, exit.price, history, index, exit.reason);
                state.capital += closed.realized_pnl;
                state.closed_trades.push(closed);
            }
            None => still_open.push(trade),
        }
    }
    state.open_trades = still_open;

    // ─── Entries / end of run ───
    if is_final {
        for trade in std::mem::take(&mut state.open_trades) {
            let closed = ctx.execution.close(
                trade,
                bar.close,
                history,
                index,
                ExitReason::EndOfBacktest,
            );
            state.capital += closed.realized_pnl;
            state.closed_trades.push(closed);
        }
    } else {
        for signal in &signals {
            if state.open_trades.len() >= config.max_open_positions {
                break;
            }
            if let Some(trade) =
                ctx.execution
                    .open(signal, history, index, state.capital, &mut state.ids)
            {
                state.open_trades.push(trade);
            }
        }
    }

    // ─── Equity ───
    let equity = state.equity_at(bar.close);
    let drawdown = state.drawdown.update(equity);
    state.equity_curve.push(EquityPoint {
        timestamp: bar.timestamp,
        equity,
        drawdown,
    });

    if config.margin_trading {
        let threshold = state.capital * config.margin_requirement;
        if equity < threshold {
            warn!(bar_index = index, equity, threshold, "margin call");
            state.margin_calls.push(MarginCall {
                bar_index: index,
                timestamp: bar.timestamp,
                equity,
                threshold,
            });
        }
    }

    state
}

/// Run one strategy over `bars`.
///
/// Validates the config, the strategy and the bar series before the first
/// bar. Bars before `min_history_bars` are skipped entirely. A set `cancel`
/// flag stops the run between bars.
pub fn run_simulation(
    bars: &[MarketBar],
    registry: &SignalProviderRegistry,
    strategy: &StrategyDefinition,
    config: &BacktestConfig,
    cancel: Option<&CancelFlag>,
) -> Result<RunResult, EngineError> {
    config.validate()?;
    strategy.validate()?;
    validate_series(bars)?;

    let sizer = RiskSizer::new(config.risk_per_trade, config.sizing.clone());
    let cost_model = CostModel::new(config.cost_model.clone());
    let ctx = StepContext {
        config,
        aggregator: SignalAggregator::new(registry, strategy, config.timeframe),
        execution: Execution {
            config,
            sizer: &sizer as &dyn Sizer,
            cost_model: &cost_model,
            strategy_edge: strategy.edge.as_ref(),
        },
    };

    let warmup = config.min_history_bars;
    let mut state = SimulationState::new(config.initial_capital);
    for index in warmup..bars.len() {
        if cancel.is_some_and(CancelFlag::is_cancelled) {
            return Err(EngineError::Cancelled { bar_index: index });
        }
        state = step(state, &ctx, bars, index);
    }

    let result = RunResult::from_state(state, config.initial_capital, bars.len(), warmup);
    info!(
        strategy = %strategy.name,
        bars = result.bar_count,
        evaluated = result.bars_evaluated,
        trades = result.closed_trades.len(),
        final_equity = result.final_equity,
        max_drawdown = result.max_drawdown,
        provider_failures = result.signal_stats.provider_failures,
        "simulation complete"
    );
    Ok(result)
}
