//! Trade lifecycle: opening, exit detection and closing of a single trade.

use tracing::debug;

use crate::config::BacktestConfig;
use crate::domain::{
    ClosedTrade, EdgeEstimate, ExitReason, IdGen, MarketBar, OpenTrade, Signal, TradeDirection,
};
use crate::execution::{CostModel, MarketConditions};
use crate::sizers::{resolve_stop, Sizer};

/// Exit decision for an open trade on the current bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitDecision {
    pub reason: ExitReason,
    pub price: f64,
}

/// Evaluate exit conditions in fixed priority:
/// stop-loss, take-profit, opposing signal, maximum holding time.
pub fn check_exit(
    trade: &OpenTrade,
    bar: &MarketBar,
    signals: &[Signal],
    config: &BacktestConfig,
) -> Option<ExitDecision> {
    let stop_hit = match trade.direction {
        TradeDirection::Long => bar.low <= trade.stop_loss,
        TradeDirection::Short => bar.high >= trade.stop_loss,
    };
    if stop_hit {
        return Some(ExitDecision {
            reason: ExitReason::StopLoss,
            price: trade.stop_loss,
        });
    }

    if let Some(tp) = trade.take_profit {
        let tp_hit = match trade.direction {
            TradeDirection::Long => bar.high >= tp,
            TradeDirection::Short => bar.low <= tp,
        };
        if tp_hit {
            return Some(ExitDecision {
                reason: ExitReason::TakeProfit,
                price: tp,
            });
        }
    }

    let opposed = signals.iter().any(|s| {
        s.direction.opposes(trade.direction) && s.confidence > config.signal_exit_confidence
    });
    if opposed {
        return Some(ExitDecision {
            reason: ExitReason::Signal,
            price: bar.close,
        });
    }

    if trade.holding_duration(bar.timestamp) > config.max_holding() {
        return Some(ExitDecision {
            reason: ExitReason::TimeExit,
            price: bar.close,
        });
    }
    None
}

/// Everything needed to open or close trades on one bar.
pub struct Execution<'a> {
    pub config: &'a BacktestConfig,
    pub sizer: &'a dyn Sizer,
    pub cost_model: &'a CostModel,
    pub strategy_edge: Option<&'a EdgeEstimate>,
}

impl Execution<'_> {
    /// Open a trade for `signal` at bar `index`, or `None` when it sizes to zero.
    ///
    /// `history` is `bars[..=index]`; it feeds the cost model's volatility
    /// and volume estimates.
    pub fn open(
        &self,
        signal: &Signal,
        history: &[MarketBar],
        index: usize,
        capital: f64,
        ids: &mut IdGen,
    ) -> Option<OpenTrade> {
        let bar = history.last()?;
        let direction = signal.direction.trade_direction()?;
        // A provider price outside the bar's range cannot be filled.
        let entry_price = signal
            .entry_price
            .map_or(bar.close, |p| p.max(bar.low).min(bar.high));

        let quantity = self
            .sizer
            .size(capital, signal, entry_price, self.strategy_edge);
        if !(quantity > 0.0) {
            debug!(source = %signal.source, capital, "signal sized to zero, skipped");
            return None;
        }

        let stop_loss = resolve_stop(signal.stop_loss, direction, entry_price, &self.config.sizing);
        let market = self.market(history, entry_price);
        let costs = self.cost_model.cost(entry_price * quantity, &market);

        let trade = OpenTrade {
            id: ids.next_trade_id(),
            direction,
            entry_price,
            entry_time: bar.timestamp,
            entry_bar: index,
            quantity,
            stop_loss,
            take_profit: signal.take_profit,
            costs,
            source: signal.source.clone(),
        };
        debug!(
            id = %trade.id,
            ?direction,
            entry_price,
            quantity,
            stop_loss,
            take_profit = ?trade.take_profit,
            entry_cost = costs.total,
            "trade opened"
        );
        Some(trade)
    }

    /// Close `trade` at `exit_price`, charging exit costs.
    pub fn close(
        &self,
        trade: OpenTrade,
        exit_price: f64,
        history: &[MarketBar],
        index: usize,
        reason: ExitReason,
    ) -> ClosedTrade {
        let market = self.market(history, exit_price);
        let exit_costs = self.cost_model.cost(exit_price * trade.quantity, &market);
        let exit_time = history.last().map_or(trade.entry_time, |b| b.timestamp);
        let closed = trade.close(exit_price, exit_time, index, reason, exit_costs);
        debug!(
            id = %closed.id,
            %reason,
            exit_price,
            pnl = closed.realized_pnl,
            outcome = ?closed.outcome,
            "trade closed"
        );
        closed
    }

    fn market(&self, history: &[MarketBar], price: f64) -> MarketConditions {
        MarketConditions {
            price,
            ..MarketConditions::from_window(history, &self.config.cost_model)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CostModelConfig, SizingConfig};
    use crate::domain::{CostBreakdown, SignalDirection, TradeId};
    use crate::sizers::RiskSizer;
    use chrono::{Duration, TimeZone, Utc};

    fn t0() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn bar(day: i64, high: f64, low: f64, close: f64) -> MarketBar {
        MarketBar::new(t0() + Duration::days(day), close, high, low, close, 1_000.0)
    }

    fn long_trade() -> OpenTrade {
        OpenTrade {
            id: TradeId(1),
            direction: TradeDirection::Long,
            entry_price: 100.0,
            entry_time: t0(),
            entry_bar: 0,
            quantity: 10.0,
            stop_loss: 98.0,
            take_profit: Some(106.0),
            costs: CostBreakdown::zero(),
            source: "test".into(),
        }
    }

    #[test]
    fn stop_has_priority_over_take_profit() {
        let config = BacktestConfig::default();
        let wide = bar(1, 107.0, 97.0, 100.0);
        let exit = check_exit(&long_trade(), &wide, &[], &config).unwrap();
        assert_eq!(exit.reason, ExitReason::StopLoss);
        assert_eq!(exit.price, 98.0);
    }

    #[test]
    fn take_profit_exits_at_target() {
        let config = BacktestConfig::default();
        let exit = check_exit(&long_trade(), &bar(1, 107.0, 99.0, 105.0), &[], &config).unwrap();
        assert_eq!(exit.reason, ExitReason::TakeProfit);
        assert_eq!(exit.price, 106.0);
    }

    #[test]
    fn missing_take_profit_never_triggers() {
        let config = BacktestConfig::default();
        let mut trade = long_trade();
        trade.take_profit = None;
        assert!(check_exit(&trade, &bar(1, 150.0, 99.0, 140.0), &[], &config).is_none());
    }

    #[test]
    fn opposing_signal_needs_high_confidence() {
        let config = BacktestConfig::default();
        let b = bar(1, 101.0, 99.0, 100.5);
        let weak = Signal::new(SignalDirection::Sell, 0.8, 0.9, "x");
        assert!(check_exit(&long_trade(), &b, &[weak], &config).is_none());
        let strong = Signal::new(SignalDirection::Sell, 0.85, 0.9, "x");
        let exit = check_exit(&long_trade(), &b, &[strong], &config).unwrap();
        assert_eq!(exit.reason, ExitReason::Signal);
        assert_eq!(exit.price, 100.5);
        let same_side = Signal::new(SignalDirection::Buy, 0.95, 0.9, "x");
        assert!(check_exit(&long_trade(), &b, &[same_side], &config).is_none());
    }

    #[test]
    fn time_exit_after_max_holding() {
        let config = BacktestConfig::default();
        assert!(check_exit(&long_trade(), &bar(7, 101.0, 99.0, 100.0), &[], &config).is_none());
        let exit = check_exit(&long_trade(), &bar(8, 101.0, 99.0, 100.0), &[], &config).unwrap();
        assert_eq!(exit.reason, ExitReason::TimeExit);
    }

    #[test]
    fn short_stop_and_target() {
        let config = BacktestConfig::default();
        let mut trade = long_trade();
        trade.direction = TradeDirection::Short;
        trade.stop_loss = 102.0;
        trade.take_profit = Some(94.0);
        let stop = check_exit(&trade, &bar(1, 102.5, 99.0, 101.0), &[], &config).unwrap();
        assert_eq!(stop.reason, ExitReason::StopLoss);
        let target = check_exit(&trade, &bar(1, 101.0, 93.0, 95.0), &[], &config).unwrap();
        assert_eq!(target.reason, ExitReason::TakeProfit);
    }

    #[test]
    fn open_uses_default_stop_and_charges_costs() {
        let config = BacktestConfig::default();
        let sizer = RiskSizer::new(config.risk_per_trade, SizingConfig::default());
        let cost_model = CostModel::new(CostModelConfig::default());
        let exec = Execution {
            config: &config,
            sizer: &sizer,
            cost_model: &cost_model,
            strategy_edge: None,
        };
        let history = vec![bar(0, 101.0, 99.0, 100.0)];
        let signal = Signal::new(SignalDirection::Buy, 0.9, 0.9, "p");
        let mut ids = IdGen::default();
        let trade = exec.open(&signal, &history, 0, 100_000.0, &mut ids).unwrap();
        assert_eq!(trade.id, TradeId(1));
        assert!((trade.stop_loss - 98.0).abs() < 1e-9);
        assert_eq!(trade.quantity, 200.0);
        assert!(trade.costs.total > 0.0);
        assert_eq!(trade.take_profit, None);
    }

    #[test]
    fn entry_price_is_clamped_to_bar_range() {
        let config = BacktestConfig::default();
        let sizer = RiskSizer::new(config.risk_per_trade, SizingConfig::default());
        let cost_model = CostModel::new(CostModelConfig::frictionless());
        let exec = Execution {
            config: &config,
            sizer: &sizer,
            cost_model: &cost_model,
            strategy_edge: None,
        };
        let history = vec![bar(0, 101.0, 99.0, 100.0)];
        let mut ids = IdGen::default();

        let above = Signal::new(SignalDirection::Buy, 0.9, 0.9, "p").with_entry_price(120.0);
        let trade = exec.open(&above, &history, 0, 100_000.0, &mut ids).unwrap();
        assert_eq!(trade.entry_price, 101.0);

        let below = Signal::new(SignalDirection::Sell, 0.9, 0.9, "p").with_entry_price(80.0);
        let trade = exec.open(&below, &history, 0, 100_000.0, &mut ids).unwrap();
        assert_eq!(trade.entry_price, 99.0);
        assert!(trade.stop_loss > trade.entry_price);

        let inside = Signal::new(SignalDirection::Buy, 0.9, 0.9, "p").with_entry_price(99.5);
        let trade = exec.open(&inside, &history, 0, 100_000.0, &mut ids).unwrap();
        assert_eq!(trade.entry_price, 99.5);
    }

    #[test]
    fn wrong_side_stop_is_replaced_on_open() {
        let config = BacktestConfig::default();
        let sizer = RiskSizer::new(config.risk_per_trade, SizingConfig::default());
        let cost_model = CostModel::new(CostModelConfig::frictionless());
        let exec = Execution {
            config: &config,
            sizer: &sizer,
            cost_model: &cost_model,
            strategy_edge: None,
        };
        let history = vec![bar(0, 101.0, 99.0, 100.0)];
        let signal =
            Signal::new(SignalDirection::Buy, 0.9, 0.9, "p").with_levels(Some(102.0), Some(110.0));
        let mut ids = IdGen::default();
        let trade = exec.open(&signal, &history, 0, 100_000.0, &mut ids).unwrap();
        assert!((trade.stop_loss - 98.0).abs() < 1e-9);
        assert!(check_exit(&trade, &bar(1, 100.5, 99.5, 100.0), &[], &config).is_none());
    }

    #[test]
    fn close_adds_exit_costs() {
        let config = BacktestConfig::default();
        let sizer = RiskSizer::new(config.risk_per_trade, SizingConfig::default());
        let cost_model = CostModel::default();
        let exec = Execution {
            config: &config,
            sizer: &sizer,
            cost_model: &cost_model,
            strategy_edge: None,
        };
        let history = vec![bar(0, 101.0, 99.0, 100.0), bar(1, 107.0, 99.0, 105.0)];
        let closed = exec.close(long_trade(), 106.0, &history, 1, ExitReason::TakeProfit);
        assert!(closed.costs.total > 0.0);
        assert!((closed.realized_pnl - (60.0 - closed.costs.total)).abs() < 1e-9);
        assert_eq!(closed.exit_time, history[1].timestamp);
    }
}
