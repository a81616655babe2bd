//! Performance metrics: pure functions that compute strategy statistics.
//!
//! Every metric is a pure function of the closed trades and/or the equity
//! curve. An empty run yields zeroed metrics, never NaN.

use serde::{Deserialize, Serialize};

use quantsim_core::config::Timeframe;
use quantsim_core::domain::{ClosedTrade, EdgeEstimate, EquityPoint, TradeOutcome};

use crate::monthly::{monthly_buckets, MonthlyBucket};
use crate::tail_metrics::{compute_tail_metrics, TailMetrics};

/// Everything needed to score one finished run.
#[derive(Debug, Clone, Copy)]
pub struct MetricsInput<'a> {
    pub trades: &'a [ClosedTrade],
    pub equity_curve: &'a [EquityPoint],
    pub initial_capital: f64,
    /// Annualized risk-free rate.
    pub risk_free_rate: f64,
    pub timeframe: Timeframe,
    /// Max drawdown from the engine's tracker (fraction).
    pub max_drawdown: f64,
    pub max_drawdown_abs: f64,
}

/// Aggregate performance metrics for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Final equity minus initial capital.
    pub total_return: f64,
    pub total_return_pct: f64,
    pub annualized_return: f64,

    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub push_trades: usize,
    pub win_rate: f64,
    pub average_win: f64,
    /// Mean loss magnitude (positive).
    pub average_loss: f64,
    pub profit_factor: f64,
    pub expectancy: f64,
    pub best_trade: f64,
    pub worst_trade: f64,

    /// Per-bar population standard deviation of equity returns.
    pub volatility: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    /// `+inf` when there are no losing bars and the mean return is positive.
    #[serde(with = "non_finite")]
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_abs: f64,
    pub tail: TailMetrics,

    pub kelly_criterion: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub total_fees: f64,
    pub total_slippage: f64,
    pub average_trade_duration_hours: f64,
    pub monthly: Vec<MonthlyBucket>,
}

impl PerformanceMetrics {
    pub fn compute(input: MetricsInput<'_>) -> Self {
        let trades = input.trades;
        let capital = input.initial_capital;
        let bars_per_year = input.timeframe.bars_per_year();
        let returns = bar_returns(input.equity_curve, capital);

        let final_equity = input.equity_curve.last().map_or(capital, |p| p.equity);
        let total_return = final_equity - capital;
        let return_fraction = if capital > 0.0 { total_return / capital } else { 0.0 };

        let wins: Vec<f64> = pnl_where(trades, TradeOutcome::Win);
        let losses: Vec<f64> = pnl_where(trades, TradeOutcome::Loss)
            .into_iter()
            .map(f64::abs)
            .collect();
        let win_rate = ratio(wins.len(), trades.len());
        let average_win = mean(&wins);
        let average_loss = mean(&losses);
        let volatility = std_dev(&returns);

        Self {
            total_return,
            total_return_pct: return_fraction * 100.0,
            annualized_return: annualized_return(return_fraction, input.equity_curve),
            total_trades: trades.len(),
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            push_trades: trades.len() - wins.len() - losses.len(),
            win_rate,
            average_win,
            average_loss,
            profit_factor: profit_factor(trades),
            expectancy: if trades.is_empty() {
                0.0
            } else {
                total_return / trades.len() as f64
            },
            best_trade: trades.iter().map(|t| t.realized_pnl).reduce(f64::max).unwrap_or(0.0),
            worst_trade: trades.iter().map(|t| t.realized_pnl).reduce(f64::min).unwrap_or(0.0),
            volatility,
            annualized_volatility: volatility * bars_per_year.sqrt(),
            sharpe_ratio: sharpe_ratio(&returns, input.risk_free_rate, bars_per_year),
            sortino_ratio: sortino_ratio(&returns, bars_per_year),
            calmar_ratio: calmar_ratio(return_fraction, input.max_drawdown),
            max_drawdown: input.max_drawdown,
            max_drawdown_abs: input.max_drawdown_abs,
            tail: compute_tail_metrics(&returns),
            kelly_criterion: kelly_criterion(win_rate, average_win, average_loss),
            max_consecutive_wins: max_consecutive(trades, TradeOutcome::Win),
            max_consecutive_losses: max_consecutive(trades, TradeOutcome::Loss),
            total_fees: trades.iter().map(|t| t.costs.commission).sum(),
            total_slippage: trades.iter().map(|t| t.costs.execution_drag()).sum(),
            average_trade_duration_hours: average_duration_hours(trades),
            monthly: monthly_buckets(input.equity_curve, capital),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Bar-over-bar equity returns. The first return is measured against
/// `initial_capital`.
pub fn bar_returns(equity_curve: &[EquityPoint], initial_capital: f64) -> Vec<f64> {
    let mut prev = initial_capital;
    equity_curve
        .iter()
        .map(|p| {
            let r = if prev > 0.0 { (p.equity - prev) / prev } else { 0.0 };
            prev = p.equity;
            r
        })
        .collect()
}

/// Annualized Sharpe ratio.
///
/// Sharpe = (mean − rf / bars_per_year) / std × √bars_per_year.
/// Returns 0.0 with fewer than 2 returns or zero variance.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64, bars_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let std = std_dev(returns);
    if std < 1e-15 {
        return 0.0;
    }
    let excess = mean(returns) - risk_free_rate / bars_per_year;
    excess / std * bars_per_year.sqrt()
}

/// Annualized Sortino ratio (downside deviation only).
///
/// Downside deviation = √(Σ negative r² / n). With no negative returns the
/// ratio is `+inf` for a positive mean and 0.0 otherwise.
pub fn sortino_ratio(returns: &[f64], bars_per_year: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let m = mean(returns);
    let downside_sq: f64 = returns.iter().filter(|&&r| r < 0.0).map(|r| r * r).sum();
    if downside_sq == 0.0 {
        return if m > 0.0 { f64::INFINITY } else { 0.0 };
    }
    let downside_dev = (downside_sq / returns.len() as f64).sqrt();
    m / downside_dev * bars_per_year.sqrt()
}

/// Calmar ratio: total-return fraction / max drawdown. 0.0 without drawdown.
pub fn calmar_ratio(return_fraction: f64, max_drawdown: f64) -> f64 {
    if max_drawdown <= 0.0 {
        return 0.0;
    }
    return_fraction / max_drawdown
}

/// Compound `return_fraction` over the calendar days spanned by the curve.
pub fn annualized_return(return_fraction: f64, equity_curve: &[EquityPoint]) -> f64 {
    let (Some(first), Some(last)) = (equity_curve.first(), equity_curve.last()) else {
        return 0.0;
    };
    let days = (last.timestamp - first.timestamp).num_seconds() as f64 / 86_400.0;
    if days <= 0.0 {
        return 0.0;
    }
    let growth = 1.0 + return_fraction;
    if growth <= 0.0 {
        return -1.0;
    }
    growth.powf(365.0 / days) - 1.0
}

/// Profit factor: gross profits / gross losses.
///
/// Capped at 100.0; 100.0 when there are profits but no losses.
pub fn profit_factor(trades: &[ClosedTrade]) -> f64 {
    let gross_profit: f64 = trades
        .iter()
        .filter(|t| t.realized_pnl > 0.0)
        .map(|t| t.realized_pnl)
        .sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.realized_pnl < 0.0)
        .map(|t| t.realized_pnl.abs())
        .sum();

    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

/// Full Kelly fraction from realized statistics; 0.0 without wins or losses.
pub fn kelly_criterion(win_rate: f64, average_win: f64, average_loss: f64) -> f64 {
    if average_win <= 0.0 || average_loss <= 0.0 {
        return 0.0;
    }
    EdgeEstimate {
        win_rate,
        average_win,
        average_loss,
    }
    .kelly_fraction()
}

/// Longest run of trades with `outcome`. Any other outcome breaks the run.
pub fn max_consecutive(trades: &[ClosedTrade], outcome: TradeOutcome) -> usize {
    let mut max_streak = 0;
    let mut current = 0;
    for trade in trades {
        if trade.outcome == outcome {
            current += 1;
            max_streak = max_streak.max(current);
        } else {
            current = 0;
        }
    }
    max_streak
}

pub fn average_duration_hours(trades: &[ClosedTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let total: f64 = trades
        .iter()
        .map(|t| t.duration().num_seconds() as f64 / 3_600.0)
        .sum();
    total / trades.len() as f64
}

// ─── Helpers ────────────────────────────────────────────────────────

fn pnl_where(trades: &[ClosedTrade], outcome: TradeOutcome) -> Vec<f64> {
    trades
        .iter()
        .filter(|t| t.outcome == outcome)
        .map(|t| t.realized_pnl)
        .collect()
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Population variance.
pub(crate) fn variance(values: &[f64]) -> f64 {
    let s = std_dev(values);
    s * s
}

/// Serialize non-finite floats as strings so JSON output round-trips.
pub(crate) mod non_finite {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Num(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str("nan")
        } else if *value > 0.0 {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Num(v) => Ok(v),
            Repr::Text(s) => match s.as_str() {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "nan" => Ok(f64::NAN),
                other => Err(serde::de::Error::custom(format!(
                    "expected a number, \"inf\", \"-inf\" or \"nan\", got {other:?}"
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use quantsim_core::domain::{CostBreakdown, ExitReason, OpenTrade, TradeDirection, TradeId};

    fn curve(values: &[f64]) -> Vec<EquityPoint> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &equity)| EquityPoint {
                timestamp: t0 + Duration::days(i as i64),
                equity,
                drawdown: 0.0,
            })
            .collect()
    }

    fn trade(pnl_per_unit: f64, commission: f64) -> ClosedTrade {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        OpenTrade {
            id: TradeId(1),
            direction: TradeDirection::Long,
            entry_price: 100.0,
            entry_time: t0,
            entry_bar: 0,
            quantity: 10.0,
            stop_loss: 98.0,
            take_profit: None,
            costs: CostBreakdown {
                commission,
                slippage: 0.5,
                total: commission + 0.5,
                ..CostBreakdown::zero()
            },
            source: "t".into(),
        }
        .close(100.0 + pnl_per_unit, t0 + Duration::hours(12), 1, ExitReason::Signal, CostBreakdown::zero())
    }

    fn input<'a>(trades: &'a [ClosedTrade], curve: &'a [EquityPoint]) -> MetricsInput<'a> {
        MetricsInput {
            trades,
            equity_curve: curve,
            initial_capital: 100_000.0,
            risk_free_rate: 0.0,
            timeframe: Timeframe::D1,
            max_drawdown: 0.0,
            max_drawdown_abs: 0.0,
        }
    }

    #[test]
    fn empty_run_is_all_zero() {
        let m = PerformanceMetrics::compute(input(&[], &[]));
        assert_eq!(m.total_return, 0.0);
        assert_eq!(m.win_rate, 0.0);
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_eq!(m.sortino_ratio, 0.0);
        assert_eq!(m.kelly_criterion, 0.0);
        assert_eq!(m.expectancy, 0.0);
        assert_eq!(m.annualized_return, 0.0);
        assert!(m.monthly.is_empty());
    }

    #[test]
    fn flat_curve_has_zero_risk_metrics() {
        let flat = curve(&[100_000.0; 100]);
        let m = PerformanceMetrics::compute(input(&[], &flat));
        assert_eq!(m.volatility, 0.0);
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_eq!(m.sortino_ratio, 0.0);
        assert_eq!(m.tail.var_95, 0.0);
        assert_eq!(m.tail.cvar_95, 0.0);
    }

    #[test]
    fn trade_statistics() {
        // +5/unit and -3/unit on 10 units, 0.5 slippage each, commission 1.0
        let trades = vec![trade(5.0, 1.0), trade(-3.0, 1.0), trade(5.0, 1.0)];
        let eq = curve(&[100_000.0, 100_065.5]);
        let m = PerformanceMetrics::compute(input(&trades, &eq));
        assert_eq!(m.total_trades, 3);
        assert_eq!(m.winning_trades, 2);
        assert_eq!(m.losing_trades, 1);
        assert!((m.win_rate - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.average_win - 48.5).abs() < 1e-9);
        assert!((m.average_loss - 31.5).abs() < 1e-9);
        assert!((m.profit_factor - 97.0 / 31.5).abs() < 1e-9);
        assert!((m.total_fees - 3.0).abs() < 1e-12);
        assert!((m.total_slippage - 1.5).abs() < 1e-12);
        assert!((m.average_trade_duration_hours - 12.0).abs() < 1e-12);
        assert_eq!(m.best_trade, 48.5);
        assert_eq!(m.worst_trade, -31.5);
        assert_eq!(m.max_consecutive_wins, 1);
    }

    #[test]
    fn profit_factor_capped_without_losses() {
        assert_eq!(profit_factor(&[trade(5.0, 0.0)]), 100.0);
        assert_eq!(profit_factor(&[]), 0.0);
    }

    #[test]
    fn kelly_zero_without_wins_or_losses() {
        assert_eq!(kelly_criterion(1.0, 50.0, 0.0), 0.0);
        assert_eq!(kelly_criterion(0.0, 0.0, 20.0), 0.0);
        // p = 0.5, W = 2, L = 1 → 0.25
        assert!((kelly_criterion(0.5, 2.0, 1.0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn pushes_break_streaks() {
        let push = trade(0.04, 1.0); // gross +0.4, cost 1.5 → push
        assert_eq!(push.outcome, TradeOutcome::Push);
        let trades = vec![trade(5.0, 0.0), push, trade(5.0, 0.0), trade(5.0, 0.0)];
        assert_eq!(max_consecutive(&trades, TradeOutcome::Win), 2);
    }

    #[test]
    fn sortino_infinite_without_downside() {
        assert_eq!(sortino_ratio(&[0.01, 0.02, 0.0], 252.0), f64::INFINITY);
        assert_eq!(sortino_ratio(&[0.0, 0.0], 252.0), 0.0);
        assert!(sortino_ratio(&[0.02, -0.01, 0.01], 252.0) > 0.0);
    }

    #[test]
    fn sharpe_known_returns() {
        let r = [0.01, -0.01, 0.01, -0.01];
        assert_eq!(sharpe_ratio(&r, 0.0, 252.0), 0.0);
        let up = [0.002, 0.0005, 0.002, 0.0005];
        assert!(sharpe_ratio(&up, 0.0, 252.0) > 5.0);
    }

    #[test]
    fn annualized_return_one_year() {
        let t0 = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let pts = vec![
            EquityPoint { timestamp: t0, equity: 100.0, drawdown: 0.0 },
            EquityPoint { timestamp: t0 + Duration::days(365), equity: 110.0, drawdown: 0.0 },
        ];
        assert!((annualized_return(0.1, &pts) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn calmar_uses_engine_drawdown() {
        assert!((calmar_ratio(0.2, 0.1) - 2.0).abs() < 1e-12);
        assert_eq!(calmar_ratio(0.2, 0.0), 0.0);
    }

    #[test]
    fn infinite_sortino_survives_json() {
        let flat = curve(&[100_000.0, 100_100.0, 100_200.0]);
        let m = PerformanceMetrics::compute(input(&[], &flat));
        assert_eq!(m.sortino_ratio, f64::INFINITY);
        let json = serde_json::to_string(&m).unwrap();
        let back: PerformanceMetrics = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sortino_ratio, f64::INFINITY);
    }
}
