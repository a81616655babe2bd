//! Trade lifecycle types: `OpenTrade` → `ClosedTrade`.
//!
//! Closing consumes the open trade, so exit fields only ever exist on a
//! closed trade.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;

use super::ids::TradeId;

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeDirection {
    Long,
    Short,
}

impl TradeDirection {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }

    /// True if `stop` lies strictly on the losing side of `entry`.
    pub fn is_valid_stop(self, entry: f64, stop: f64) -> bool {
        stop.is_finite() && (entry - stop) * self.sign() > 0.0
    }
}

/// Execution cost breakdown, accumulated over a trade's entry and exit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub commission: f64,
    pub slippage: f64,
    pub impact: f64,
    pub liquidity: f64,
    pub latency: f64,
    pub total: f64,
}

impl CostBreakdown {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Every non-commission term: the market-execution share of the cost.
    pub fn execution_drag(&self) -> f64 {
        self.slippage + self.impact + self.liquidity + self.latency
    }
}

impl AddAssign for CostBreakdown {
    fn add_assign(&mut self, rhs: Self) {
        self.commission += rhs.commission;
        self.slippage += rhs.slippage;
        self.impact += rhs.impact;
        self.liquidity += rhs.liquidity;
        self.latency += rhs.latency;
        self.total += rhs.total;
    }
}

/// Why a trade was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Signal,
    TimeExit,
    EndOfBacktest,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::StopLoss => "Stop Loss",
            Self::TakeProfit => "Take Profit",
            Self::Signal => "Signal Exit",
            Self::TimeExit => "Time Exit",
            Self::EndOfBacktest => "End of backtest",
        };
        f.write_str(label)
    }
}

/// Outcome classification of a closed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeOutcome {
    Win,
    Loss,
    /// Execution cost absorbed the edge: |P&L| smaller than total cost.
    Push,
}

impl TradeOutcome {
    pub fn classify(realized_pnl: f64, total_cost: f64) -> Self {
        if realized_pnl > 0.0 {
            Self::Win
        } else if realized_pnl.abs() < total_cost {
            Self::Push
        } else {
            Self::Loss
        }
    }
}

/// A trade that is still open. Owned by the simulation loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenTrade {
    pub id: TradeId,
    pub direction: TradeDirection,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub entry_bar: usize,
    pub quantity: f64,
    pub stop_loss: f64,
    pub take_profit: Option<f64>,
    /// Costs accumulated so far (entry costs while open).
    pub costs: CostBreakdown,
    /// Provider that produced the entry signal.
    pub source: String,
}

impl OpenTrade {
    /// Directional price delta per unit: positive when the trade is in profit.
    pub fn price_delta(&self, price: f64) -> f64 {
        self.direction.sign() * (price - self.entry_price)
    }

    /// Unrealized P&L at `price`, net of the costs accumulated so far.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.price_delta(price) * self.quantity - self.costs.total
    }

    /// Capital at risk between entry and stop.
    pub fn risk_amount(&self) -> f64 {
        (self.entry_price - self.stop_loss).abs() * self.quantity
    }

    pub fn notional(&self) -> f64 {
        self.entry_price * self.quantity
    }

    pub fn holding_duration(&self, now: DateTime<Utc>) -> Duration {
        now - self.entry_time
    }

    /// Close the trade. `exit_costs` are added to the accumulated breakdown
    /// before P&L is realized.
    pub fn close(
        self,
        exit_price: f64,
        exit_time: DateTime<Utc>,
        exit_bar: usize,
        exit_reason: ExitReason,
        exit_costs: CostBreakdown,
    ) -> ClosedTrade {
        let mut costs = self.costs;
        costs += exit_costs;

        let gross_pnl = self.price_delta(exit_price) * self.quantity;
        let realized_pnl = gross_pnl - costs.total;
        let risk = self.risk_amount();
        let risk_reward_ratio = if risk > 0.0 {
            realized_pnl.abs() / risk
        } else {
            0.0
        };
        let outcome = TradeOutcome::classify(realized_pnl, costs.total);

        ClosedTrade {
            id: self.id,
            direction: self.direction,
            entry_price: self.entry_price,
            entry_time: self.entry_time,
            entry_bar: self.entry_bar,
            quantity: self.quantity,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            source: self.source,
            exit_price,
            exit_time,
            exit_bar,
            exit_reason,
            costs,
            gross_pnl,
            realized_pnl,
            risk_reward_ratio,
            outcome,
        }
    }
}

/// A completed round-trip trade. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub id: TradeId,
    pub direction: TradeDirection,

    // ── Entry ──
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub entry_bar: usize,
    pub quantity: f64,
    pub stop_loss: f64,
    pub take_profit: Option<f64>,
    pub source: String,

    // ── Exit ──
    pub exit_price: f64,
    pub exit_time: DateTime<Utc>,
    pub exit_bar: usize,
    pub exit_reason: ExitReason,

    // ── PnL ──
    pub costs: CostBreakdown,
    pub gross_pnl: f64,
    pub realized_pnl: f64,
    pub risk_reward_ratio: f64,
    pub outcome: TradeOutcome,
}

impl ClosedTrade {
    pub fn is_win(&self) -> bool {
        self.outcome == TradeOutcome::Win
    }

    pub fn is_loss(&self) -> bool {
        self.outcome == TradeOutcome::Loss
    }

    pub fn duration(&self) -> Duration {
        self.exit_time - self.entry_time
    }

    pub fn bars_held(&self) -> usize {
        self.exit_bar.saturating_sub(self.entry_bar)
    }

    /// Return on the trade as a fraction of entry notional.
    pub fn return_pct(&self) -> f64 {
        let notional = self.entry_price * self.quantity;
        if notional == 0.0 {
            return 0.0;
        }
        self.realized_pnl / notional
    }
}
