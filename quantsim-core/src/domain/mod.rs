//! Domain types for QuantSim

pub mod bar;
pub mod equity;
pub mod ids;
pub mod signal;
pub mod trade;

pub use bar::{validate_series, BarError, MarketBar};
pub use equity::{DrawdownTracker, EquityPoint};
pub use ids::{IdGen, RunId, TradeId};
pub use signal::{EdgeEstimate, Signal, SignalDirection};
pub use trade::{
    ClosedTrade, CostBreakdown, ExitReason, OpenTrade, TradeDirection, TradeOutcome,
};
