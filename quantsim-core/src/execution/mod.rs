//! Execution costs.
//!
//! Every fill, entry or exit, is charged through [`CostModel::cost`]; the
//! breakdown is stored on the trade.

pub mod cost_model;

pub use cost_model::{average_volume, realized_volatility, CostModel, MarketConditions};
