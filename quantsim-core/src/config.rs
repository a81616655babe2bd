//! Per-run configuration: capital, risk limits, cost model and sizing knobs.
//!
//! Every numeric constant used by the cost model and the sizer lives here as
//! a named field with a documented default. A config is validated once before
//! the first bar is processed; an invalid config never produces metrics.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Bar granularity label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[default]
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1w")]
    W1,
}

/// Trading days per year used for annualization.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

impl Timeframe {
    pub fn minutes(self) -> i64 {
        match self {
            Self::M1 => 1,
            Self::M5 => 5,
            Self::M15 => 15,
            Self::M30 => 30,
            Self::H1 => 60,
            Self::H4 => 240,
            Self::D1 => 1_440,
            Self::W1 => 10_080,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::minutes(self.minutes())
    }

    /// Bars per year for annualizing per-bar statistics.
    pub fn bars_per_year(self) -> f64 {
        match self {
            Self::W1 => 52.0,
            Self::D1 => TRADING_DAYS_PER_YEAR,
            intraday => TRADING_DAYS_PER_YEAR * (1_440.0 / intraday.minutes() as f64),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
            Self::W1 => "1w",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One commission band: notional at or above `from_notional` is charged
/// `commission_percent * rate_multiplier`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommissionTier {
    pub from_notional: f64,
    pub rate_multiplier: f64,
}

/// Execution cost model coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModelConfig {
    /// Base slippage rate, scaled by √(volume ratio).
    pub slippage: f64,
    /// Base commission rate for the first tier.
    pub commission_percent: f64,
    /// Base liquidity cost rate, scaled by (1 + 2 × volume ratio).
    pub liquidity_cost: f64,
    /// Execution latency in milliseconds.
    pub latency_ms: f64,
    /// Price impact coefficient, scaled by √(notional / reference notional).
    #[serde(alias = "price_impact_slippage")]
    pub price_impact: f64,
    /// Reference notional for the impact term.
    pub impact_reference_notional: f64,
    /// Multiplier on the latency term.
    pub latency_coefficient: f64,
    /// Trailing bar window for realized volatility and average volume.
    pub volatility_window: usize,
    /// Annualized volatility assumed when fewer than two returns are available.
    pub default_volatility: f64,
    /// Annualization factor for realized volatility (periods per year).
    pub annualization_factor: f64,
    /// Marginal commission bands, ascending by `from_notional`.
    pub commission_tiers: Vec<CommissionTier>,
}

impl Default for CostModelConfig {
    fn default() -> Self {
        Self {
            slippage: 0.0005,
            commission_percent: 0.001,
            liquidity_cost: 0.0001,
            latency_ms: 100.0,
            price_impact: 0.0001,
            impact_reference_notional: 100_000.0,
            latency_coefficient: 0.01,
            volatility_window: 20,
            default_volatility: 0.2,
            annualization_factor: TRADING_DAYS_PER_YEAR,
            commission_tiers: default_commission_tiers(),
        }
    }
}

/// Four bands: <10k full rate, 10k–100k 75%, 100k–1M 50%, ≥1M 25%.
pub fn default_commission_tiers() -> Vec<CommissionTier> {
    vec![
        CommissionTier {
            from_notional: 0.0,
            rate_multiplier: 1.0,
        },
        CommissionTier {
            from_notional: 10_000.0,
            rate_multiplier: 0.75,
        },
        CommissionTier {
            from_notional: 100_000.0,
            rate_multiplier: 0.5,
        },
        CommissionTier {
            from_notional: 1_000_000.0,
            rate_multiplier: 0.25,
        },
    ]
}

impl CostModelConfig {
    /// All cost terms zero.
    pub fn frictionless() -> Self {
        Self {
            slippage: 0.0,
            commission_percent: 0.0,
            liquidity_cost: 0.0,
            latency_ms: 0.0,
            price_impact: 0.0,
            latency_coefficient: 0.0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rates = [
            ("cost_model.slippage", self.slippage),
            ("cost_model.commission_percent", self.commission_percent),
            ("cost_model.liquidity_cost", self.liquidity_cost),
            ("cost_model.latency_ms", self.latency_ms),
            ("cost_model.price_impact", self.price_impact),
            ("cost_model.latency_coefficient", self.latency_coefficient),
            ("cost_model.default_volatility", self.default_volatility),
        ];
        for (field, value) in rates {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::invalid(field, format!("must be >= 0, got {value}")));
            }
        }
        if !(self.impact_reference_notional > 0.0) {
            return Err(ConfigError::invalid(
                "cost_model.impact_reference_notional",
                "must be > 0",
            ));
        }
        if !(self.annualization_factor > 0.0) {
            return Err(ConfigError::invalid(
                "cost_model.annualization_factor",
                "must be > 0",
            ));
        }
        if self.volatility_window < 2 {
            return Err(ConfigError::invalid(
                "cost_model.volatility_window",
                "must be >= 2",
            ));
        }
        match self.commission_tiers.first() {
            None => {
                return Err(ConfigError::invalid(
                    "cost_model.commission_tiers",
                    "at least one tier is required",
                ))
            }
            Some(first) if first.from_notional != 0.0 => {
                return Err(ConfigError::invalid(
                    "cost_model.commission_tiers",
                    "first tier must start at notional 0",
                ))
            }
            Some(_) => {}
        }
        for pair in self.commission_tiers.windows(2) {
            if pair[1].from_notional <= pair[0].from_notional {
                return Err(ConfigError::invalid(
                    "cost_model.commission_tiers",
                    "tiers must be strictly ascending",
                ));
            }
        }
        if self
            .commission_tiers
            .iter()
            .any(|t| !t.rate_multiplier.is_finite() || t.rate_multiplier < 0.0)
        {
            return Err(ConfigError::invalid(
                "cost_model.commission_tiers",
                "rate multipliers must be >= 0",
            ));
        }
        Ok(())
    }
}

/// Position sizing knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    /// Stop distance (fraction of price) used when a signal carries no stop.
    pub default_stop_fraction: f64,
    /// Multiplier applied to the full Kelly fraction (quarter-Kelly by default).
    pub kelly_fraction: f64,
    /// Hard cap on position notional as a fraction of capital.
    pub max_position_fraction: f64,
    /// Decimal places kept when truncating quantities.
    pub quantity_precision: u32,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            default_stop_fraction: 0.02,
            kelly_fraction: 0.25,
            max_position_fraction: 0.2,
            quantity_precision: 2,
        }
    }
}

impl SizingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.default_stop_fraction > 0.0 && self.default_stop_fraction < 1.0) {
            return Err(ConfigError::invalid(
                "sizing.default_stop_fraction",
                "must be in (0, 1)",
            ));
        }
        if !(0.0..=1.0).contains(&self.kelly_fraction) {
            return Err(ConfigError::invalid(
                "sizing.kelly_fraction",
                "must be in [0, 1]",
            ));
        }
        if !(self.max_position_fraction > 0.0 && self.max_position_fraction <= 1.0) {
            return Err(ConfigError::invalid(
                "sizing.max_position_fraction",
                "must be in (0, 1]",
            ));
        }
        if self.quantity_precision > 8 {
            return Err(ConfigError::invalid(
                "sizing.quantity_precision",
                "must be <= 8",
            ));
        }
        Ok(())
    }
}

/// Immutable per-run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    /// Fraction of capital risked per trade (e.g. 0.01).
    pub risk_per_trade: f64,
    pub max_open_positions: usize,
    /// Enables the margin-call check.
    #[serde(alias = "use_leverage", alias = "enable_margin_trading")]
    pub margin_trading: bool,
    /// Equity below `capital × margin_requirement` raises a margin call.
    pub margin_requirement: f64,
    pub timeframe: Timeframe,
    /// Annualized risk-free rate for Sharpe.
    pub risk_free_rate: f64,
    pub cost_model: CostModelConfig,
    pub sizing: SizingConfig,
    /// Bars of history required before the first evaluable bar.
    pub min_history_bars: usize,
    /// Optional cap on the trailing window handed to providers.
    pub lookback_window: Option<usize>,
    /// Maximum holding duration before a time exit.
    pub max_holding_hours: i64,
    /// Opposing signals above this confidence close open trades.
    pub signal_exit_confidence: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            risk_per_trade: 0.01,
            max_open_positions: 3,
            margin_trading: false,
            margin_requirement: 0.5,
            timeframe: Timeframe::D1,
            risk_free_rate: 0.02,
            cost_model: CostModelConfig::default(),
            sizing: SizingConfig::default(),
            min_history_bars: 50,
            lookback_window: None,
            max_holding_hours: 7 * 24,
            signal_exit_confidence: 0.8,
        }
    }
}

impl BacktestConfig {
    pub fn max_holding(&self) -> Duration {
        Duration::hours(self.max_holding_hours)
    }

    /// Reject configurations that would produce misleading metrics.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(ConfigError::invalid(
                "initial_capital",
                format!("must be > 0, got {}", self.initial_capital),
            ));
        }
        if !(self.risk_per_trade > 0.0 && self.risk_per_trade <= 1.0) {
            return Err(ConfigError::invalid(
                "risk_per_trade",
                format!("must be in (0, 1], got {}", self.risk_per_trade),
            ));
        }
        if self.max_open_positions == 0 {
            return Err(ConfigError::invalid("max_open_positions", "must be >= 1"));
        }
        if !(self.margin_requirement > 0.0 && self.margin_requirement <= 1.0) {
            return Err(ConfigError::invalid(
                "margin_requirement",
                "must be in (0, 1]",
            ));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(ConfigError::invalid("risk_free_rate", "must be finite"));
        }
        if self.min_history_bars == 0 {
            return Err(ConfigError::invalid("min_history_bars", "must be >= 1"));
        }
        if self.lookback_window == Some(0) {
            return Err(ConfigError::invalid("lookback_window", "must be >= 1"));
        }
        if self.max_holding_hours <= 0 {
            return Err(ConfigError::invalid("max_holding_hours", "must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.signal_exit_confidence) {
            return Err(ConfigError::invalid(
                "signal_exit_confidence",
                "must be in [0, 1]",
            ));
        }
        self.cost_model.validate()?;
        self.sizing.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(BacktestConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_capital_rejected() {
        let config = BacktestConfig {
            initial_capital: 0.0,
            ..BacktestConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("initial_capital"));
    }

    #[test]
    fn zero_max_positions_rejected() {
        let config = BacktestConfig {
            max_open_positions: 0,
            ..BacktestConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_cost_rate_rejected() {
        let mut config = BacktestConfig::default();
        config.cost_model.slippage = -0.1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cost_model.slippage"));
    }

    #[test]
    fn unsorted_tiers_rejected() {
        let mut config = BacktestConfig::default();
        config.cost_model.commission_tiers.swap(1, 2);
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_tiers_have_four_bands() {
        let tiers = default_commission_tiers();
        assert_eq!(tiers.len(), 4);
        assert!(tiers.windows(2).all(|w| w[1].rate_multiplier < w[0].rate_multiplier));
    }

    #[test]
    fn leverage_alias_deserializes() {
        let config: BacktestConfig =
            serde_json::from_str(r#"{"use_leverage": true, "initial_capital": 5000.0}"#).unwrap();
        assert!(config.margin_trading);
        assert_eq!(config.initial_capital, 5000.0);
        assert_eq!(config.max_open_positions, 3);
    }

    #[test]
    fn timeframe_labels_and_annualization() {
        assert_eq!(Timeframe::D1.bars_per_year(), 252.0);
        assert_eq!(Timeframe::H1.bars_per_year(), 252.0 * 24.0);
        assert_eq!(Timeframe::W1.bars_per_year(), 52.0);
        assert_eq!(serde_json::to_string(&Timeframe::H4).unwrap(), "\"4h\"");
        assert_eq!(Timeframe::M15.to_string(), "15m");
    }

    #[test]
    fn max_holding_default_is_seven_days() {
        assert_eq!(BacktestConfig::default().max_holding(), Duration::days(7));
    }
}
