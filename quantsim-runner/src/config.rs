//! File configuration: one TOML document describing the backtest settings,
//! the strategies to run and the batch jobs around them.
//!
//! ```toml
//! [backtest]
//! initial_capital = 100000.0
//! timeframe = "1d"
//!
//! [backtest.cost_model]
//! slippage = 0.0005
//!
//! [[strategies]]
//! name = "trend"
//! providers = [{ type = "ma_cross", fast = 10, slow = 30 }]
//!
//! [comparison]
//! periods = [150, 250, 500]
//!
//! [monte_carlo]
//! samples = 100
//!
//! [data]
//! csv = "bars.csv"
//! ```
//!
//! Every section has defaults, so an empty file is a valid config.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use quantsim_core::config::{BacktestConfig, ConfigError};
use quantsim_core::domain::{EdgeEstimate, MarketBar, RunId};
use quantsim_core::signals::{
    BreakoutProvider, MaCrossProvider, RegistryError, SignalProvider, SignalProviderRegistry,
};
use quantsim_core::strategy::{RiskManagement, StrategyDefinition, StrategyParams};

use crate::comparison::{ComparisonConfig, StrategyCandidate};
use crate::data_loader::{load_csv, synthetic_bars, LoadError, SyntheticSpec};
use crate::monte_carlo::MonteCarloConfig;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Invalid(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// A built-in signal provider and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    MaCross { fast: usize, slow: usize },
    Breakout { period: usize },
}

impl ProviderConfig {
    pub fn build(&self) -> Result<Arc<dyn SignalProvider>, ConfigError> {
        Ok(match *self {
            Self::MaCross { fast, slow } => Arc::new(MaCrossProvider::new(fast, slow)?),
            Self::Breakout { period } => Arc::new(BreakoutProvider::new(period)?),
        })
    }
}

/// One `[[strategies]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    #[serde(default)]
    pub parameters: StrategyParams,
    #[serde(default)]
    pub risk_management: RiskManagement,
    #[serde(default)]
    pub edge: Option<EdgeEstimate>,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl StrategyConfig {
    pub fn definition(&self) -> StrategyDefinition {
        StrategyDefinition {
            name: self.name.clone(),
            parameters: self.parameters.clone(),
            risk_management: self.risk_management.clone(),
            edge: self.edge,
        }
    }

    pub fn registry(&self) -> Result<SignalProviderRegistry, SettingsError> {
        let mut registry = SignalProviderRegistry::new();
        for provider in &self.providers {
            registry.register(provider.build()?)?;
        }
        Ok(registry)
    }

    pub fn candidate(&self) -> Result<StrategyCandidate, SettingsError> {
        Ok(StrategyCandidate {
            strategy: self.definition(),
            registry: self.registry()?,
        })
    }
}

fn default_strategies() -> Vec<StrategyConfig> {
    vec![
        StrategyConfig {
            name: "ma_cross".into(),
            parameters: StrategyParams::default(),
            risk_management: RiskManagement::default(),
            edge: None,
            providers: vec![ProviderConfig::MaCross { fast: 10, slow: 30 }],
        },
        StrategyConfig {
            name: "breakout".into(),
            parameters: StrategyParams::default(),
            risk_management: RiskManagement::default(),
            edge: None,
            providers: vec![ProviderConfig::Breakout { period: 20 }],
        },
    ]
}

/// Where bars come from: a CSV file, or the synthetic walk when unset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub csv: Option<PathBuf>,
    pub synthetic: SyntheticSpec,
}

/// The whole configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantSimConfig {
    pub backtest: BacktestConfig,
    pub strategies: Vec<StrategyConfig>,
    pub comparison: ComparisonConfig,
    pub monte_carlo: MonteCarloConfig,
    pub data: DataConfig,
}

impl Default for QuantSimConfig {
    fn default() -> Self {
        Self {
            backtest: BacktestConfig::default(),
            strategies: default_strategies(),
            comparison: ComparisonConfig::default(),
            monte_carlo: MonteCarloConfig::default(),
            data: DataConfig::default(),
        }
    }
}

impl QuantSimConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config to TOML")
    }

    /// Validate every section and build every provider once.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.backtest.validate()?;
        self.monte_carlo.validate()?;
        if self.strategies.is_empty() {
            return Err(ConfigError::invalid("strategies", "at least one strategy is required").into());
        }
        let mut seen = HashSet::new();
        for strategy in &self.strategies {
            if !seen.insert(strategy.name.as_str()) {
                return Err(ConfigError::invalid(
                    "strategies",
                    format!("duplicate strategy name `{}`", strategy.name),
                )
                .into());
            }
            strategy.definition().validate()?;
            strategy.registry()?;
        }
        if self.comparison.periods.is_empty() {
            return Err(ConfigError::invalid("comparison.periods", "at least one period is required").into());
        }
        if let Some(&p) = self.comparison.periods.iter().find(|&&p| p <= self.backtest.min_history_bars) {
            return Err(ConfigError::invalid(
                "comparison.periods",
                format!("period {p} leaves no bars after the warm-up window"),
            )
            .into());
        }
        Ok(())
    }

    pub fn strategy(&self, name: &str) -> Option<&StrategyConfig> {
        self.strategies.iter().find(|s| s.name == name)
    }

    pub fn candidates(&self) -> Result<Vec<StrategyCandidate>, SettingsError> {
        self.strategies.iter().map(StrategyConfig::candidate).collect()
    }

    /// Content-addressable ID of this configuration.
    pub fn run_id(&self) -> RunId {
        RunId::from_bytes(&serde_json::to_vec(self).unwrap_or_default())
    }

    /// Load the configured bars. A relative CSV path resolves against `base_dir`.
    /// The synthetic walk uses the backtest timeframe.
    pub fn load_bars(&self, base_dir: &Path) -> Result<Vec<MarketBar>, LoadError> {
        match &self.data.csv {
            Some(path) if path.is_relative() => load_csv(&base_dir.join(path)),
            Some(path) => load_csv(path),
            None => Ok(synthetic_bars(&SyntheticSpec {
                timeframe: self.backtest.timeframe,
                ..self.data.synthetic.clone()
            })),
        }
    }
}

/// Read and validate a config file.
pub fn load_config(path: &Path) -> anyhow::Result<QuantSimConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    QuantSimConfig::from_toml_str(&text)
        .with_context(|| format!("invalid config {}", path.display()))
}
