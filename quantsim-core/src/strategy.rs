//! Strategy definition: signal thresholds and risk-management limits.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::domain::EdgeEstimate;

/// Tunable signal thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    pub min_confidence: f64,
    pub min_strength: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            min_strength: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskManagement {
    pub min_risk_reward_ratio: f64,
}

impl Default for RiskManagement {
    fn default() -> Self {
        Self {
            min_risk_reward_ratio: 1.5,
        }
    }
}

/// A named strategy. Read-only during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDefinition {
    pub name: String,
    #[serde(default)]
    pub parameters: StrategyParams,
    #[serde(default)]
    pub risk_management: RiskManagement,
    /// Historical edge used to cap sizing when a signal carries none.
    #[serde(default)]
    pub edge: Option<EdgeEstimate>,
}

impl StrategyDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: StrategyParams::default(),
            risk_management: RiskManagement::default(),
            edge: None,
        }
    }

    pub fn with_thresholds(mut self, min_confidence: f64, min_strength: f64) -> Self {
        self.parameters = StrategyParams {
            min_confidence,
            min_strength,
        };
        self
    }

    pub fn with_min_risk_reward(mut self, min_risk_reward_ratio: f64) -> Self {
        self.risk_management.min_risk_reward_ratio = min_risk_reward_ratio;
        self
    }

    pub fn with_edge(mut self, edge: EdgeEstimate) -> Self {
        self.edge = Some(edge);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "strategy.name",
                reason: "must not be empty".into(),
            });
        }
        let p = &self.parameters;
        for (field, value) in [
            ("strategy.parameters.min_confidence", p.min_confidence),
            ("strategy.parameters.min_strength", p.min_strength),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be in [0, 1], got {value}"),
                });
            }
        }
        let rrr = self.risk_management.min_risk_reward_ratio;
        if !(rrr.is_finite() && rrr >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "strategy.risk_management.min_risk_reward_ratio",
                reason: format!("must be >= 0, got {rrr}"),
            });
        }
        Ok(())
    }
}
