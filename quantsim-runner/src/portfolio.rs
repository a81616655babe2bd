//! Cross-strategy correlation, heuristic mean-variance weights and an
//! efficient-frontier sampler.
//!
//! The optimizer is a fixed-iteration gradient nudge, not a QP solver. It
//! converges towards weights that favour strategies whose expected return
//! beats the current portfolio's, scaled by portfolio volatility.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use quantsim_core::domain::EquityPoint;
use quantsim_core::rng::RngHierarchy;

use crate::metrics::{bar_returns, mean};

/// Timestamped bar returns of one strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnSeries {
    pub name: String,
    pub returns: Vec<(DateTime<Utc>, f64)>,
}

impl ReturnSeries {
    pub fn from_equity(name: impl Into<String>, equity_curve: &[EquityPoint], initial_capital: f64) -> Self {
        let returns = bar_returns(equity_curve, initial_capital);
        Self {
            name: name.into(),
            returns: equity_curve
                .iter()
                .zip(returns)
                .map(|(p, r)| (p.timestamp, r))
                .collect(),
        }
    }
}

/// Keep only timestamps present in every series, in time order.
/// Returns one column per series.
pub fn align(series: &[ReturnSeries]) -> Vec<Vec<f64>> {
    let Some(first) = series.first() else {
        return Vec::new();
    };
    let maps: Vec<BTreeMap<DateTime<Utc>, f64>> = series
        .iter()
        .map(|s| s.returns.iter().copied().collect())
        .collect();
    let common: Vec<DateTime<Utc>> = first
        .returns
        .iter()
        .map(|(t, _)| *t)
        .filter(|t| maps.iter().all(|m| m.contains_key(t)))
        .collect();
    maps.iter()
        .map(|m| common.iter().filter_map(|t| m.get(t).copied()).collect())
        .collect()
}

// ─── Correlation ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub strategies: Vec<String>,
    /// Row-major, `values[i][j]` = ρ(strategy i, strategy j).
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.strategies.iter().position(|s| s == a)?;
        let j = self.strategies.iter().position(|s| s == b)?;
        Some(self.values[i][j])
    }
}

pub fn correlation_matrix(series: &[ReturnSeries]) -> CorrelationMatrix {
    let columns = align(series);
    let n = columns.len();
    let mut values = vec![vec![0.0; n]; n];
    for i in 0..n {
        values[i][i] = 1.0;
        for j in (i + 1)..n {
            let rho = pearson(&columns[i], &columns[j]);
            values[i][j] = rho;
            values[j][i] = rho;
        }
    }
    CorrelationMatrix {
        strategies: series.iter().map(|s| s.name.clone()).collect(),
        values,
    }
}

/// Pearson correlation; 0.0 when either side is constant or the inputs are
/// shorter than two observations.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let cov = covariance(a, b);
    let var_a = covariance(a, a);
    let var_b = covariance(b, b);
    if var_a < 1e-20 || var_b < 1e-20 {
        return 0.0;
    }
    (cov / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0)
}

/// Population covariance of two equal-length slices.
fn covariance(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let (ma, mb) = (mean(&a[..n]), mean(&b[..n]));
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - ma) * (y - mb))
        .sum::<f64>()
        / n as f64
}

// ─── Portfolio statistics ───────────────────────────────────────────

/// Per-bar means and covariance of aligned strategy returns.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioInputs {
    pub strategies: Vec<String>,
    pub means: Vec<f64>,
    pub covariance: Vec<Vec<f64>>,
    pub bars_per_year: f64,
    pub risk_free_rate: f64,
}

impl PortfolioInputs {
    pub fn from_series(series: &[ReturnSeries], bars_per_year: f64, risk_free_rate: f64) -> Self {
        let columns = align(series);
        let covariance = columns
            .iter()
            .map(|a| columns.iter().map(|b| covariance(a, b)).collect())
            .collect();
        Self {
            strategies: series.iter().map(|s| s.name.clone()).collect(),
            means: columns.iter().map(|c| mean(c)).collect(),
            covariance,
            bars_per_year,
            risk_free_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Annualized expected return, volatility and Sharpe of `weights`.
    pub fn stats(&self, weights: &[f64]) -> PortfolioStats {
        let mu: f64 = weights.iter().zip(&self.means).map(|(w, m)| w * m).sum();
        let mut variance = 0.0;
        for (i, wi) in weights.iter().enumerate() {
            for (j, wj) in weights.iter().enumerate() {
                variance += wi * wj * self.covariance[i][j];
            }
        }
        let expected_return = mu * self.bars_per_year;
        let volatility = variance.max(0.0).sqrt() * self.bars_per_year.sqrt();
        let sharpe = if volatility > 1e-12 {
            (expected_return - self.risk_free_rate) / volatility
        } else {
            0.0
        };
        PortfolioStats {
            expected_return,
            volatility,
            sharpe,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioStats {
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe: f64,
}

// ─── Optimizer ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub iterations: usize,
    pub learning_rate: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            learning_rate: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioAllocation {
    pub strategies: Vec<String>,
    pub weights: Vec<f64>,
    pub stats: PortfolioStats,
}

/// Heuristic mean-variance weights.
///
/// Starts from equal weights. Each iteration nudges `w_i` by
/// `learning_rate × (μ_i − μ_p) / σ_p` (annualized), clamps at zero and
/// renormalizes to sum 1. Stops early when the portfolio has no volatility.
pub fn optimize_weights(inputs: &PortfolioInputs, config: &OptimizerConfig) -> PortfolioAllocation {
    let n = inputs.len();
    let mut weights = vec![if n == 0 { 0.0 } else { 1.0 / n as f64 }; n];

    for _ in 0..config.iterations {
        let stats = inputs.stats(&weights);
        if stats.volatility <= 1e-12 {
            break;
        }
        for (i, w) in weights.iter_mut().enumerate() {
            let mu_i = inputs.means[i] * inputs.bars_per_year;
            *w = (*w + config.learning_rate * (mu_i - stats.expected_return) / stats.volatility).max(0.0);
        }
        normalize(&mut weights);
    }

    PortfolioAllocation {
        strategies: inputs.strategies.clone(),
        stats: inputs.stats(&weights),
        weights,
    }
}

/// Scale to sum 1; all-zero weights fall back to equal weights.
fn normalize(weights: &mut [f64]) {
    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        weights.iter_mut().for_each(|w| *w /= total);
    } else if !weights.is_empty() {
        let equal = 1.0 / weights.len() as f64;
        weights.iter_mut().for_each(|w| *w = equal);
    }
}

// ─── Efficient frontier ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontierConfig {
    pub samples: usize,
    /// `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for FrontierConfig {
    fn default() -> Self {
        Self {
            samples: 500,
            seed: Some(42),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub weights: Vec<f64>,
    pub stats: PortfolioStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficientFrontier {
    pub strategies: Vec<String>,
    pub points: Vec<FrontierPoint>,
    pub best_sharpe: Option<FrontierPoint>,
}

/// Sample random long-only weight vectors and score each one.
///
/// Sample `i` draws from its own seeded stream, so the cloud is identical
/// for a given seed regardless of thread scheduling.
pub fn efficient_frontier(inputs: &PortfolioInputs, config: &FrontierConfig) -> EfficientFrontier {
    let rngs = RngHierarchy::from_option(config.seed);
    let n = inputs.len();

    let points: Vec<FrontierPoint> = if n == 0 {
        Vec::new()
    } else {
        (0..config.samples)
            .into_par_iter()
            .map(|i| {
                let mut rng = rngs.rng_for("frontier", i as u64);
                let mut weights: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
                normalize(&mut weights);
                FrontierPoint {
                    stats: inputs.stats(&weights),
                    weights,
                }
            })
            .collect()
    };

    let best_sharpe = points
        .iter()
        .max_by(|a, b| a.stats.sharpe.total_cmp(&b.stats.sharpe))
        .cloned();
    EfficientFrontier {
        strategies: inputs.strategies.clone(),
        points,
        best_sharpe,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn series(name: &str, returns: &[f64]) -> ReturnSeries {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        ReturnSeries {
            name: name.into(),
            returns: returns
                .iter()
                .enumerate()
                .map(|(i, &r)| (t0 + Duration::days(i as i64), r))
                .collect(),
        }
    }

    fn wave(n: usize, scale: f64, offset: f64) -> Vec<f64> {
        (0..n)
            .map(|i| offset + scale * if i % 2 == 0 { 0.01 } else { -0.01 })
            .collect()
    }

    #[test]
    fn correlation_of_mirror_series() {
        let a = series("a", &wave(50, 1.0, 0.0));
        let b = series("b", &wave(50, -2.0, 0.001));
        let c = series("c", &wave(50, 3.0, 0.0));
        let m = correlation_matrix(&[a, b, c]);
        assert_eq!(m.get("a", "a"), Some(1.0));
        assert!((m.get("a", "b").unwrap() + 1.0).abs() < 1e-9);
        assert!((m.get("a", "c").unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(m.get("a", "b"), m.get("b", "a"));
        assert_eq!(m.get("a", "zzz"), None);
    }

    #[test]
    fn constant_series_has_zero_correlation() {
        assert_eq!(pearson(&[0.0; 10], &wave(10, 1.0, 0.0)), 0.0);
        assert_eq!(pearson(&[1.0], &[2.0]), 0.0);
    }

    #[test]
    fn alignment_keeps_common_timestamps() {
        let a = series("a", &[0.1, 0.2, 0.3, 0.4]);
        let mut b = series("b", &[1.0, 2.0, 3.0, 4.0]);
        b.returns.remove(1);
        let cols = align(&[a, b]);
        assert_eq!(cols[0], vec![0.1, 0.3, 0.4]);
        assert_eq!(cols[1], vec![1.0, 3.0, 4.0]);
    }

    #[test]
    fn optimizer_weights_are_a_distribution() {
        let inputs = PortfolioInputs::from_series(
            &[
                series("good", &wave(100, 1.0, 0.002)),
                series("bad", &wave(100, 1.5, -0.001)),
                series("meh", &wave(100, 0.5, 0.0)),
            ],
            252.0,
            0.0,
        );
        let alloc = optimize_weights(&inputs, &OptimizerConfig::default());
        let total: f64 = alloc.weights.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(alloc.weights.iter().all(|&w| w >= 0.0));
        assert!(alloc.weights[0] > alloc.weights[1]);
    }

    #[test]
    fn zero_iterations_keep_equal_weights() {
        let inputs = PortfolioInputs::from_series(
            &[series("a", &wave(20, 1.0, 0.001)), series("b", &wave(20, 1.0, 0.0))],
            252.0,
            0.0,
        );
        let alloc = optimize_weights(
            &inputs,
            &OptimizerConfig {
                iterations: 0,
                ..OptimizerConfig::default()
            },
        );
        assert_eq!(alloc.weights, vec![0.5, 0.5]);
    }

    #[test]
    fn frontier_is_seeded() {
        let inputs = PortfolioInputs::from_series(
            &[series("a", &wave(60, 1.0, 0.001)), series("b", &wave(60, -1.0, 0.0005))],
            252.0,
            0.0,
        );
        let config = FrontierConfig {
            samples: 64,
            seed: Some(9),
        };
        let a = efficient_frontier(&inputs, &config);
        let b = efficient_frontier(&inputs, &config);
        assert_eq!(a, b);
        assert_eq!(a.points.len(), 64);
        let best = a.best_sharpe.unwrap();
        assert!(a.points.iter().all(|p| p.stats.sharpe <= best.stats.sharpe));
        for p in &a.points {
            assert!((p.weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn empty_inputs_are_harmless() {
        let inputs = PortfolioInputs::from_series(&[], 252.0, 0.0);
        assert!(optimize_weights(&inputs, &OptimizerConfig::default()).weights.is_empty());
        let frontier = efficient_frontier(&inputs, &FrontierConfig::default());
        assert!(frontier.points.is_empty());
        assert!(frontier.best_sharpe.is_none());
    }
}
