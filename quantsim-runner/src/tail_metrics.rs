//! Tail risk metrics: VaR, CVaR, skewness, kurtosis, downside deviation.
//!
//! All functions are pure: bar returns in, scalar out. An empty return series
//! yields zeros, never NaN.

use serde::{Deserialize, Serialize};

use crate::metrics::{mean, std_dev};

/// Tail risk statistics of a run's bar returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TailMetrics {
    /// Historical Value at Risk at 95%: the 5th-percentile bar return.
    /// Negative for a losing tail.
    pub var_95: f64,

    /// Conditional VaR at 95%: mean of the returns at or below `var_95`.
    pub cvar_95: f64,

    /// Third standardized moment. Negative = heavier left tail.
    pub skewness: f64,

    /// Fourth standardized moment minus 3. Positive = fatter tails than normal.
    pub excess_kurtosis: f64,

    /// √(Σ negative r² / n).
    pub downside_deviation: f64,

    pub sample_size: usize,
}

pub fn compute_tail_metrics(returns: &[f64]) -> TailMetrics {
    if returns.is_empty() {
        return TailMetrics::default();
    }
    let (var_95, cvar_95) = var_cvar_95(returns);
    TailMetrics {
        var_95,
        cvar_95,
        skewness: skewness(returns),
        excess_kurtosis: excess_kurtosis(returns),
        downside_deviation: downside_deviation(returns),
        sample_size: returns.len(),
    }
}

/// VaR95 and CVaR95 of `returns`.
///
/// The VaR is `sorted[floor(0.05 · n)]`; the CVaR averages every sorted
/// return up to and including that one.
pub fn var_cvar_95(returns: &[f64]) -> (f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0);
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(f64::total_cmp);

    let index = ((sorted.len() as f64 * 0.05).floor() as usize).min(sorted.len() - 1);
    let var = sorted[index];
    let tail: Vec<f64> = sorted.iter().copied().take_while(|&r| r <= var).collect();
    (var, mean(&tail))
}

/// Population skewness. 0.0 for a constant series.
pub fn skewness(returns: &[f64]) -> f64 {
    standardized_moment(returns, 3)
}

/// Population excess kurtosis. 0.0 for a constant series.
pub fn excess_kurtosis(returns: &[f64]) -> f64 {
    let std = std_dev(returns);
    if std < 1e-15 {
        return 0.0;
    }
    standardized_moment(returns, 4) - 3.0
}

pub fn downside_deviation(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let downside_sq: f64 = returns.iter().filter(|&&r| r < 0.0).map(|r| r * r).sum();
    (downside_sq / returns.len() as f64).sqrt()
}

fn standardized_moment(returns: &[f64], k: i32) -> f64 {
    let std = std_dev(returns);
    if std < 1e-15 {
        return 0.0;
    }
    let m = mean(returns);
    returns.iter().map(|r| ((r - m) / std).powi(k)).sum::<f64>() / returns.len() as f64
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_returns_zeroed() {
        let tm = compute_tail_metrics(&[]);
        assert_eq!(tm, TailMetrics::default());
    }

    #[test]
    fn flat_returns_zeroed() {
        let tm = compute_tail_metrics(&[0.0; 99]);
        assert_eq!(tm.var_95, 0.0);
        assert_eq!(tm.cvar_95, 0.0);
        assert_eq!(tm.skewness, 0.0);
        assert_eq!(tm.excess_kurtosis, 0.0);
        assert_eq!(tm.downside_deviation, 0.0);
        assert_eq!(tm.sample_size, 99);
    }

    #[test]
    fn var_picks_fifth_percentile() {
        // 0.00, 0.01, ..., 0.99 shifted down by 0.5 → sorted[5] = -0.45
        let returns: Vec<f64> = (0..100).rev().map(|i| i as f64 / 100.0 - 0.5).collect();
        let (var, cvar) = var_cvar_95(&returns);
        assert!((var - (-0.45)).abs() < 1e-12);
        // mean of -0.50 .. -0.45
        assert!((cvar - (-0.475)).abs() < 1e-12);
    }

    #[test]
    fn small_sample_uses_worst_return() {
        let (var, cvar) = var_cvar_95(&[0.02, -0.03, 0.01]);
        assert_eq!(var, -0.03);
        assert_eq!(cvar, -0.03);
    }

    #[test]
    fn cvar_never_above_var() {
        let returns: Vec<f64> = (0..300)
            .map(|i| if i % 3 == 0 { -0.02 } else { 0.005 })
            .collect();
        let (var, cvar) = var_cvar_95(&returns);
        assert!(cvar <= var);
        assert!(cvar < 0.0);
    }

    #[test]
    fn skewness_negative_for_left_skewed() {
        let mut returns = vec![0.001; 252];
        for i in (0..252).step_by(20) {
            returns[i] = -0.05;
        }
        assert!(skewness(&returns) < 0.0);
    }

    #[test]
    fn kurtosis_positive_for_fat_tails() {
        let mut returns = vec![0.001; 300];
        for i in (0..300).step_by(15) {
            returns[i] = if i % 30 == 0 { 0.08 } else { -0.06 };
        }
        assert!(excess_kurtosis(&returns) > 0.0);
    }

    #[test]
    fn downside_deviation_uses_full_count() {
        // √((0.01² + 0.01²) / 4)
        let dd = downside_deviation(&[0.02, -0.01, 0.03, -0.01]);
        assert!((dd - (0.0002f64 / 4.0).sqrt()).abs() < 1e-15);
    }
}
