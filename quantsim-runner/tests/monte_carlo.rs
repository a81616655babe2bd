//! Cost-model Monte Carlo against a synthetic series.

use std::sync::Arc;

use quantsim_core::config::{BacktestConfig, CostModelConfig};
use quantsim_core::signals::{MaCrossProvider, SignalProviderRegistry};
use quantsim_core::strategy::StrategyDefinition;
use quantsim_runner::data_loader::{synthetic_bars, SyntheticSpec};
use quantsim_runner::monte_carlo::{run_monte_carlo, McError, MonteCarloConfig};
use quantsim_runner::runner::MarketData;

fn data(bars: usize) -> MarketData {
    MarketData::new(synthetic_bars(&SyntheticSpec {
        bars,
        seed: 8,
        ..SyntheticSpec::default()
    }))
}

fn registry() -> SignalProviderRegistry {
    SignalProviderRegistry::new()
        .with(Arc::new(MaCrossProvider::new(5, 20).unwrap()))
        .unwrap()
}

fn mc(samples: usize, seed: u64) -> MonteCarloConfig {
    MonteCarloConfig {
        samples,
        perturbation: 0.2,
        seed: Some(seed),
    }
}

#[test]
fn seeded_runs_are_reproducible() {
    let data = data(300);
    let strategy = StrategyDefinition::new("ma");
    let config = BacktestConfig::default();

    let a = run_monte_carlo(&data, &registry(), &strategy, &config, &mc(12, 5), None).unwrap();
    let b = run_monte_carlo(&data, &registry(), &strategy, &config, &mc(12, 5), None).unwrap();
    assert_eq!(a, b);

    let c = run_monte_carlo(&data, &registry(), &strategy, &config, &mc(12, 6), None).unwrap();
    assert_ne!(a.samples[0].slippage, c.samples[0].slippage);
}

#[test]
fn report_summarizes_every_sample() {
    let report = run_monte_carlo(
        &data(300),
        &registry(),
        &StrategyDefinition::new("ma"),
        &BacktestConfig::default(),
        &mc(16, 1),
        None,
    )
    .unwrap();

    assert_eq!(report.requested, 16);
    assert_eq!(report.failed, 0);
    assert_eq!(report.samples.len(), 16);
    let indices: Vec<usize> = report.samples.iter().map(|s| s.index).collect();
    assert_eq!(indices, (0..16).collect::<Vec<_>>());

    assert!((0.0..=1.0).contains(&report.success_rate));
    let r = report.total_return_pct;
    assert!(r.p5 <= r.p95);
    assert!(report.max_drawdown.p95 <= 1.0);

    let base = CostModelConfig::default();
    for s in &report.samples {
        assert!(s.slippage >= base.slippage * 0.8 - 1e-12);
        assert!(s.slippage <= base.slippage * 1.2 + 1e-12);
    }
}

#[test]
fn frictionless_costs_do_not_vary() {
    let config = BacktestConfig {
        cost_model: CostModelConfig::frictionless(),
        ..BacktestConfig::default()
    };
    let report = run_monte_carlo(
        &data(300),
        &registry(),
        &StrategyDefinition::new("ma"),
        &config,
        &mc(8, 2),
        None,
    )
    .unwrap();
    assert!(report.total_return_pct.std_dev < 1e-12);
    assert_eq!(report.total_return_pct.p5, report.total_return_pct.p95);
}

#[test]
fn all_samples_failing_is_an_error() {
    let err = run_monte_carlo(
        &data(20),
        &registry(),
        &StrategyDefinition::new("ma"),
        &BacktestConfig::default(),
        &mc(4, 3),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, McError::NoSamples { failed: 4 }));
}

#[test]
fn invalid_settings_fail_before_sampling() {
    let bad = MonteCarloConfig {
        samples: 0,
        ..MonteCarloConfig::default()
    };
    let err = run_monte_carlo(
        &data(300),
        &registry(),
        &StrategyDefinition::new("ma"),
        &BacktestConfig::default(),
        &bad,
        None,
    )
    .unwrap_err();
    assert!(matches!(err, McError::Config(_)));
}
