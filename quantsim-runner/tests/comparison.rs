//! Multi-strategy comparison over one shared synthetic series.

use std::sync::Arc;

use quantsim_core::config::BacktestConfig;
use quantsim_core::engine::CancelFlag;
use quantsim_core::signals::{BreakoutProvider, MaCrossProvider, SignalProviderRegistry};
use quantsim_core::strategy::StrategyDefinition;
use quantsim_runner::comparison::{compare_strategies, ComparisonConfig, StrategyCandidate};
use quantsim_runner::data_loader::{synthetic_bars, SyntheticSpec};
use quantsim_runner::portfolio::FrontierConfig;
use quantsim_runner::runner::MarketData;

fn data() -> MarketData {
    MarketData::new(synthetic_bars(&SyntheticSpec {
        bars: 400,
        seed: 21,
        ..SyntheticSpec::default()
    }))
}

fn candidates() -> Vec<StrategyCandidate> {
    vec![
        StrategyCandidate {
            strategy: StrategyDefinition::new("ma_cross"),
            registry: SignalProviderRegistry::new()
                .with(Arc::new(MaCrossProvider::new(5, 20).unwrap()))
                .unwrap(),
        },
        StrategyCandidate {
            strategy: StrategyDefinition::new("breakout"),
            registry: SignalProviderRegistry::new()
                .with(Arc::new(BreakoutProvider::new(20).unwrap()))
                .unwrap(),
        },
    ]
}

fn comparison() -> ComparisonConfig {
    ComparisonConfig {
        periods: vec![150, 300, 1_000],
        frontier: FrontierConfig {
            samples: 50,
            seed: Some(9),
        },
        ..ComparisonConfig::default()
    }
}

#[test]
fn period_longer_than_series_is_a_recorded_failure() {
    let report = compare_strategies(
        &data(),
        &candidates(),
        &BacktestConfig::default(),
        &comparison(),
        None,
    );

    assert_eq!(report.runs.len(), 4);
    assert_eq!(report.failures.len(), 2);
    assert!(report.failures.iter().all(|f| f.period == 1_000));
    assert!(report.failures[0].error.contains("need at least"));

    assert_eq!(report.summaries.len(), 2);
    for summary in &report.summaries {
        assert_eq!(summary.periods_run, 2);
        assert!(summary.consistency > 0.0 && summary.consistency <= 1.0);
    }
    assert_eq!(report.ranking.len(), 2);
}

#[test]
fn comparison_is_deterministic() {
    let config = BacktestConfig::default();
    let a = compare_strategies(&data(), &candidates(), &config, &comparison(), None);
    let b = compare_strategies(&data(), &candidates(), &config, &comparison(), None);

    assert_eq!(a.summaries, b.summaries);
    assert_eq!(a.ranking, b.ranking);
    assert_eq!(a.correlation, b.correlation);
    assert_eq!(a.allocation, b.allocation);
    assert_eq!(a.frontier, b.frontier);
    let ids = |r: &quantsim_runner::ComparisonReport| {
        r.runs.iter().map(|run| run.run_id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&a), ids(&b));
}

#[test]
fn portfolio_views_cover_both_strategies() {
    let report = compare_strategies(
        &data(),
        &candidates(),
        &BacktestConfig::default(),
        &comparison(),
        None,
    );

    let corr = &report.correlation;
    assert_eq!(corr.strategies, vec!["ma_cross", "breakout"]);
    assert_eq!(corr.get("ma_cross", "ma_cross"), Some(1.0));
    let rho = corr.get("ma_cross", "breakout").unwrap();
    assert_eq!(Some(rho), corr.get("breakout", "ma_cross"));
    assert!((-1.0..=1.0).contains(&rho));

    let allocation = report.allocation.expect("two strategies give an allocation");
    assert_eq!(allocation.weights.len(), 2);
    assert!((allocation.weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    assert!(allocation.weights.iter().all(|&w| w >= 0.0));

    let frontier = report.frontier.expect("two strategies give a frontier");
    assert_eq!(frontier.points.len(), 50);
    let best = frontier.best_sharpe.unwrap();
    assert!(frontier.points.iter().all(|p| p.stats.sharpe <= best.stats.sharpe));
}

#[test]
fn single_strategy_skips_portfolio_views() {
    let report = compare_strategies(
        &data(),
        &candidates()[..1],
        &BacktestConfig::default(),
        &comparison(),
        None,
    );
    assert_eq!(report.summaries.len(), 1);
    assert!(report.allocation.is_none());
    assert!(report.frontier.is_none());
    assert!((report.ranking[0].composite_score - 1.0).abs() < 1e-12);
}

#[test]
fn cancelled_batch_records_every_run_as_failed() {
    let cancel = CancelFlag::new();
    cancel.cancel();
    let report = compare_strategies(
        &data(),
        &candidates(),
        &BacktestConfig::default(),
        &comparison(),
        Some(&cancel),
    );
    assert!(report.runs.is_empty());
    assert_eq!(report.failures.len(), 6);
    assert!(report.summaries.is_empty());
    assert!(report.ranking.is_empty());
}

#[test]
fn windows_share_the_parent_series() {
    let data = data();
    let window = data.tail(150).unwrap();
    assert!(window.shares_with(&data));
    assert_eq!(window.len(), 150);
    assert_eq!(window.bars()[0].timestamp, data.bars()[250].timestamp);
    assert!(data.tail(401).is_none());
}
