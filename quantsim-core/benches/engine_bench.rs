//! Criterion benchmarks for QuantSim hot paths.
//!
//! Benchmarks:
//! 1. Simulation loop (full run with two providers)
//! 2. Cost model evaluation
//! 3. Signal aggregation for a single bar

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use quantsim_core::config::{BacktestConfig, CostModelConfig, Timeframe};
use quantsim_core::domain::MarketBar;
use quantsim_core::execution::{CostModel, MarketConditions};
use quantsim_core::signals::{
    BreakoutProvider, MaCrossProvider, SignalAggregator, SignalProviderRegistry,
};
use quantsim_core::{run_simulation, StrategyDefinition};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_bars(n: usize) -> Vec<MarketBar> {
    let t0 = chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2020, 1, 2, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            MarketBar::new(
                t0 + chrono::Duration::days(i as i64),
                close - 0.3,
                close + 1.5,
                close - 1.5,
                close,
                1_000_000.0 + (i % 500) as f64 * 1_000.0,
            )
        })
        .collect()
}

fn make_registry() -> SignalProviderRegistry {
    SignalProviderRegistry::new()
        .with(Arc::new(MaCrossProvider::new(10, 30).unwrap()))
        .and_then(|r| r.with(Arc::new(BreakoutProvider::new(20).unwrap())))
        .unwrap()
}

fn strategy() -> StrategyDefinition {
    StrategyDefinition::new("bench")
        .with_thresholds(0.5, 0.5)
        .with_min_risk_reward(1.0)
}

// ── 1. Simulation loop ───────────────────────────────────────────────

fn bench_simulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulation");
    let registry = make_registry();
    let strategy = strategy();
    let config = BacktestConfig::default();
    for n in [500usize, 2_000] {
        let bars = make_bars(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &bars, |b, bars| {
            b.iter(|| {
                run_simulation(black_box(bars), &registry, &strategy, &config, None).unwrap()
            })
        });
    }
    group.finish();
}

// ── 2. Cost model ────────────────────────────────────────────────────

fn bench_cost_model(c: &mut Criterion) {
    let model = CostModel::new(CostModelConfig::default());
    let market = MarketConditions::new(100.0, 0.25, Some(1_000_000.0));
    c.bench_function("cost_model", |b| {
        b.iter(|| model.cost(black_box(250_000.0), black_box(&market)))
    });
}

// ── 3. Aggregation ───────────────────────────────────────────────────

fn bench_aggregation(c: &mut Criterion) {
    let registry = make_registry();
    let strategy = strategy();
    let bars = make_bars(300);
    let aggregator = SignalAggregator::new(&registry, &strategy, Timeframe::D1);
    c.bench_function("aggregate_bar", |b| {
        b.iter(|| aggregator.aggregate(black_box(&bars)))
    });
}

criterion_group!(benches, bench_simulation, bench_cost_model, bench_aggregation);
criterion_main!(benches);
