//! QuantSim Runner: backtest orchestration, analytics and batch studies.
//!
//! This crate builds on `quantsim-core` to provide:
//! - Bar loading from CSV or a seeded synthetic walk
//! - Single-backtest runner over shared market data
//! - Performance, tail-risk and monthly metrics
//! - Multi-strategy comparison with regime classification and ranking
//! - Correlation, heuristic portfolio weights and an efficient-frontier sampler
//! - Cost-model Monte Carlo
//! - TOML configuration and JSON/CSV export

pub mod comparison;
pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod monte_carlo;
pub mod monthly;
pub mod portfolio;
pub mod regime;
pub mod runner;
pub mod tail_metrics;

pub use comparison::{
    compare_strategies, ComparisonConfig, ComparisonReport, RankingWeights, RunFailure,
    StrategyCandidate, StrategyRanking, StrategySummary,
};
pub use config::{load_config, ProviderConfig, QuantSimConfig, SettingsError, StrategyConfig};
pub use data_loader::{load_csv, read_csv, synthetic_bars, LoadError, SyntheticSpec};
pub use metrics::{MetricsInput, PerformanceMetrics};
pub use monte_carlo::{run_monte_carlo, DistributionStats, McError, MonteCarloConfig, MonteCarloReport};
pub use monthly::MonthlyBucket;
pub use portfolio::{
    CorrelationMatrix, EfficientFrontier, FrontierConfig, OptimizerConfig, PortfolioAllocation,
};
pub use regime::{MarketRegime, RegimeThresholds};
pub use runner::{run_backtest, BacktestResult, MarketData, RunError, SCHEMA_VERSION};
pub use tail_metrics::TailMetrics;
