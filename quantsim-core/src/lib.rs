//! QuantSim Core: domain types, cost model, sizing, signal aggregation and
//! the bar-by-bar simulation engine.
//!
//! This crate performs no I/O:
//! - Domain types (bars, signals, open/closed trades, equity points)
//! - Execution cost model with tiered commission
//! - Risk-based position sizing with Kelly capping
//! - Provider registry and signal aggregator with per-provider failure isolation
//! - Trade lifecycle and simulation loop as explicit state transitions
//! - Deterministic RNG hierarchy for seeded batch work

pub mod config;
pub mod domain;
pub mod engine;
pub mod execution;
pub mod rng;
pub mod signals;
pub mod sizers;
pub mod strategy;

pub use config::{BacktestConfig, ConfigError, CostModelConfig, SizingConfig, Timeframe};
pub use engine::{run_simulation, CancelFlag, EngineError, RunResult};
pub use signals::{SignalProvider, SignalProviderRegistry};
pub use strategy::StrategyDefinition;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything shared across rayon workers is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::MarketBar>();
        require_sync::<domain::MarketBar>();
        require_send::<domain::Signal>();
        require_sync::<domain::Signal>();
        require_send::<domain::OpenTrade>();
        require_sync::<domain::OpenTrade>();
        require_send::<domain::ClosedTrade>();
        require_sync::<domain::ClosedTrade>();
        require_send::<domain::EquityPoint>();
        require_sync::<domain::EquityPoint>();

        require_send::<BacktestConfig>();
        require_sync::<BacktestConfig>();
        require_send::<StrategyDefinition>();
        require_sync::<StrategyDefinition>();

        require_send::<SignalProviderRegistry>();
        require_sync::<SignalProviderRegistry>();
        require_send::<signals::MaCrossProvider>();
        require_sync::<signals::MaCrossProvider>();
        require_send::<signals::BreakoutProvider>();
        require_sync::<signals::BreakoutProvider>();

        require_send::<engine::SimulationState>();
        require_sync::<engine::SimulationState>();
        require_send::<RunResult>();
        require_sync::<RunResult>();
        require_send::<CancelFlag>();
        require_sync::<CancelFlag>();
        require_send::<EngineError>();
        require_sync::<EngineError>();

        require_send::<rng::RngHierarchy>();
        require_sync::<rng::RngHierarchy>();
    }

    /// Architecture contract: providers see bars and the timeframe, never
    /// capital or open trades.
    #[test]
    fn provider_trait_has_no_portfolio_parameter() {
        fn _check_trait_object_builds(
            provider: &dyn SignalProvider,
            bars: &[domain::MarketBar],
        ) -> Result<Vec<signals::ProviderSignal>, signals::ProviderError> {
            provider.evaluate(bars, Timeframe::D1)
        }
    }
}
