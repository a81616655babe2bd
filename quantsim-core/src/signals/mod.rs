//! Signal generation and aggregation.
//!
//! Providers are portfolio-agnostic: they see a trailing bar window and
//! nothing else. The aggregator turns their raw output into normalized,
//! filtered [`Signal`](crate::domain::Signal)s.

pub mod aggregator;
pub mod builtin;
pub mod provider;
pub mod registry;

pub use aggregator::{
    check_thresholds, evaluation_window, Aggregation, AggregationStats, Rejection,
    SignalAggregator,
};
pub use builtin::{BreakoutProvider, MaCrossProvider};
pub use provider::{ProviderError, ProviderSignal, SignalProvider};
pub use registry::{RegistryError, SignalProviderRegistry};
