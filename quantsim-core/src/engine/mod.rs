//! Simulation engine: the bar-by-bar trade lifecycle.
//!
//! A run is an explicit [`SimulationState`] advanced by [`step`] once per
//! evaluable bar. Capital only changes when a trade closes.

pub mod lifecycle;
pub mod loop_runner;
pub mod state;

pub use lifecycle::{check_exit, Execution, ExitDecision};
pub use loop_runner::{run_simulation, step, StepContext};
pub use state::{CancelFlag, EngineError, MarginCall, RunResult, SimulationState};
