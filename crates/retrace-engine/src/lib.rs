pub mod actions;
pub mod backend;
pub mod config;
pub mod executor;
pub mod formatter;
pub mod heuristics;
pub mod progress;
pub mod resolution;
pub mod retry;
pub mod telemetry;

pub use retrace_common::execution;
pub use retrace_common::trace;
pub use executor::{EngineError, EnginePhase, WorkflowEngine};
