//! Duet is a minimal in-container supervisor. It starts an ordered list of
//! long-lived services (by default a dashboard and a web API sharing one
//! container), keeps the container alive while they run, forwards
//! termination signals with a bounded grace period, and exits non-zero if
//! any service dies unexpectedly so the orchestrator can react.

/// CLI interface.
pub mod cli;

/// Service manifest loading.
pub mod config;

/// Shared constants.
pub mod constants;

/// Error handling.
pub mod error;

/// Supervisor runtime.
pub mod supervisor;
