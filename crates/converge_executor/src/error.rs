//! Run-level errors.

use converge_core::ConfigError;
use converge_graph::GraphError;
use converge_plan::PlanError;
use converge_state::StateError;

/// Errors that stop a reconcile run before or around applying.
///
/// Failures of individual operations are not errors: they are reported in
/// the [`RunReport`](crate::RunReport).
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Planning failed; nothing was applied.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// The engine configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The state store could not be opened or read.
    #[error(transparent)]
    State(#[from] StateError),

    /// Recording results on the graph failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
}
