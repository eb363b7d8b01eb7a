//! # Converge Internal Library
//!
//! Re-exports the core converge crates for convenience.

/// Configuration, clocks and tracing setup.
pub use converge_core;

/// Resource identities, attributes and the dependency graph.
pub use converge_graph;

/// The provider contract and registry.
pub use converge_provider;

/// Persisted resource state.
pub use converge_state;

/// Diffing desired state against recorded state.
pub use converge_plan;

/// Applying plans and the reconcile loop.
pub use converge_executor;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use converge_core::{Clock, EngineConfig, SystemClock, TracingSetup};
    pub use converge_executor::{CancellationToken, Executor, ReconcileError, Reconciler, RunReport};
    pub use converge_graph::{Attributes, Manifest, ResourceGraph, ResourceId, ResourceNode};
    pub use converge_plan::{Plan, PlanOptions, Planner, RefreshMode};
    pub use converge_provider::{Created, Provider, ProviderError, ProviderId, ProviderRegistry};
    pub use converge_state::{FileStateStore, MemoryStateStore, StateRecord, StateStore};
}
