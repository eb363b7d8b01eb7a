//! Executor and reconciler for converge.
//!
//! The [`Executor`] applies a [`Plan`](converge_plan::Plan): operations whose
//! dependencies have succeeded run concurrently up to a limit, transient
//! provider errors are retried with capped exponential backoff, and a failure
//! skips only the operations that depend on it. Every outcome, including
//! skips, lands in the [`RunReport`].
//!
//! The [`Reconciler`] wires planner, executor and state store together and
//! runs the full plan → apply cycle, re-planning once when an apply reveals a
//! needed replacement or drift.
//!
//! # Example
//!
//! ```no_run
//! # async fn run(providers: converge_provider::ProviderRegistry, mut graph: converge_graph::ResourceGraph) -> Result<(), converge_executor::ReconcileError> {
//! use std::sync::Arc;
//! use converge_core::EngineConfig;
//! use converge_executor::Reconciler;
//! use converge_state::MemoryStateStore;
//! use tokio_util::sync::CancellationToken;
//!
//! let reconciler = Reconciler::new(providers, Arc::new(MemoryStateStore::new()), EngineConfig::default());
//! let report = reconciler.reconcile(&mut graph, &CancellationToken::new()).await?;
//! println!("{report}");
//! std::process::exit(if report.succeeded() { 0 } else { 1 });
//! # }
//! ```

mod error;
mod executor;
mod reconciler;
mod report;
mod retry;

pub use error::ReconcileError;
pub use executor::Executor;
pub use reconciler::Reconciler;
pub use report::{FailureKind, OperationOutcome, OperationStatus, RunReport};
pub use retry::RetryPolicy;

pub use tokio_util::sync::CancellationToken;
