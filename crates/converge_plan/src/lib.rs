//! Planner for converge.
//!
//! The [`Planner`] compares a [`ResourceGraph`](converge_graph::ResourceGraph)
//! against the [`StateStore`](converge_state::StateStore), refreshing stale
//! records through their providers, and produces a [`Plan`]: a
//! dependency-ordered list of [`Operation`]s.
//!
//! # Decision Policy
//!
//! | Recorded state | Desired vs recorded | Operation |
//! |----------------|---------------------|-----------|
//! | none | - | Create |
//! | present | equal | NoOp |
//! | present | differ, all updatable in place | Update |
//! | present | any differing attribute forces replacement | Replace |
//! | present, resource no longer declared | - | Delete |
//!
//! A Replace expands into several operations: create the new instance, let
//! dependents move to it, then delete the old one. Kinds that cannot have two
//! instances at once delete first and create second.

mod error;
mod operation;
mod options;
mod plan;
mod planner;

pub use error::PlanError;
pub use operation::{Action, Operation, OperationId, OperationKind};
pub use options::{PlanOptions, RefreshMode};
pub use plan::{Plan, PlanSummary};
pub use planner::Planner;
