//! Per-operation outcomes of a run.

use core::fmt;
use std::collections::BTreeSet;

use converge_graph::ResourceId;
use converge_plan::{OperationId, OperationKind};
use serde::Serialize;

/// Terminal state of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// The provider call succeeded and the state store was updated.
    Applied,
    /// The operation failed; see [`OperationOutcome::failure`].
    Failed,
    /// Not attempted because a dependency failed or the run was cancelled.
    Skipped,
    /// Nothing needed doing.
    NoOp,
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Applied => "applied",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::NoOp => "no-op",
        })
    }
}

/// Why an operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The provider returned a permanent error.
    Provider,
    /// Transient errors persisted through every retry.
    RetriesExhausted,
    /// The resource was gone when updated; its record has been dropped so
    /// the next plan creates it.
    Drift,
    /// The provider cannot change an attribute in place; the resource must
    /// be replaced.
    ReplacementRequired,
    /// A `${...}` reference had no value at apply time.
    Unresolved,
    /// The state store rejected a write.
    State,
}

/// Result of one planned operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationOutcome {
    /// Operation within its plan.
    pub operation: OperationId,
    /// Target resource.
    pub resource: ResourceId,
    /// Kind of change attempted.
    pub kind: OperationKind,
    /// Terminal state.
    pub status: OperationStatus,
    /// Provider calls made, retries included.
    pub attempts: u32,
    /// Failure classification, set only for failed operations.
    pub failure: Option<FailureKind>,
    /// Error message or skip reason.
    pub detail: Option<String>,
}

impl fmt::Display for OperationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.resource, self.kind, self.status)?;
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

/// Every operation's outcome, in plan order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    outcomes: Vec<OperationOutcome>,
    cancelled: bool,
}

impl RunReport {
    pub(crate) fn new(outcomes: Vec<OperationOutcome>, cancelled: bool) -> Self {
        Self {
            outcomes,
            cancelled,
        }
    }

    /// Outcomes in plan order.
    #[must_use]
    pub fn outcomes(&self) -> &[OperationOutcome] {
        &self.outcomes
    }

    /// Outcomes for one resource.
    pub fn for_resource<'a>(
        &'a self,
        resource: &ResourceId,
    ) -> impl Iterator<Item = &'a OperationOutcome> + use<'a> {
        let resource = resource.clone();
        self.outcomes
            .iter()
            .filter(move |outcome| outcome.resource == resource)
    }

    /// Failed outcomes.
    pub fn failures(&self) -> impl Iterator<Item = &OperationOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == OperationStatus::Failed)
    }

    /// Number of outcomes with `status`.
    #[must_use]
    pub fn count(&self, status: OperationStatus) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == status)
            .count()
    }

    /// Whether dispatch stopped early because the run was cancelled.
    #[must_use]
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    /// True if no operation failed. Cancellation alone is not a failure.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Folds a follow-up pass into this report.
    ///
    /// A resource takes its follow-up outcomes if the follow-up acted on it
    /// or if it did not finish cleanly in this pass. All others keep their
    /// first-pass outcomes. Follow-up outcomes take the place of the
    /// resource's first outcome in this pass, so the report keeps the
    /// first pass's order.
    #[must_use]
    pub fn merge(self, follow_up: RunReport) -> RunReport {
        let unsettled = |outcome: &OperationOutcome| {
            matches!(outcome.status, OperationStatus::Failed | OperationStatus::Skipped)
        };
        let in_follow_up = |resource: &ResourceId| {
            follow_up
                .outcomes
                .iter()
                .any(|outcome| &outcome.resource == resource)
        };
        let follow_ups_of = |resource: &ResourceId| {
            follow_up
                .outcomes
                .iter()
                .filter(|outcome| &outcome.resource == resource)
                .cloned()
                .collect::<Vec<_>>()
        };

        let mut superseded: BTreeSet<ResourceId> = follow_up
            .outcomes
            .iter()
            .filter(|outcome| outcome.status != OperationStatus::NoOp)
            .map(|outcome| outcome.resource.clone())
            .collect();
        superseded.extend(
            self.outcomes
                .iter()
                .filter(|outcome| unsettled(outcome) && in_follow_up(&outcome.resource))
                .map(|outcome| outcome.resource.clone()),
        );

        let mut placed: BTreeSet<ResourceId> = BTreeSet::new();
        let mut outcomes: Vec<OperationOutcome> = Vec::with_capacity(self.outcomes.len());
        for outcome in self.outcomes {
            if !superseded.contains(&outcome.resource) {
                outcomes.push(outcome);
            } else if placed.insert(outcome.resource.clone()) {
                outcomes.extend(follow_ups_of(&outcome.resource));
            }
        }
        // Resources the first pass never reached.
        for outcome in &follow_up.outcomes {
            if superseded.contains(&outcome.resource) && !placed.contains(&outcome.resource) {
                outcomes.push(outcome.clone());
            }
        }

        RunReport {
            outcomes,
            cancelled: self.cancelled || follow_up.cancelled,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            writeln!(f, "{outcome}")?;
        }
        write!(
            f,
            "Apply: {} applied, {} failed, {} skipped, {} unchanged",
            self.count(OperationStatus::Applied),
            self.count(OperationStatus::Failed),
            self.count(OperationStatus::Skipped),
            self.count(OperationStatus::NoOp),
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        write!(f, ".")
    }
}
