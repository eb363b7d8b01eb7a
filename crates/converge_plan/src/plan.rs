//! The planner's output.

use core::fmt;

use converge_graph::ResourceId;
use serde::Serialize;

use crate::operation::{Operation, OperationId, OperationKind};

/// Dependency-ordered operations that move recorded state to desired state.
///
/// Every operation appears after all operations it depends on. Operations
/// with no path between them may run in any order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Plan {
    operations: Vec<Operation>,
}

impl Plan {
    pub(crate) fn new(operations: Vec<Operation>) -> Self {
        debug_assert!(
            operations
                .iter()
                .enumerate()
                .all(|(i, op)| op.id.0 == i && op.depends_on.iter().all(|dep| dep.0 < i))
        );
        Self { operations }
    }

    /// Operations in execution order.
    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Looks up an operation.
    #[must_use]
    pub fn get(&self, id: OperationId) -> Option<&Operation> {
        self.operations.get(id.0)
    }

    /// Operations targeting one resource.
    pub fn for_resource<'a>(
        &'a self,
        resource: &ResourceId,
    ) -> impl Iterator<Item = &'a Operation> + use<'a> {
        let resource = resource.clone();
        self.operations
            .iter()
            .filter(move |op| op.resource() == &resource)
    }

    /// Number of operations, including no-ops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if the plan has no operations at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns true if applying the plan would change nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.operations
            .iter()
            .all(|op| op.kind() == OperationKind::NoOp)
    }

    /// Counts resources per kind of change.
    ///
    /// A replacement counts once per resource however many steps it has.
    #[must_use]
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        let mut replaced: Vec<&ResourceId> = Vec::new();
        for op in &self.operations {
            match op.kind() {
                OperationKind::Create => summary.create += 1,
                OperationKind::Update => summary.update += 1,
                OperationKind::Delete => summary.delete += 1,
                OperationKind::NoOp => summary.noop += 1,
                OperationKind::Replace => {
                    if !replaced.contains(&op.resource()) {
                        replaced.push(op.resource());
                        summary.replace += 1;
                    }
                }
            }
        }
        summary
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for op in &self.operations {
            writeln!(f, "{op}")?;
        }
        write!(f, "{}", self.summary())
    }
}

/// Change counts for a [`Plan`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    /// Resources to create.
    pub create: usize,
    /// Resources to update in place.
    pub update: usize,
    /// Resources to replace.
    pub replace: usize,
    /// Deletions, including leftover deposed instances.
    pub delete: usize,
    /// Resources already up to date.
    pub noop: usize,
}

impl PlanSummary {
    /// Returns true if nothing would change.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.create + self.update + self.replace + self.delete == 0
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Plan: {} to create, {} to update, {} to replace, {} to delete, {} unchanged.",
            self.create, self.update, self.replace, self.delete, self.noop
        )
    }
}
