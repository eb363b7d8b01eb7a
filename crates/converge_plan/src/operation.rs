//! Planned operations.

use core::fmt;

use converge_graph::{AttributeDiff, Attributes, ResourceId};
use converge_provider::ProviderId;
use serde::Serialize;

/// Position of an operation in its [`Plan`](crate::Plan).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct OperationId(pub(crate) usize);

impl OperationId {
    /// Index into [`Plan::operations`](crate::Plan::operations).
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What an operation does to its resource, as reported to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Create a resource that has no record.
    Create,
    /// Change attributes in place.
    Update,
    /// One step of destroying and recreating.
    Replace,
    /// Destroy a resource (or leftover instance) no longer wanted.
    Delete,
    /// Nothing to do.
    NoOp,
}

impl OperationKind {
    /// One-column marker used when listing a plan.
    #[must_use]
    pub fn marker(self) -> &'static str {
        match self {
            Self::Create => "+",
            Self::Update => "~",
            Self::Replace => "-/+",
            Self::Delete => "-",
            Self::NoOp => " ",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::NoOp => "no-op",
        })
    }
}

/// The provider call an operation makes.
///
/// Desired attributes are carried unresolved. References are resolved by the
/// executor immediately before the call, once referenced resources exist.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Create a new instance and record it.
    Create {
        /// Desired attributes.
        desired: Attributes,
    },
    /// Update the recorded instance in place.
    Update {
        /// Instance to update.
        provider_id: ProviderId,
        /// Desired attributes.
        desired: Attributes,
    },
    /// Create the new instance of a create-before-destroy replacement. The
    /// old instance is recorded as deposed until it is deleted.
    CreateReplacement {
        /// Instance being replaced.
        replaces: ProviderId,
        /// Desired attributes.
        desired: Attributes,
    },
    /// Delete the recorded instance and drop its record.
    Delete {
        /// Instance to delete.
        provider_id: ProviderId,
    },
    /// Delete a deposed instance and clear it from the record.
    DestroyDeposed {
        /// Deposed instance.
        provider_id: ProviderId,
    },
    /// No provider call.
    None,
}

/// One planned step against one resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    pub(crate) id: OperationId,
    pub(crate) resource: ResourceId,
    pub(crate) kind: OperationKind,
    pub(crate) action: Action,
    pub(crate) diff: AttributeDiff,
    pub(crate) depends_on: Vec<OperationId>,
    pub(crate) dependencies: Vec<ResourceId>,
}

impl Operation {
    /// Position in the plan.
    #[must_use]
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Target resource.
    #[must_use]
    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    /// User-facing classification.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Provider call to make.
    #[must_use]
    pub fn action(&self) -> &Action {
        &self.action
    }

    /// Attribute changes that motivated the operation. Empty for creates,
    /// deletes and no-ops.
    #[must_use]
    pub fn diff(&self) -> &AttributeDiff {
        &self.diff
    }

    /// Operations that must finish successfully before this one starts.
    #[must_use]
    pub fn depends_on(&self) -> &[OperationId] {
        &self.depends_on
    }

    /// Resources the target depends on, as recorded after it is applied.
    #[must_use]
    pub fn dependencies(&self) -> &[ResourceId] {
        &self.dependencies
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>3} {}", self.kind.marker(), self.resource)?;
        match &self.action {
            Action::CreateReplacement { replaces, .. } => {
                write!(f, " (create replacement for {replaces})")?;
            }
            Action::DestroyDeposed { provider_id } => write!(f, " (destroy {provider_id})")?,
            Action::Delete { provider_id } if self.kind == OperationKind::Replace => {
                write!(f, " (destroy {provider_id} first)")?;
            }
            _ => {}
        }
        if !self.diff.is_empty() {
            let names: Vec<&str> = self.diff.names().collect();
            write!(f, " [{}]", names.join(", "))?;
        }
        Ok(())
    }
}
