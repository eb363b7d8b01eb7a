//! Dependency edges between resources.

use core::fmt;

use crate::resource::ResourceId;

/// Why one resource depends on another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Declared in the resource's `depends_on` list.
    Explicit,
    /// Derived from a `${...}` reference in the named attribute.
    Reference {
        /// Attribute holding the reference.
        attribute: String,
    },
}

/// `dependent` must be created or updated after `dependency`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    /// The resource that waits.
    pub dependent: ResourceId,
    /// The resource that goes first.
    pub dependency: ResourceId,
    /// How the edge was discovered.
    pub kind: EdgeKind,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            EdgeKind::Explicit => write!(f, "{} -> {}", self.dependent, self.dependency),
            EdgeKind::Reference { attribute } => {
                write!(f, "{} -> {} (via {attribute})", self.dependent, self.dependency)
            }
        }
    }
}
