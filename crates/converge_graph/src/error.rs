//! Error types for graph construction and traversal.

use core::fmt;

use crate::resource::ResourceId;

/// The dependency edges contain a cycle.
///
/// `nodes` lists one concrete cycle in dependency order: each resource
/// depends on the next, and the last depends on the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError {
    /// Resources participating in the cycle.
    pub nodes: Vec<ResourceId>,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dependency cycle: ")?;
        for node in &self.nodes {
            write!(f, "{node} -> ")?;
        }
        match self.nodes.first() {
            Some(first) => write!(f, "{first}"),
            None => write!(f, "<empty>"),
        }
    }
}

impl core::error::Error for CycleError {}

/// Errors raised while building or traversing a [`ResourceGraph`](crate::ResourceGraph).
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A resource identity is malformed.
    #[error("invalid resource id '{0}': expected 'kind.name'")]
    InvalidResourceId(String),

    /// The same resource was declared twice.
    #[error("resource {0} is declared more than once")]
    DuplicateResource(ResourceId),

    /// A dependency or reference names a resource that is not declared.
    #[error("{resource} depends on undeclared resource {dependency}")]
    UnknownDependency {
        /// The declaring resource.
        resource: ResourceId,
        /// The missing dependency.
        dependency: ResourceId,
    },

    /// A resource was looked up but does not exist in the graph.
    #[error("resource {0} is not in the graph")]
    NotFound(ResourceId),

    /// Nodes were added after edges were last materialized.
    #[error("graph has unlinked resources; call add_reference_edges() before traversal")]
    NotLinked,

    /// The edges form a cycle.
    #[error(transparent)]
    Cycle(#[from] CycleError),

    /// A reference had no value to substitute.
    #[error("unresolved reference {0}")]
    UnresolvedReference(String),

    /// The manifest document could not be parsed.
    #[error("invalid manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}
