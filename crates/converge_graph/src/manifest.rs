//! JSON manifest input.
//!
//! A manifest is the format-agnostic shape of a desired-state declaration:
//! a list of resources with their kind, name, attributes, explicit
//! dependencies and lifecycle policy.
//!
//! ```json
//! {
//!   "resources": [
//!     { "kind": "iam_role", "name": "eks", "attributes": { "name": "eks-cluster" } },
//!     {
//!       "kind": "eks_cluster",
//!       "name": "main",
//!       "attributes": { "role_arn": "${iam_role.eks.arn}" },
//!       "lifecycle": { "prevent_destroy": true }
//!     }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::attributes::Attributes;
use crate::error::GraphError;
use crate::graph::ResourceGraph;
use crate::resource::{Lifecycle, ResourceId, ResourceNode};

/// One declared resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDecl {
    /// Resource kind; selects the provider.
    pub kind: String,
    /// Logical name, unique per kind.
    pub name: String,
    /// Desired attributes, possibly holding `${...}` references.
    #[serde(default)]
    pub attributes: Attributes,
    /// Explicit dependencies as `kind.name` strings.
    #[serde(default)]
    pub depends_on: Vec<ResourceId>,
    /// Lifecycle policy.
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

/// A desired-state declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Declared resources, in declaration order.
    #[serde(default)]
    pub resources: Vec<ResourceDecl>,
}

impl Manifest {
    /// Parses a JSON manifest.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Manifest`] for malformed JSON, including
    /// malformed `depends_on` identities.
    pub fn from_json_str(json: &str) -> Result<Self, GraphError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Builds a linked graph: all nodes first, then every edge.
    ///
    /// # Errors
    ///
    /// Returns any error from [`ResourceGraph::add_resource`] or
    /// [`ResourceGraph::add_reference_edges`].
    pub fn into_graph(self) -> Result<ResourceGraph, GraphError> {
        let mut graph = ResourceGraph::new();
        for decl in self.resources {
            let id = ResourceId::new(decl.kind, decl.name)?;
            let node = ResourceNode::new(id, decl.attributes)
                .with_depends_on(decl.depends_on)
                .with_lifecycle(decl.lifecycle);
            graph.add_resource(node)?;
        }
        graph.add_reference_edges()?;
        Ok(graph)
    }
}
