//! Resource graph primitives for converge.
//!
//! `converge_graph` holds the declared desired state: which resources exist,
//! what attributes they should have, and which resources each one depends
//! on. Everything downstream (planning, applying) walks the graph in the
//! order produced here.
//!
//! # Core Concepts
//!
//! - [`ResourceId`] - Identity of a resource (`kind` + logical `name`)
//! - [`ResourceNode`] - A declared resource with its desired attributes
//! - [`Reference`] - `${kind.name.attribute}` tokens inside attribute values
//! - [`ResourceGraph`] - Nodes plus explicit and reference-derived edges
//! - [`TopologicalOrder`] - Lazy dependencies-first traversal
//! - [`Manifest`] - JSON configuration input that builds a graph
//!
//! # Example
//!
//! ```
//! use converge_graph::{Attributes, ResourceGraph};
//! use serde_json::json;
//!
//! let mut graph = ResourceGraph::new();
//! graph.add_node("role", "eks", Attributes::new(), [])?;
//! graph.add_node(
//!     "cluster",
//!     "main",
//!     Attributes::from([("role_arn".to_string(), json!("${role.eks.arn}"))]),
//!     [],
//! )?;
//! graph.add_reference_edges()?;
//!
//! let order: Vec<String> = graph
//!     .topological_order()?
//!     .map(|node| node.id().to_string())
//!     .collect();
//! assert_eq!(order, ["role.eks", "cluster.main"]);
//! # Ok::<(), converge_graph::GraphError>(())
//! ```

/// Attribute maps and diffs.
pub mod attributes;

/// Edges between resources.
pub mod edge;

/// Graph error types.
pub mod error;

/// Graph structure, linking and traversal.
pub mod graph;

/// JSON manifest input.
pub mod manifest;

/// Attribute reference tokens.
pub mod reference;

/// Resource identities and nodes.
pub mod resource;

pub use attributes::{AttributeChange, AttributeDiff, Attributes};
pub use edge::{Edge, EdgeKind};
pub use error::{CycleError, GraphError};
pub use graph::{ResourceGraph, TopologicalOrder};
pub use manifest::{Manifest, ResourceDecl};
pub use reference::Reference;
pub use resource::{Lifecycle, ResourceId, ResourceNode};
