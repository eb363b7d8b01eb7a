//! Graph structure, edge materialization and dependency-ordered traversal.
//!
//! Building a graph is two-pass: declare every node first, then call
//! [`ResourceGraph::add_reference_edges`] to turn explicit `depends_on`
//! lists and `${...}` references into edges. Declaration order therefore
//! never matters for forward references.

use std::collections::VecDeque;

use hashbrown::{HashMap, HashSet};

use crate::attributes::Attributes;
use crate::edge::{Edge, EdgeKind};
use crate::error::{CycleError, GraphError};
use crate::reference::Reference;
use crate::resource::{ResourceId, ResourceNode};

/// A set of declared resources and the dependency edges between them.
///
/// Nodes keep their insertion order, which is the tie-break for traversal
/// so identical input always yields identical plans.
///
/// # Example
///
/// ```
/// use converge_graph::{Attributes, ResourceGraph, ResourceId};
///
/// let mut graph = ResourceGraph::new();
/// let role = graph.add_node("role", "eks", Attributes::new(), [])?;
/// let cluster = graph.add_node("cluster", "main", Attributes::new(), [role.clone()])?;
/// graph.add_reference_edges()?;
///
/// assert_eq!(graph.dependencies(&cluster).collect::<Vec<_>>(), [&role]);
/// assert_eq!(graph.dependents(&role).collect::<Vec<_>>(), [&cluster]);
/// # Ok::<(), converge_graph::GraphError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    /// Nodes in insertion order.
    nodes: Vec<ResourceNode>,
    /// Identity to position in `nodes`.
    index: HashMap<ResourceId, usize>,
    /// Materialized edges, grouped by dependent in insertion order.
    edges: Vec<Edge>,
    /// Per node: positions of the nodes it depends on (sorted, unique).
    dependencies: Vec<Vec<usize>>,
    /// Per node: positions of the nodes that depend on it (sorted, unique).
    dependents: Vec<Vec<usize>>,
    /// Set when nodes were added after the last edge materialization.
    unlinked: bool,
}

impl ResourceGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates over resources in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.iter()
    }

    /// Returns the materialized edges.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Returns true if the resource is declared.
    #[must_use]
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index.contains_key(id)
    }

    /// Gets a resource by identity.
    #[must_use]
    pub fn get(&self, id: &ResourceId) -> Option<&ResourceNode> {
        self.index.get(id).map(|&pos| &self.nodes[pos])
    }

    /// Iterates over the direct dependencies of a resource.
    ///
    /// Empty for unknown resources or before edges are materialized.
    pub fn dependencies<'a>(&'a self, id: &ResourceId) -> impl Iterator<Item = &'a ResourceId> + use<'a> {
        self.neighbours(id, &self.dependencies)
    }

    /// Iterates over the resources that directly depend on a resource.
    pub fn dependents<'a>(&'a self, id: &ResourceId) -> impl Iterator<Item = &'a ResourceId> + use<'a> {
        self.neighbours(id, &self.dependents)
    }

    fn neighbours<'a>(
        &'a self,
        id: &ResourceId,
        adjacency: &'a [Vec<usize>],
    ) -> impl Iterator<Item = &'a ResourceId> + use<'a> {
        let positions = self
            .index
            .get(id)
            .and_then(|&pos| adjacency.get(pos))
            .map(Vec::as_slice)
            .unwrap_or_default();
        positions.iter().map(|&pos| self.nodes[pos].id())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder API
    // ─────────────────────────────────────────────────────────────────────────

    /// Declares a resource.
    ///
    /// Explicit dependencies may name resources that are declared later;
    /// they are checked when edges are materialized.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidResourceId`] for a malformed identity
    /// and [`GraphError::DuplicateResource`] if it is already declared.
    pub fn add_node(
        &mut self,
        kind: impl Into<String>,
        name: impl Into<String>,
        desired: Attributes,
        explicit_deps: impl IntoIterator<Item = ResourceId>,
    ) -> Result<ResourceId, GraphError> {
        let id = ResourceId::new(kind, name)?;
        self.add_resource(ResourceNode::new(id, desired).with_depends_on(explicit_deps))
    }

    /// Declares a fully built resource node.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateResource`] if it is already declared.
    pub fn add_resource(&mut self, node: ResourceNode) -> Result<ResourceId, GraphError> {
        let id = node.id().clone();
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateResource(id));
        }
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(node);
        self.dependencies.push(Vec::new());
        self.dependents.push(Vec::new());
        self.unlinked = true;
        Ok(id)
    }

    /// Materializes edges from explicit dependencies and attribute references.
    ///
    /// Scans every node's desired attributes for `${kind.name.attribute}`
    /// tokens. Rebuilds the full edge set, so calling it again after adding
    /// more nodes is safe. Returns the number of edges.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownDependency`] if a dependency or
    /// reference names an undeclared resource.
    pub fn add_reference_edges(&mut self) -> Result<usize, GraphError> {
        let mut edges = Vec::new();
        let mut seen: HashSet<(usize, usize, EdgeKind)> = HashSet::new();
        let mut dependencies = vec![Vec::new(); self.nodes.len()];
        let mut dependents = vec![Vec::new(); self.nodes.len()];

        for (pos, node) in self.nodes.iter().enumerate() {
            let explicit = node
                .depends_on()
                .iter()
                .map(|dep| (dep.clone(), EdgeKind::Explicit));
            let referenced = Reference::parse_attributes(node.desired())
                .into_iter()
                .map(|(attribute, reference)| (reference.target, EdgeKind::Reference { attribute }));

            for (dependency, kind) in explicit.chain(referenced) {
                let &dep_pos =
                    self.index
                        .get(&dependency)
                        .ok_or_else(|| GraphError::UnknownDependency {
                            resource: node.id().clone(),
                            dependency: dependency.clone(),
                        })?;
                if !seen.insert((pos, dep_pos, kind.clone())) {
                    continue;
                }
                edges.push(Edge {
                    dependent: node.id().clone(),
                    dependency,
                    kind,
                });
                dependencies[pos].push(dep_pos);
                dependents[dep_pos].push(pos);
            }
        }

        for list in dependencies.iter_mut().chain(dependents.iter_mut()) {
            list.sort_unstable();
            list.dedup();
        }

        tracing::debug!(
            resources = self.nodes.len(),
            edges = edges.len(),
            "materialized dependency edges"
        );

        self.edges = edges;
        self.dependencies = dependencies;
        self.dependents = dependents;
        self.unlinked = false;
        Ok(self.edges.len())
    }

    /// Records the attributes observed for a resource after an apply.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NotFound`] if the resource is not declared.
    pub fn set_current(
        &mut self,
        id: &ResourceId,
        current: Option<Attributes>,
    ) -> Result<(), GraphError> {
        let &pos = self
            .index
            .get(id)
            .ok_or_else(|| GraphError::NotFound(id.clone()))?;
        self.nodes[pos].set_current(current);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Traversal
    // ─────────────────────────────────────────────────────────────────────────

    /// Checks that every edge is materialized and the graph is acyclic.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NotLinked`] or [`GraphError::Cycle`].
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.unlinked {
            return Err(GraphError::NotLinked);
        }
        match self.find_cycle() {
            Some(nodes) => Err(CycleError { nodes }.into()),
            None => Ok(()),
        }
    }

    /// Returns a lazy dependencies-first traversal.
    ///
    /// Every node is yielded after all nodes it depends on. Nodes are
    /// emitted in layers of equal depth (length of their longest dependency
    /// chain), and by insertion order within a layer.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Cycle`] naming the participating nodes if no
    /// such order exists, or [`GraphError::NotLinked`] if edges are stale.
    pub fn topological_order(&self) -> Result<TopologicalOrder<'_>, GraphError> {
        self.validate()?;

        let pending: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let layer = pending
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(pos, _)| pos)
            .collect();

        Ok(TopologicalOrder {
            graph: self,
            pending,
            layer,
            next_layer: Vec::new(),
            depth: 0,
            remaining: self.nodes.len(),
        })
    }

    /// Finds one cycle, returned in dependency order.
    fn find_cycle(&self) -> Option<Vec<ResourceId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.nodes.len()];

        for start in 0..self.nodes.len() {
            if marks[start] != Mark::Unvisited {
                continue;
            }
            // (node, next dependency to visit)
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            marks[start] = Mark::InProgress;

            while let Some(top) = stack.last_mut() {
                let node = top.0;
                let Some(&next) = self.dependencies[node].get(top.1) else {
                    marks[node] = Mark::Done;
                    stack.pop();
                    continue;
                };
                top.1 += 1;

                match marks[next] {
                    Mark::Unvisited => {
                        marks[next] = Mark::InProgress;
                        stack.push((next, 0));
                    }
                    Mark::InProgress => {
                        let begin = stack
                            .iter()
                            .position(|(pos, _)| *pos == next)
                            .unwrap_or_default();
                        return Some(
                            stack[begin..]
                                .iter()
                                .map(|(pos, _)| self.nodes[*pos].id().clone())
                                .collect(),
                        );
                    }
                    Mark::Done => {}
                }
            }
        }
        None
    }
}

/// Lazy dependencies-first traversal of a [`ResourceGraph`].
///
/// Created by [`ResourceGraph::topological_order`].
#[derive(Debug)]
pub struct TopologicalOrder<'g> {
    graph: &'g ResourceGraph,
    /// Unmet dependency count per node.
    pending: Vec<usize>,
    /// Nodes of the current depth not yet yielded.
    layer: VecDeque<usize>,
    /// Nodes whose last dependency was yielded in the current layer.
    next_layer: Vec<usize>,
    depth: usize,
    remaining: usize,
}

impl TopologicalOrder<'_> {
    /// Depth of the layer currently being yielded (roots are depth 0).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl<'g> Iterator for TopologicalOrder<'g> {
    type Item = &'g ResourceNode;

    fn next(&mut self) -> Option<Self::Item> {
        if self.layer.is_empty() {
            if self.next_layer.is_empty() {
                return None;
            }
            self.next_layer.sort_unstable();
            self.layer.extend(self.next_layer.drain(..));
            self.depth += 1;
        }

        let pos = self.layer.pop_front()?;
        for &dependent in &self.graph.dependents[pos] {
            self.pending[dependent] -= 1;
            if self.pending[dependent] == 0 {
                self.next_layer.push(dependent);
            }
        }
        self.remaining -= 1;
        Some(&self.graph.nodes[pos])
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for TopologicalOrder<'_> {}
