//! Resource identities and declared nodes.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::attributes::Attributes;
use crate::error::GraphError;

/// Identity of a resource: its kind plus a logical name.
///
/// Rendered and parsed as `kind.name`. Neither part may be empty or contain
/// a `.`, which keeps `${kind.name.attribute}` references unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ResourceId {
    kind: String,
    name: String,
}

impl ResourceId {
    /// Creates an identity, validating both parts.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidResourceId`] if either part is empty or
    /// contains `.` or whitespace.
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Result<Self, GraphError> {
        let kind = kind.into();
        let name = name.into();
        if !valid_part(&kind) || !valid_part(&name) {
            return Err(GraphError::InvalidResourceId(format!("{kind}.{name}")));
        }
        Ok(Self { kind, name })
    }

    /// Returns the resource kind (selects the provider).
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the logical name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn valid_part(part: &str) -> bool {
    !part.is_empty() && !part.contains('.') && !part.chars().any(char::is_whitespace)
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

impl FromStr for ResourceId {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = s
            .split_once('.')
            .ok_or_else(|| GraphError::InvalidResourceId(s.to_string()))?;
        Self::new(kind, name)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ResourceId {
    type Error = GraphError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Per-resource lifecycle policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lifecycle {
    /// Refuse any plan that would delete or replace this resource.
    pub prevent_destroy: bool,
    /// Overrides the provider's default replacement ordering.
    ///
    /// `Some(true)` creates the replacement before deleting the old
    /// instance, `Some(false)` deletes first, `None` defers to the provider.
    pub create_before_destroy: Option<bool>,
}

/// A declared resource.
///
/// Owned by a [`ResourceGraph`](crate::ResourceGraph). The desired
/// attributes come from configuration; the current attributes are the last
/// values observed after an apply and are absent until the resource exists.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    id: ResourceId,
    desired: Attributes,
    depends_on: Vec<ResourceId>,
    lifecycle: Lifecycle,
    current: Option<Attributes>,
}

impl ResourceNode {
    /// Creates a node with no explicit dependencies and default lifecycle.
    #[must_use]
    pub fn new(id: ResourceId, desired: Attributes) -> Self {
        Self {
            id,
            desired,
            depends_on: Vec::new(),
            lifecycle: Lifecycle::default(),
            current: None,
        }
    }

    /// Adds explicit dependencies.
    #[must_use]
    pub fn with_depends_on(mut self, deps: impl IntoIterator<Item = ResourceId>) -> Self {
        for dep in deps {
            if !self.depends_on.contains(&dep) {
                self.depends_on.push(dep);
            }
        }
        self
    }

    /// Sets the lifecycle policy.
    #[must_use]
    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Returns the node's identity.
    #[must_use]
    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    /// Returns the resource kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.id.kind()
    }

    /// Returns the desired attributes (may contain references).
    #[must_use]
    pub fn desired(&self) -> &Attributes {
        &self.desired
    }

    /// Returns the explicitly declared dependencies.
    #[must_use]
    pub fn depends_on(&self) -> &[ResourceId] {
        &self.depends_on
    }

    /// Returns the lifecycle policy.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Returns the last applied attributes, if the resource exists.
    #[must_use]
    pub fn current(&self) -> Option<&Attributes> {
        self.current.as_ref()
    }

    pub(crate) fn set_current(&mut self, current: Option<Attributes>) {
        self.current = current;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        let id: ResourceId = "aws_eks_cluster.main".parse().unwrap();
        assert_eq!(id.kind(), "aws_eks_cluster");
        assert_eq!(id.name(), "main");
        assert_eq!(id.to_string(), "aws_eks_cluster.main");
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!("no_dot".parse::<ResourceId>().is_err());
        assert!(".name".parse::<ResourceId>().is_err());
        assert!("kind.".parse::<ResourceId>().is_err());
        assert!("kind.a.b".parse::<ResourceId>().is_err());
        assert!(ResourceId::new("kind", "has space").is_err());
    }

    #[test]
    fn serializes_as_string() {
        let id = ResourceId::new("role", "eks").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"role.eks\"");
        let back: ResourceId = serde_json::from_str("\"role.eks\"").unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<ResourceId>("\"role\"").is_err());
    }

    #[test]
    fn depends_on_deduplicates() {
        let dep = ResourceId::new("role", "eks").unwrap();
        let node = ResourceNode::new(ResourceId::new("cluster", "main").unwrap(), Attributes::new())
            .with_depends_on([dep.clone(), dep.clone()]);
        assert_eq!(node.depends_on(), &[dep]);
    }

    #[test]
    fn ids_order_by_kind_then_name() {
        let a = ResourceId::new("a", "z").unwrap();
        let b = ResourceId::new("b", "a").unwrap();
        assert!(a < b);
    }
}
