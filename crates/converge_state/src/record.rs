//! The persisted per-resource record.

use std::time::SystemTime;

use converge_graph::{Attributes, ResourceId};
use converge_provider::ProviderId;
use serde::{Deserialize, Serialize};

/// Last-known real-world state of one resource.
///
/// `provider_id` is assigned by the first successful create and stays fixed
/// across updates. Only a replacement writes a new one, in the same save that
/// records the new attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Resource identity.
    pub id: ResourceId,
    /// Identifier assigned by the provider.
    pub provider_id: ProviderId,
    /// Attributes as last reported by the provider.
    pub attributes: Attributes,
    /// Resources this one depended on when it was last applied.
    #[serde(default)]
    pub dependencies: Vec<ResourceId>,
    /// Earlier instances superseded by a create-before-destroy replacement
    /// and not yet deleted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deposed: Vec<ProviderId>,
    /// When `attributes` were last confirmed against the provider.
    pub refreshed_at: SystemTime,
}

impl StateRecord {
    /// Creates a record with no dependencies and no deposed instances.
    #[must_use]
    pub fn new(
        id: ResourceId,
        provider_id: ProviderId,
        attributes: Attributes,
        refreshed_at: SystemTime,
    ) -> Self {
        Self {
            id,
            provider_id,
            attributes,
            dependencies: Vec::new(),
            deposed: Vec::new(),
            refreshed_at,
        }
    }

    /// Sets the recorded dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = ResourceId>) -> Self {
        self.dependencies = dependencies.into_iter().collect();
        self
    }

    /// Sets the deposed instances.
    #[must_use]
    pub fn with_deposed(mut self, deposed: impl IntoIterator<Item = ProviderId>) -> Self {
        self.deposed = deposed.into_iter().collect();
        self
    }

    /// Resource kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.id.kind()
    }
}
