//! The [`Provider`] trait implemented once per resource kind.

use core::fmt;

use async_trait::async_trait;
use converge_graph::{AttributeDiff, Attributes};
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Identifier assigned by a provider when a resource is created.
///
/// Stable across in-place updates; only a replacement produces a new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    /// Wraps a provider-assigned identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    /// Identifier for all later calls.
    pub id: ProviderId,
    /// Attributes as the provider reports them, including computed outputs.
    pub attributes: Attributes,
}

/// Create, read, update and delete for one resource kind.
///
/// Attribute values passed in are fully resolved: the engine substitutes
/// `${...}` references before calling the provider.
///
/// Capability hooks ([`requires_replacement`](Self::requires_replacement),
/// [`create_before_destroy`](Self::create_before_destroy)) let each kind
/// express its lifecycle quirks without the planner special-casing kinds.
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    /// Creates a resource.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Transient`] or [`ProviderError::Permanent`].
    async fn create(&self, desired: &Attributes) -> Result<Created, ProviderError>;

    /// Reads the resource's actual attributes.
    ///
    /// # Errors
    ///
    /// [`ProviderError::NotFound`] if it was deleted out-of-band, otherwise
    /// [`ProviderError::Transient`] or [`ProviderError::Permanent`].
    async fn read(&self, id: &ProviderId) -> Result<Attributes, ProviderError>;

    /// Applies attribute changes in place and returns the new attributes.
    ///
    /// # Errors
    ///
    /// [`ProviderError::UnsupportedUpdate`] when a changed attribute needs a
    /// replacement, [`ProviderError::NotFound`] if the resource is gone.
    async fn update(
        &self,
        id: &ProviderId,
        diff: &AttributeDiff,
    ) -> Result<Attributes, ProviderError>;

    /// Deletes a resource. Deleting an absent resource succeeds.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Transient`] or [`ProviderError::Permanent`].
    async fn delete(&self, id: &ProviderId) -> Result<(), ProviderError>;

    /// Whether changing `attribute` requires destroying and recreating.
    fn requires_replacement(&self, attribute: &str) -> bool {
        let _ = attribute;
        false
    }

    /// Whether a replacement may create the new instance before deleting the
    /// old one. Kinds with unique names or exclusive bindings return false.
    fn create_before_destroy(&self) -> bool {
        true
    }
}
