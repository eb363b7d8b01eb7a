//! Provider registry keyed by resource kind.

use std::collections::HashMap;
use std::sync::Arc;

use crate::provider::Provider;

/// Maps resource kinds to the [`Provider`] that manages them.
///
/// Registration happens once, before planning. The planner rejects a graph
/// whose kinds are not all registered before it makes any provider call.
///
/// ```
/// # use std::sync::Arc;
/// # use async_trait::async_trait;
/// # use converge_graph::{AttributeDiff, Attributes};
/// # use converge_provider::{Created, Provider, ProviderError, ProviderId, ProviderRegistry};
/// # struct Buckets;
/// # #[async_trait]
/// # impl Provider for Buckets {
/// #     async fn create(&self, _: &Attributes) -> Result<Created, ProviderError> { unimplemented!() }
/// #     async fn read(&self, _: &ProviderId) -> Result<Attributes, ProviderError> { unimplemented!() }
/// #     async fn update(&self, _: &ProviderId, _: &AttributeDiff) -> Result<Attributes, ProviderError> { unimplemented!() }
/// #     async fn delete(&self, _: &ProviderId) -> Result<(), ProviderError> { unimplemented!() }
/// # }
/// let mut registry = ProviderRegistry::new();
/// registry.register("bucket", Arc::new(Buckets));
///
/// assert!(registry.has("bucket"));
/// assert!(registry.get("queue").is_none());
/// ```
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl core::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Registers the provider for `kind`.
    ///
    /// # Panics
    ///
    /// Panics if a provider for the same kind is already registered.
    pub fn register<P: Provider>(&mut self, kind: impl Into<String>, provider: Arc<P>) {
        let kind = kind.into();
        assert!(
            !self.providers.contains_key(&kind),
            "provider for kind '{kind}' is already registered"
        );
        tracing::debug!(kind = %kind, "provider registered");
        self.providers.insert(kind, provider as Arc<dyn Provider>);
    }

    /// Builder form of [`register`](Self::register).
    ///
    /// # Panics
    ///
    /// Panics if a provider for the same kind is already registered.
    #[must_use]
    pub fn with<P: Provider>(mut self, kind: impl Into<String>, provider: Arc<P>) -> Self {
        self.register(kind, provider);
        self
    }

    /// Returns the provider for `kind`.
    #[must_use]
    pub fn get(&self, kind: impl AsRef<str>) -> Option<Arc<dyn Provider>> {
        self.providers.get(kind.as_ref()).cloned()
    }

    /// Checks if a provider is registered for `kind`.
    #[must_use]
    pub fn has(&self, kind: impl AsRef<str>) -> bool {
        self.providers.contains_key(kind.as_ref())
    }

    /// Lists registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
