//! Error types for provider operations.

use crate::provider::ProviderId;

/// Errors a [`Provider`](crate::Provider) may return.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// A failure that may succeed if retried (throttling, timeouts).
    #[error("transient provider error: {0}")]
    Transient(String),

    /// A failure that will not go away on retry (validation, permissions).
    #[error("permanent provider error: {0}")]
    Permanent(String),

    /// The resource no longer exists; it was deleted out-of-band.
    #[error("resource {0} not found")]
    NotFound(ProviderId),

    /// The named attributes cannot be changed in place.
    #[error("in-place update not supported for: {}", .attributes.join(", "))]
    UnsupportedUpdate {
        /// Attributes that force a replacement.
        attributes: Vec<String>,
    },
}

impl ProviderError {
    /// Creates a [`Transient`](Self::Transient) error.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Creates a [`Permanent`](Self::Permanent) error.
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Returns true if retrying may help.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
