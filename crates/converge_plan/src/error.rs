//! Error types for planning.

use converge_graph::{GraphError, ResourceId};
use converge_provider::ProviderError;
use converge_state::StateError;

/// Errors that prevent a plan from being produced.
///
/// All of these are raised before any create, update or delete reaches a
/// provider.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// The graph is invalid: unlinked, cyclic, or unresolvable.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// No provider is registered for a resource's kind.
    #[error("no provider registered for kind '{kind}' (needed by {resource})")]
    UnknownKind {
        /// First resource found with the kind.
        resource: ResourceId,
        /// The missing kind.
        kind: String,
    },

    /// The plan would destroy a resource marked `prevent_destroy`.
    #[error("plan would destroy {0}, which has prevent_destroy set")]
    PreventDestroy(ResourceId),

    /// Refreshing a record from its provider failed.
    #[error("failed to refresh {resource}: {source}")]
    Refresh {
        /// Resource being refreshed.
        resource: ResourceId,
        /// Provider failure.
        #[source]
        source: ProviderError,
    },

    /// Reading or writing the state store failed.
    #[error(transparent)]
    State(#[from] StateError),
}
