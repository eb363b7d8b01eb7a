//! An embeddable reconciler for declarative resource graphs.
//!
//! Resources are declared with their desired attributes and the references
//! between them. Converge diffs that declaration against recorded state,
//! plans an ordered set of creates, updates, replacements and deletes, and
//! applies it through pluggable providers with bounded parallelism.

pub use converge_internal::*;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use converge_internal::prelude::*;
}
