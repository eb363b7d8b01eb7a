//! Provider adapter interface and registry for converge.
//!
//! The engine never talks to a cloud API itself. Every resource kind is
//! backed by a [`Provider`] registered in a [`ProviderRegistry`] before a
//! run; the planner asks providers for capabilities and refreshed state, the
//! executor asks them to create, update and delete.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use converge_provider::ProviderRegistry;
//!
//! let mut registry = ProviderRegistry::new();
//! registry.register("iam_role", Arc::new(IamRoleProvider::new(client.clone())));
//! registry.register("eks_cluster", Arc::new(EksClusterProvider::new(client)));
//! ```

pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
mod provider;
mod registry;

pub use error::ProviderError;
pub use provider::{Created, Provider, ProviderId};
pub use registry::ProviderRegistry;

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockCall, MockOp, MockProvider};
