//! Demo wiring for the converge reconciler.
//!
//! Every kind is backed by an in-memory [`MockProvider`], so the full
//! plan → apply → report cycle runs without credentials or network access.
//! The bundled manifest declares an IAM role, an EKS cluster that references
//! the role's ARN, and a node group that references the cluster.

use std::sync::Arc;

use converge_graph::{GraphError, Manifest};
use converge_provider::{MockProvider, ProviderRegistry};

/// The bundled Role → Cluster → `NodeGroup` manifest.
pub const EKS_MANIFEST: &str = include_str!("../manifests/eks.json");

/// Parses a manifest, falling back to [`EKS_MANIFEST`] when `source` is
/// `None`.
///
/// # Errors
///
/// Returns [`GraphError::Manifest`] for malformed JSON.
pub fn load_manifest(source: Option<&str>) -> Result<Manifest, GraphError> {
    Manifest::from_json_str(source.unwrap_or(EKS_MANIFEST))
}

/// Builds an in-memory provider for `kind`.
///
/// Cluster names are unique, so renaming a cluster replaces it and the old
/// one must go first.
#[must_use]
pub fn provider_for(kind: &str) -> MockProvider {
    match kind {
        "eks_cluster" => MockProvider::new(kind)
            .with_replace_on(["name"])
            .with_create_before_destroy(false),
        "eks_node_group" => MockProvider::new(kind).with_replace_on(["cluster_name", "instance_type"]),
        _ => MockProvider::new(kind),
    }
}

/// Registers one in-memory provider per kind declared in `manifest`.
#[must_use]
pub fn registry_for(manifest: &Manifest) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for decl in &manifest.resources {
        if !registry.has(&decl.kind) {
            registry.register(decl.kind.clone(), Arc::new(provider_for(&decl.kind)));
        }
    }
    registry
}
