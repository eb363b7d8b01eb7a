//! Planning options.

use std::collections::BTreeSet;
use std::time::Duration;

use converge_core::{EngineConfig, RefreshConfig};
use converge_graph::ResourceId;

/// When to re-read recorded resources from their providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Trust the state store as-is.
    Never,
    /// Refresh records older than the threshold.
    Stale(Duration),
    /// Refresh every record.
    Full,
}

impl Default for RefreshMode {
    fn default() -> Self {
        Self::Stale(RefreshConfig::default().staleness())
    }
}

impl From<&RefreshConfig> for RefreshMode {
    fn from(config: &RefreshConfig) -> Self {
        if config.full_refresh {
            Self::Full
        } else {
            Self::Stale(config.staleness())
        }
    }
}

/// Options for one [`Planner::plan`](crate::Planner::plan) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOptions {
    /// Refresh policy.
    pub refresh: RefreshMode,
    /// Resources to replace even if nothing forces it.
    pub force_replace: BTreeSet<ResourceId>,
    /// Maximum number of provider reads in flight while refreshing.
    pub concurrency: usize,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            refresh: RefreshMode::default(),
            force_replace: BTreeSet::new(),
            concurrency: EngineConfig::default().concurrency,
        }
    }
}

impl PlanOptions {
    /// Default options: refresh stale records, force nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the refresh policy.
    #[must_use]
    pub fn with_refresh(mut self, refresh: RefreshMode) -> Self {
        self.refresh = refresh;
        self
    }

    /// Sets the refresh read limit. Clamped to at least one.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Forces a replacement of `id`.
    #[must_use]
    pub fn with_force_replace(mut self, id: ResourceId) -> Self {
        self.force_replace.insert(id);
        self
    }
}
