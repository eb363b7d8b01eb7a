//! In-memory state store.

use std::collections::BTreeMap;

use converge_graph::ResourceId;
use parking_lot::RwLock;

use crate::error::StateError;
use crate::record::StateRecord;
use crate::StateStore;

/// [`StateStore`] held entirely in memory. Never fails.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: RwLock<BTreeMap<ResourceId, StateRecord>>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with `records`.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = StateRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, id: &ResourceId) -> Result<Option<StateRecord>, StateError> {
        Ok(self.records.read().get(id).cloned())
    }

    fn save(&self, record: &StateRecord) -> Result<(), StateError> {
        self.records
            .write()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn remove(&self, id: &ResourceId) -> Result<Option<StateRecord>, StateError> {
        Ok(self.records.write().remove(id))
    }

    fn list(&self) -> Result<Vec<StateRecord>, StateError> {
        Ok(self.records.read().values().cloned().collect())
    }
}
