//! State store for converge.
//!
//! A [`StateStore`] remembers, per resource, the provider identifier and the
//! attributes as of the last successful operation. The planner diffs against
//! it and the executor writes to it after every applied operation, so a run
//! interrupted at any point resumes from what actually happened.
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryStateStore`] for tests and embedding.
//! - [`FileStateStore`], a single JSON document rewritten atomically on
//!   every change.

mod error;
mod file;
mod memory;
mod record;

pub use error::StateError;
pub use file::FileStateStore;
pub use memory::MemoryStateStore;
pub use record::StateRecord;

use std::sync::Arc;

use converge_graph::ResourceId;

/// Persistent mapping from resource identity to [`StateRecord`].
///
/// Writes must be durable when they return. Per-record atomicity is enough:
/// the dependency graph never lets two operations write the same record at
/// once.
pub trait StateStore: Send + Sync + 'static {
    /// Loads the record for `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn load(&self, id: &ResourceId) -> Result<Option<StateRecord>, StateError>;

    /// Inserts or replaces the record for `record.id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    fn save(&self, record: &StateRecord) -> Result<(), StateError>;

    /// Removes the record for `id`, returning it if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    fn remove(&self, id: &ResourceId) -> Result<Option<StateRecord>, StateError>;

    /// Lists all records ordered by resource identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn list(&self) -> Result<Vec<StateRecord>, StateError>;
}

impl<S: StateStore + ?Sized> StateStore for Arc<S> {
    fn load(&self, id: &ResourceId) -> Result<Option<StateRecord>, StateError> {
        (**self).load(id)
    }

    fn save(&self, record: &StateRecord) -> Result<(), StateError> {
        (**self).save(record)
    }

    fn remove(&self, id: &ResourceId) -> Result<Option<StateRecord>, StateError> {
        (**self).remove(id)
    }

    fn list(&self) -> Result<Vec<StateRecord>, StateError> {
        (**self).list()
    }
}
