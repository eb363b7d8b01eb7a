//! JSON file state store.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use converge_graph::ResourceId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::record::StateRecord;
use crate::StateStore;

/// On-disk schema version.
const STATE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StateDocument {
    version: u32,
    #[serde(default)]
    resources: Vec<StateRecord>,
}

/// [`StateStore`] backed by one JSON file.
///
/// The file is read once when opened and rewritten in full on every change:
/// the new content goes to a sibling temporary file, is synced, then renamed
/// over the original. A crash leaves either the old or the new document,
/// never a partial one.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    records: Mutex<BTreeMap<ResourceId, StateRecord>>,
}

impl FileStateStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the file cannot be read,
    /// [`StateError::Corrupt`] if it cannot be parsed, and
    /// [`StateError::UnsupportedVersion`] for another schema version.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StateError> {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(content) => parse(&path, &content)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StateError::Io { path, source }),
        };

        tracing::debug!(path = %path.display(), records = records.len(), "state file opened");
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, records: &BTreeMap<ResourceId, StateRecord>) -> Result<(), StateError> {
        let document = StateDocument {
            version: STATE_VERSION,
            resources: records.values().cloned().collect(),
        };
        let content = serde_json::to_vec_pretty(&document)?;

        let tmp = self.path.with_extension("tmp");
        let io_err = |source| StateError::Io {
            path: tmp.clone(),
            source,
        };
        let mut file = fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(&content).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);

        fs::rename(&tmp, &self.path).map_err(|source| StateError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

fn parse(path: &Path, content: &str) -> Result<BTreeMap<ResourceId, StateRecord>, StateError> {
    let document: StateDocument =
        serde_json::from_str(content).map_err(|source| StateError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
    if document.version != STATE_VERSION {
        return Err(StateError::UnsupportedVersion {
            found: document.version,
            expected: STATE_VERSION,
        });
    }
    Ok(document
        .resources
        .into_iter()
        .map(|record| (record.id.clone(), record))
        .collect())
}

impl StateStore for FileStateStore {
    fn load(&self, id: &ResourceId) -> Result<Option<StateRecord>, StateError> {
        Ok(self.records.lock().get(id).cloned())
    }

    fn save(&self, record: &StateRecord) -> Result<(), StateError> {
        let mut records = self.records.lock();
        let previous = records.insert(record.id.clone(), record.clone());
        if let Err(err) = self.persist(&records) {
            // Keep memory consistent with disk.
            match previous {
                Some(previous) => records.insert(record.id.clone(), previous),
                None => records.remove(&record.id),
            };
            return Err(err);
        }
        tracing::trace!(resource = %record.id, "state record saved");
        Ok(())
    }

    fn remove(&self, id: &ResourceId) -> Result<Option<StateRecord>, StateError> {
        let mut records = self.records.lock();
        let Some(removed) = records.remove(id) else {
            return Ok(None);
        };
        if let Err(err) = self.persist(&records) {
            records.insert(id.clone(), removed);
            return Err(err);
        }
        tracing::trace!(resource = %id, "state record removed");
        Ok(Some(removed))
    }

    fn list(&self) -> Result<Vec<StateRecord>, StateError> {
        Ok(self.records.lock().values().cloned().collect())
    }
}
