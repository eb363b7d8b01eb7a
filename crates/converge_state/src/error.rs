//! Error types for state storage.

use std::path::PathBuf;

/// Errors from a [`StateStore`](crate::StateStore).
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Reading or writing the state file failed.
    #[error("state file {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The state file is not valid JSON for the expected schema.
    #[error("state file {path} is corrupt: {source}")]
    Corrupt {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The state file was written by an incompatible version.
    #[error("unsupported state file version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version found in the file.
        found: u32,
        /// Version this build reads and writes.
        expected: u32,
    },

    /// Encoding records failed.
    #[error("failed to encode state: {0}")]
    Serialization(#[from] serde_json::Error),
}
