//! Error types for diffing and state persistence

use std::path::PathBuf;

/// Errors raised while comparing prior state with the current contract set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiffError {
    /// A current service has a blank name
    #[error("service #{position} has an empty name")]
    EmptyName {
        /// One-based position in the current set
        position: usize,
    },

    /// Two current services share a name
    #[error("service '{0}' appears more than once in the current set")]
    DuplicateService(String),
}

/// Errors raised by state stores
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Reading or writing the state file failed
    #[error("state i/o error at {}: {source}", path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The state file is not valid state JSON
    #[error("failed to parse state file {}: {source}", path.display())]
    Parse {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// State could not be encoded
    #[error("failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),

    /// State was written by an incompatible format version
    #[error("unsupported state version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version found on disk
        found: String,
        /// Version this build writes
        expected: String,
    },
}

impl StateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
