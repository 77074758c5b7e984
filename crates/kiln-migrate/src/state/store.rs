//! State stores

use super::{PersistedState, STATE_VERSION};
use crate::error::StateError;
use parking_lot::Mutex;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// File name used inside a state directory
pub const STATE_FILE: &str = "state.json";

/// Where persisted state lives
pub trait StateStore: Send + Sync {
    /// Load state; `None` when nothing was saved yet
    ///
    /// # Errors
    /// Returns `StateError` if stored state exists but cannot be read
    fn load(&self) -> Result<Option<PersistedState>, StateError>;

    /// Replace stored state
    ///
    /// # Errors
    /// Returns `StateError` if the state cannot be written
    fn save(&self, state: &PersistedState) -> Result<(), StateError>;

    /// Whether state was saved before
    ///
    /// # Errors
    /// Propagates [`StateStore::load`] failures
    fn is_initialized(&self) -> Result<bool, StateError> {
        self.load().map(|s| s.is_some())
    }
}

/// JSON file store with atomic replacement
///
/// Writes go to a temporary file in the target directory which is then
/// renamed over the state file, so readers never observe a partial write.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    /// Store at an explicit file path
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<dir>/state.json`
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(STATE_FILE))
    }

    /// State file path
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<Option<PersistedState>, StateError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StateError::io(&self.path, err)),
        };

        let state: PersistedState =
            serde_json::from_str(&text).map_err(|source| StateError::Parse {
                path: self.path.clone(),
                source,
            })?;

        if state.version != STATE_VERSION {
            return Err(StateError::UnsupportedVersion {
                found: state.version,
                expected: STATE_VERSION.to_string(),
            });
        }

        tracing::debug!(path = %self.path.display(), services = state.services.len(), "state loaded");
        Ok(Some(state))
    }

    fn save(&self, state: &PersistedState) -> Result<(), StateError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| StateError::io(&dir, e))?;

        let bytes = serde_json::to_vec_pretty(state)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| StateError::io(&dir, e))?;
        tmp.write_all(&bytes)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| StateError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| StateError::io(&self.path, e.error))?;

        tracing::info!(path = %self.path.display(), "state saved");
        Ok(())
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<PersistedState>>,
    saves: Mutex<usize>,
}

impl MemoryStateStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with state
    #[must_use]
    pub fn with_state(state: PersistedState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            saves: Mutex::new(0),
        }
    }

    /// Current contents
    #[must_use]
    pub fn snapshot(&self) -> Option<PersistedState> {
        self.state.lock().clone()
    }

    /// Number of successful saves
    #[must_use]
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<Option<PersistedState>, StateError> {
        Ok(self.snapshot())
    }

    fn save(&self, state: &PersistedState) -> Result<(), StateError> {
        *self.state.lock() = Some(state.clone());
        *self.saves.lock() += 1;
        Ok(())
    }
}
