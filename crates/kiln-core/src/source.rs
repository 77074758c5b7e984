//! Contract sources
//!
//! The orchestrator reads contract text through [`ContractSource`], keyed by
//! the contract reference written in the manifest.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// Where contract text comes from
pub trait ContractSource: Send + Sync {
    /// Read the contract a manifest entry refers to
    ///
    /// # Errors
    /// Returns an I/O error if the contract cannot be read
    fn read(&self, contract_ref: &str) -> io::Result<String>;
}

/// Contracts on disk, relative to a base directory
#[derive(Debug, Clone)]
pub struct DirContractSource {
    root: PathBuf,
}

impl DirContractSource {
    /// Source rooted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Source rooted at the directory holding `manifest_path`
    #[must_use]
    pub fn for_manifest(manifest_path: &Path) -> Self {
        let root = manifest_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self::new(root)
    }

    /// Base directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute references stay as they are, others join the base directory
    #[must_use]
    pub fn resolve(&self, contract_ref: &str) -> PathBuf {
        let path = Path::new(contract_ref);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl ContractSource for DirContractSource {
    fn read(&self, contract_ref: &str) -> io::Result<String> {
        let path = self.resolve(contract_ref);
        tracing::debug!(path = %path.display(), "reading contract");
        std::fs::read_to_string(path)
    }
}

/// Contracts held in memory; entries can be replaced between calls
#[derive(Debug, Default)]
pub struct MemoryContractSource {
    contracts: RwLock<HashMap<String, String>>,
}

impl MemoryContractSource {
    /// Empty source
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a contract
    #[must_use]
    pub fn with_contract(self, contract_ref: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(contract_ref, text);
        self
    }

    /// Add or replace a contract
    pub fn insert(&self, contract_ref: impl Into<String>, text: impl Into<String>) {
        self.contracts.write().insert(contract_ref.into(), text.into());
    }

    /// Remove a contract
    pub fn remove(&self, contract_ref: &str) -> Option<String> {
        self.contracts.write().remove(contract_ref)
    }
}

impl<K, V> FromIterator<(K, V)> for MemoryContractSource
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let contracts = iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self {
            contracts: RwLock::new(contracts),
        }
    }
}

impl ContractSource for MemoryContractSource {
    fn read(&self, contract_ref: &str) -> io::Result<String> {
        self.contracts.read().get(contract_ref).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no contract registered for {contract_ref}"),
            )
        })
    }
}
