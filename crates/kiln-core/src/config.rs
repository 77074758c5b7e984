//! Orchestrator configuration
//!
//! Loaded from an optional TOML file; every key may be omitted.
//!
//! ```toml
//! concurrency = 4          # 0 = unbounded
//! aggregator = true        # add gateway-service when there are 2+ services
//! cycle_policy = "degrade" # or "fail"
//! state_dir = ".kiln"      # relative to the manifest directory
//! ```

use crate::error::ConfigError;
use kiln_kernel::CyclePolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up next to the manifest
pub const CONFIG_FILE: &str = "kiln.toml";

/// Default state directory name
pub const DEFAULT_STATE_DIR: &str = ".kiln";

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KilnConfig {
    /// Maximum nodes of a parallel wave running at once (0 = unbounded)
    pub concurrency: usize,
    /// Whether to add the synthetic gateway
    pub aggregator: bool,
    /// How the scheduler handles dependency cycles
    pub cycle_policy: CyclePolicy,
    /// State directory, relative to the manifest directory unless absolute
    pub state_dir: PathBuf,
}

impl KilnConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With concurrency limit
    #[inline]
    #[must_use]
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit;
        self
    }

    /// With or without the gateway
    #[inline]
    #[must_use]
    pub fn with_aggregator(mut self, enabled: bool) -> Self {
        self.aggregator = enabled;
        self
    }

    /// With cycle policy
    #[inline]
    #[must_use]
    pub fn with_cycle_policy(mut self, policy: CyclePolicy) -> Self {
        self.cycle_policy = policy;
        self
    }

    /// With state directory
    #[inline]
    #[must_use]
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// Returns `ConfigError::Toml` on malformed input or unknown values
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// Returns `ConfigError::Io` if the file cannot be read
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// State directory for a manifest living in `manifest_dir`
    #[must_use]
    pub fn state_dir_for(&self, manifest_dir: &Path) -> PathBuf {
        if self.state_dir.is_absolute() {
            self.state_dir.clone()
        } else {
            manifest_dir.join(&self.state_dir)
        }
    }
}

impl Default for KilnConfig {
    fn default() -> Self {
        Self {
            concurrency: 0,
            aggregator: true,
            cycle_policy: CyclePolicy::Degrade,
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = KilnConfig::default();
        assert_eq!(config.concurrency, 0);
        assert!(config.aggregator);
        assert_eq!(config.cycle_policy, CyclePolicy::Degrade);
        assert_eq!(config.state_dir, PathBuf::from(".kiln"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = KilnConfig::from_toml_str("concurrency = 3\ncycle_policy = \"fail\"\n").unwrap();
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.cycle_policy, CyclePolicy::Fail);
        assert!(config.aggregator);
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!(matches!(
            KilnConfig::from_toml_str("cycle_policy = \"ignore\""),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "aggregator = false\nstate_dir = \"state\"\n").unwrap();

        let config = KilnConfig::load(&path).unwrap();
        assert!(!config.aggregator);
        assert_eq!(config.state_dir_for(dir.path()), dir.path().join("state"));

        assert!(matches!(
            KilnConfig::load(dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn builders_chain() {
        let config = KilnConfig::new()
            .with_concurrency(8)
            .with_aggregator(false)
            .with_cycle_policy(CyclePolicy::Fail)
            .with_state_dir("/var/lib/kiln");
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.state_dir_for(Path::new("/srv/app")), PathBuf::from("/var/lib/kiln"));
    }
}
