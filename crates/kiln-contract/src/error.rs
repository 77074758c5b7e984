//! Error types for manifest and contract handling

/// Errors raised while reading manifests and contracts
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    /// YAML could not be decoded into the expected shape
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Manifest decoded but violates a structural rule
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Contract decoded but is unusable for planning
    #[error("invalid contract: {0}")]
    InvalidContract(String),
}

impl ContractError {
    /// Create an invalid manifest error
    #[inline]
    pub fn invalid_manifest(message: impl Into<String>) -> Self {
        Self::InvalidManifest(message.into())
    }
}
