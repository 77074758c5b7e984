//! Error types for Kiln Core
//!
//! [`OrchestratorError`] wraps the errors of every stage:
//! - manifest and contract parsing
//! - graph construction and scheduling
//! - execution failures
//! - contract diffing and state persistence
//! - the breaking-change confirmation gate
//! - loading saved plans

use kiln_contract::ContractError;
use kiln_kernel::{GraphError, RunError, RunFailure, ScheduleError};
use kiln_migrate::{DiffError, StateError};
use std::path::PathBuf;

/// Main orchestrator error type
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Manifest or contract could not be parsed
    #[error("contract error: {0}")]
    Contract(#[from] ContractError),

    /// Contract text could not be read
    #[error("contract for service '{service}' unavailable ({contract_ref}): {source}")]
    ContractUnavailable {
        /// Service whose contract was requested
        service: String,
        /// Contract reference from the manifest
        contract_ref: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Graph construction failed
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// Scheduling failed
    #[error("schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// A single-node run could not start or failed
    #[error("run error: {0}")]
    Run(#[from] RunError),

    /// A full run stopped on a failed node
    #[error("run failed: {0}")]
    RunFailed(#[from] RunFailure),

    /// Current contract set is inconsistent
    #[error("diff error: {0}")]
    Diff(#[from] DiffError),

    /// State could not be read or written
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A saved plan could not be loaded
    #[error("plan error: {0}")]
    PlanFile(#[from] PlanFileError),

    /// Breaking plan applied without confirmation
    #[error("migration contains breaking changes ({}); confirmation required", services.join(", "))]
    BreakingChangeNotConfirmed {
        /// Services with breaking steps
        services: Vec<String>,
    },

    /// An operation needs recorded state but none exists
    #[error("state not initialized; run a migration plan first")]
    StateNotInitialized,

    /// A named service is not declared in the manifest
    #[error("service '{0}' is not declared in the manifest")]
    UnknownService(String),
}

impl OrchestratorError {
    /// Check if the operation may succeed when repeated unchanged
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RunFailed(_)
                | Self::Run(RunError::NodeFailed { .. })
                | Self::ContractUnavailable { .. }
                | Self::State(StateError::Io { .. })
        )
    }

    /// Check if the error is the confirmation gate
    #[inline]
    #[must_use]
    pub fn needs_confirmation(&self) -> bool {
        matches!(self, Self::BreakingChangeNotConfirmed { .. })
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for this schema
    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Saved plan loading errors
#[derive(Debug, thiserror::Error)]
pub enum PlanFileError {
    /// Plan file could not be read
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Plan file does not hold a serialized schedule
    #[error("invalid plan: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        let failed = OrchestratorError::Run(RunError::NodeFailed {
            wave: 0,
            node: "user".to_string(),
            cause: "timeout".to_string(),
        });
        assert!(failed.is_retryable());

        let missing = OrchestratorError::Run(RunError::NodeNotFound("ghost".to_string()));
        assert!(!missing.is_retryable());
        assert!(!OrchestratorError::StateNotInitialized.is_retryable());
    }

    #[test]
    fn confirmation_message_lists_services() {
        let err = OrchestratorError::BreakingChangeNotConfirmed {
            services: vec!["user".to_string(), "todo".to_string()],
        };
        assert!(err.needs_confirmation());
        assert_eq!(
            err.to_string(),
            "migration contains breaking changes (user, todo); confirmation required"
        );
    }
}
