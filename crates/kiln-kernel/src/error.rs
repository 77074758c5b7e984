//! Error types for the kernel

use crate::executor::ExecutionResult;

/// Structural errors raised while building a service graph
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A node name is empty or blank
    #[error("service name is empty")]
    EmptyName,

    /// Two nodes share a name
    #[error("duplicate service: {0}")]
    DuplicateNode(String),

    /// A node lists its own name among its dependencies
    #[error("service '{0}' depends on itself")]
    SelfDependency(String),
}

/// Errors raised while layering a graph into waves
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    /// The dependency walk re-entered a node it was still resolving
    #[error("circular dependency detected involving service: {node}")]
    CycleDetected {
        /// Node found on the cycle
        node: String,
    },
}

impl ScheduleError {
    /// Name of the offending node
    #[must_use]
    pub fn node(&self) -> &str {
        match self {
            Self::CycleDetected { node } => node,
        }
    }
}

/// Errors raised while running waves
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    /// A unit of work failed and the run stopped after its wave
    #[error("wave {wave}: service {node} failed: {cause}")]
    NodeFailed {
        /// Index of the failed wave
        wave: usize,
        /// First failed node of the wave
        node: String,
        /// Failure cause reported by the unit of work
        cause: String,
    },

    /// The requested node is not part of any wave
    #[error("service not found in plan: {0}")]
    NodeNotFound(String),
}

impl RunError {
    /// Name of the node the error is about
    #[must_use]
    pub fn node(&self) -> &str {
        match self {
            Self::NodeFailed { node, .. } | Self::NodeNotFound(node) => node,
        }
    }
}

/// A failed run: the terminal error plus every result collected before it
#[derive(Debug, Clone, thiserror::Error)]
#[error("{error}")]
pub struct RunFailure {
    /// Terminal error
    pub error: RunError,
    /// Results gathered so far, successful siblings of the failed node included
    pub results: Vec<ExecutionResult>,
}

impl RunFailure {
    /// Wrap an error with its partial results
    #[must_use]
    pub fn new(error: RunError, results: Vec<ExecutionResult>) -> Self {
        Self { error, results }
    }

    /// Results that succeeded before the run stopped
    pub fn succeeded(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.iter().filter(|r| r.success)
    }

    /// Results that failed
    pub fn failed(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.iter().filter(|r| !r.success)
    }
}
