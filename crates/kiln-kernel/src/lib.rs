//! Kiln Kernel (kiln-kernel)
//!
//! Two-phase design:
//! 1. **Construction Phase**: build a [`ServiceGraph`] and layer it into waves
//! 2. **Execution Phase**: run the waves through an injected [`UnitOfWork`]
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use kiln_kernel::prelude::*;
//!
//! // Construction phase
//! let graph = GraphBuilder::from_manifest(&manifest)?.build()?;
//! let schedule = schedule(&graph, CyclePolicy::Fail)?;
//!
//! // Execution phase
//! let runner = Runner::new(schedule.waves, Arc::new(my_work)).with_concurrency(4);
//! let results = runner.execute_all().await?;
//! ```

#![warn(unreachable_pub)]

pub mod error;
pub mod executor;
pub mod graph;
pub mod scheduler;

pub use error::*;
pub use executor::{ExecutionResult, RunSummary, Runner, UnitOfWork, WorkOutput, WorkRequest};
pub use graph::{
    GraphBuilder, NodeKind, ServiceGraph, ServiceNode, SyntheticKind, GATEWAY_NODE, GATEWAY_PORT,
    INFRASTRUCTURE_NODE,
};
pub use scheduler::{build_waves, schedule, CyclePolicy, CycleWarning, Schedule, Wave, WorkAction};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{GraphError, RunError, RunFailure, ScheduleError};
    pub use crate::executor::{ExecutionResult, RunSummary, Runner, UnitOfWork, WorkOutput, WorkRequest};
    pub use crate::graph::{GraphBuilder, NodeKind, ServiceGraph, ServiceNode, SyntheticKind};
    pub use crate::scheduler::{build_waves, schedule, CyclePolicy, Schedule, Wave, WorkAction};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
