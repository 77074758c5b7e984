//! Kiln Core - orchestrator for multi-service applications
//!
//! Wires the lower crates into one facade:
//! - [`kiln_contract`] manifests and contracts, read through a [`ContractSource`]
//! - [`kiln_kernel`] graph, waves and the concurrent runner
//! - [`kiln_migrate`] change detection, migration plans and persisted state
//!
//! # Example
//!
//! ```rust,ignore
//! use kiln_core::prelude::*;
//! use std::sync::Arc;
//!
//! let kiln = Orchestrator::new(
//!     KilnConfig::new().with_concurrency(4),
//!     Arc::new(DirContractSource::for_manifest(path)),
//!     Arc::new(DryRunWork),
//!     Arc::new(FileStateStore::in_dir(".kiln")),
//! );
//!
//! let results = kiln.build(&manifest).await?;
//! let preview = kiln.plan_migration(&manifest)?;
//! if !preview.plan.is_empty() {
//!     kiln.apply_migration(&manifest, Confirmation::Confirmed).await?;
//! }
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod report;
pub mod source;
pub mod work;

pub use config::{KilnConfig, CONFIG_FILE, DEFAULT_STATE_DIR};
pub use error::{ConfigError, OrchestratorError, PlanFileError};
pub use orchestrator::{BuildPlan, Confirmation, MigrationOutcome, MigrationPreview, Orchestrator};
pub use plan::{load_schedule, schedule_from_json};
pub use report::{render_build_plan, render_history, render_migration_plan};
pub use source::{ContractSource, DirContractSource, MemoryContractSource};
pub use work::DryRunWork;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving the orchestrator
    pub use crate::{
        BuildPlan, Confirmation, ContractSource, DirContractSource, DryRunWork, KilnConfig,
        MemoryContractSource, MigrationOutcome, MigrationPreview, Orchestrator, OrchestratorError,
    };
    pub use kiln_contract::AppManifest;
    pub use kiln_kernel::{CyclePolicy, ExecutionResult, UnitOfWork};
    pub use kiln_migrate::{FileStateStore, MemoryStateStore, StateStore};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
