//! Kiln Migrate (kiln-migrate)
//!
//! Incremental re-planning for an application that was already built:
//!
//! - [`detect_changes`]: recorded state vs. current contracts, classified
//! - [`plan_migration`]: changes to ordered steps and runner waves
//! - [`PersistedState`] and [`StateStore`]: what was built, and where it is kept
//!
//! # Example
//!
//! ```rust,ignore
//! use kiln_migrate::{detect_changes, plan_migration, FileStateStore, StateStore};
//!
//! let store = FileStateStore::in_dir(".kiln");
//! let prior = store.load()?.expect("initialized");
//! let changes = detect_changes(&prior, &current)?;
//! let plan = plan_migration(&changes, &graph);
//! let runner = Runner::new(plan.waves(), work);
//! ```

#![warn(unreachable_pub)]

pub mod diff;
pub mod error;
pub mod plan;
pub mod state;

pub use diff::{classify, detect_changes, ChangeKind, Classification, ContractChange, CurrentService, METADATA_ONLY};
pub use error::{DiffError, StateError};
pub use plan::{plan_migration, MigrationAction, MigrationPlan, MigrationStep};
pub use state::{
    ChangeRecord, FileStateStore, MemoryStateStore, MigrationKind, MigrationRecord, PersistedState,
    ServiceState, StateStore, STATE_FILE, STATE_VERSION,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
