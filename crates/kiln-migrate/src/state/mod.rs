//! Persisted application state
//!
//! For every service the state keeps the contract revision that was last
//! built (hash plus full text, so later diffs can be classified) and a
//! per-service migration counter. Migration history is kept newest first.
//!
//! State is only ever folded after a successful run; callers pass it around
//! explicitly and persist it through a [`StateStore`].

mod store;

pub use store::{FileStateStore, MemoryStateStore, StateStore, STATE_FILE};

use crate::diff::{ChangeKind, ContractChange, CurrentService};
use chrono::{DateTime, Utc};
use kiln_contract::ContractHash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use ulid::Ulid;

/// Format version written by this crate
pub const STATE_VERSION: &str = "1";

/// Whole-application state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Format version
    pub version: String,
    /// Application name
    pub app: String,
    /// Per-service records keyed by service name
    pub services: BTreeMap<String, ServiceState>,
    /// Migration history, newest first
    #[serde(default)]
    pub migrations: Vec<MigrationRecord>,
}

/// Record of the last built revision of one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceState {
    /// Contract reference from the manifest
    pub contract_ref: String,
    /// Digest of the contract text
    pub contract_hash: ContractHash,
    /// Full contract text
    pub contract_snapshot: String,
    /// When the service was last built or migrated
    pub last_migrated: DateTime<Utc>,
    /// Number of migrations applied to this service (0 after initialization)
    pub migration_version: u32,
}

/// Why a migration record was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationKind {
    /// Contract changes were applied
    Migrate,
    /// Services were regenerated from unchanged contracts
    Refactor,
}

impl fmt::Display for MigrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Migrate => f.write_str("migrate"),
            Self::Refactor => f.write_str("refactor"),
        }
    }
}

/// One entry of the migration history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// ULID of the migration
    pub id: String,
    /// When the migration completed
    pub timestamp: DateTime<Utc>,
    /// Migration kind
    pub kind: MigrationKind,
    /// Free-form description
    pub description: String,
    /// Per-service changes
    pub changes: Vec<ChangeRecord>,
}

/// One service change inside a migration record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Service name
    pub service: String,
    /// Classification at the time of the migration
    pub change_kind: ChangeKind,
    /// Whether callers were affected
    pub breaking: bool,
    /// First detail line of the change
    pub description: String,
}

impl PersistedState {
    /// Record every current service at migration version 0
    #[must_use]
    pub fn initialize(app: impl Into<String>, services: &[CurrentService], now: DateTime<Utc>) -> Self {
        let services = services
            .iter()
            .map(|svc| (svc.name.clone(), ServiceState::capture(svc, now, 0)))
            .collect();

        Self {
            version: STATE_VERSION.to_string(),
            app: app.into(),
            services,
            migrations: Vec::new(),
        }
    }

    /// Record of one service
    #[inline]
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&ServiceState> {
        self.services.get(name)
    }

    /// Most recent migration
    #[must_use]
    pub fn latest_migration(&self) -> Option<&MigrationRecord> {
        self.migrations.first()
    }

    /// Fold a successfully applied set of changes into the state
    ///
    /// Removed services are dropped; added and modified services take the
    /// current contract revision and bump their migration version (new
    /// services start at 1). A record is prepended to the history.
    pub fn record_migration(
        &mut self,
        changes: &[ContractChange],
        current: &[CurrentService],
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> &MigrationRecord {
        let mut records = Vec::with_capacity(changes.len());

        for change in changes {
            records.push(ChangeRecord {
                service: change.service.clone(),
                change_kind: change.kind,
                breaking: change.kind.is_breaking(),
                description: change.summary().unwrap_or_default().to_string(),
            });

            if change.kind == ChangeKind::Removed {
                self.services.remove(&change.service);
                continue;
            }

            let Some(svc) = current.iter().find(|s| s.name == change.service) else {
                tracing::warn!(service = %change.service, "changed service missing from current set");
                continue;
            };
            let version = self
                .services
                .get(&change.service)
                .map_or(1, |s| s.migration_version + 1);
            self.services
                .insert(svc.name.clone(), ServiceState::capture(svc, now, version));
        }

        self.prepend(MigrationRecord {
            id: Ulid::new().to_string(),
            timestamp: now,
            kind: MigrationKind::Migrate,
            description: description.into(),
            changes: records,
        })
    }

    /// Record that the named services were regenerated from their current
    /// contracts; hashes stay, migration versions are bumped
    ///
    /// Names without recorded state are skipped; they enter state through
    /// the next migration.
    pub fn record_refactor(&mut self, services: &[String], now: DateTime<Utc>) -> &MigrationRecord {
        let mut records = Vec::with_capacity(services.len());
        for name in services {
            let Some(state) = self.services.get_mut(name) else {
                tracing::warn!(service = %name, "refactored service has no recorded state; skipped");
                continue;
            };
            state.last_migrated = now;
            state.migration_version += 1;
            records.push(ChangeRecord {
                service: name.clone(),
                change_kind: ChangeKind::ModifiedNonBreaking,
                breaking: false,
                description: "Regenerated from current contract".to_string(),
            });
        }

        let description = format!("Refactor of {} service(s)", records.len());
        self.prepend(MigrationRecord {
            id: Ulid::new().to_string(),
            timestamp: now,
            kind: MigrationKind::Refactor,
            description,
            changes: records,
        })
    }

    fn prepend(&mut self, record: MigrationRecord) -> &MigrationRecord {
        self.migrations.insert(0, record);
        &self.migrations[0]
    }
}

impl ServiceState {
    fn capture(svc: &CurrentService, now: DateTime<Utc>, migration_version: u32) -> Self {
        Self {
            contract_ref: svc.contract_ref.clone(),
            contract_hash: svc.hash(),
            contract_snapshot: svc.contract.clone(),
            last_migrated: now,
            migration_version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::detect_changes;
    use chrono::{Duration, TimeZone};
    use kiln_test_utils::{TODO_CONTRACT, USER_CONTRACT, USER_CONTRACT_WITH_SEARCH};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn current(user: &str) -> Vec<CurrentService> {
        vec![
            CurrentService::new("user", "user.contract.yaml", user),
            CurrentService::new("todo", "todo.contract.yaml", TODO_CONTRACT).depends_on("user"),
        ]
    }

    #[test]
    fn initialize_records_version_zero() {
        let state = PersistedState::initialize("todo-app", &current(USER_CONTRACT), t0());

        assert_eq!(state.version, STATE_VERSION);
        assert_eq!(state.services.len(), 2);
        let user = state.service("user").unwrap();
        assert_eq!(user.migration_version, 0);
        assert_eq!(user.contract_snapshot, USER_CONTRACT);
        assert_eq!(user.contract_hash, ContractHash::compute(USER_CONTRACT.as_bytes()));
        assert!(state.migrations.is_empty());
    }

    #[test]
    fn migration_folds_changes_and_prepends_record() {
        let mut state = PersistedState::initialize("todo-app", &current(USER_CONTRACT), t0());
        let next = current(USER_CONTRACT_WITH_SEARCH);
        let changes = detect_changes(&state, &next).unwrap();
        let later = t0() + Duration::minutes(5);

        let record = state.record_migration(&changes, &next, "add search", later).clone();

        assert_eq!(record.kind, MigrationKind::Migrate);
        assert_eq!(record.changes.len(), 1);
        assert_eq!(record.changes[0].service, "user");
        assert!(!record.changes[0].breaking);
        assert!(Ulid::from_string(&record.id).is_ok());

        let user = state.service("user").unwrap();
        assert_eq!(user.migration_version, 1);
        assert_eq!(user.last_migrated, later);
        assert_eq!(user.contract_snapshot, USER_CONTRACT_WITH_SEARCH);
        assert_eq!(state.service("todo").unwrap().migration_version, 0);

        assert!(detect_changes(&state, &next).unwrap().is_empty());
    }

    #[test]
    fn removals_drop_entries_and_additions_start_at_one() {
        let mut state = PersistedState::initialize(
            "todo-app",
            &[CurrentService::new("legacy", "legacy.yaml", USER_CONTRACT)],
            t0(),
        );
        let next = current(USER_CONTRACT);
        let changes = detect_changes(&state, &next).unwrap();
        state.record_migration(&changes, &next, "replace legacy", t0());

        assert!(state.service("legacy").is_none());
        assert_eq!(state.service("user").unwrap().migration_version, 1);
        assert_eq!(state.service("todo").unwrap().migration_version, 1);
        let record = state.latest_migration().unwrap();
        assert!(record.changes.iter().any(|c| c.service == "legacy" && c.breaking));
    }

    #[test]
    fn history_is_newest_first() {
        let mut state = PersistedState::initialize("todo-app", &current(USER_CONTRACT), t0());
        state.record_refactor(&["user".to_string()], t0() + Duration::hours(1));
        state.record_refactor(&["todo".to_string()], t0() + Duration::hours(2));

        let order: Vec<_> = state.migrations.iter().map(|m| m.changes[0].service.as_str()).collect();
        assert_eq!(order, vec!["todo", "user"]);
        assert_eq!(state.service("user").unwrap().migration_version, 1);
        assert_eq!(state.latest_migration().unwrap().kind, MigrationKind::Refactor);
    }

    #[test]
    fn refactor_skips_services_without_state() {
        let mut state = PersistedState::initialize("todo-app", &current(USER_CONTRACT), t0());
        let record = state
            .record_refactor(&["user".to_string(), "billing".to_string()], t0() + Duration::hours(1))
            .clone();

        let services: Vec<_> = record.changes.iter().map(|c| c.service.as_str()).collect();
        assert_eq!(services, vec!["user"]);
        assert_eq!(record.description, "Refactor of 1 service(s)");
        assert!(state.service("billing").is_none());
        assert_eq!(state.service("user").unwrap().migration_version, 1);
    }

    #[test]
    fn serializes_hashes_as_hex() {
        let state = PersistedState::initialize("todo-app", &current(USER_CONTRACT), t0());
        let json = serde_json::to_value(&state).unwrap();
        let hash = json["services"]["user"]["contract_hash"].as_str().unwrap();
        assert_eq!(hash.len(), 64);

        let back: PersistedState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
