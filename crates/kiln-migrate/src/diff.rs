//! Contract diff engine
//!
//! Compares the contract snapshots recorded in [`PersistedState`] with the
//! current contract set and classifies every service:
//!
//! | situation                                   | kind                    |
//! |---------------------------------------------|-------------------------|
//! | recorded, no longer declared                | `removed`               |
//! | declared, never recorded                    | `added`                 |
//! | same hash                                   | (no change)             |
//! | operation, required field or type dropped   | `modified_breaking`     |
//! | anything else                               | `modified_non_breaking` |
//!
//! Services calling a breaking-modified service directly are appended as
//! breaking too. Propagation stops after one hop.

use crate::error::DiffError;
use crate::state::PersistedState;
use kiln_contract::{ContractHash, ContractSurface};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Detail recorded for edits that leave the API surface untouched
pub const METADATA_ONLY: &str = "Contract updated (description or metadata changes)";

/// A service as currently declared, with its contract text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentService {
    /// Service name
    pub name: String,
    /// Contract reference from the manifest
    pub contract_ref: String,
    /// Raw contract text
    pub contract: String,
    /// Declared dependencies
    pub dependencies: Vec<String>,
}

impl CurrentService {
    /// Create a service without dependencies
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        contract_ref: impl Into<String>,
        contract: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            contract_ref: contract_ref.into(),
            contract: contract.into(),
            dependencies: Vec::new(),
        }
    }

    /// Add a dependency
    #[must_use]
    pub fn depends_on(mut self, service: impl Into<String>) -> Self {
        self.dependencies.push(service.into());
        self
    }

    /// Digest of the contract text
    #[inline]
    #[must_use]
    pub fn hash(&self) -> ContractHash {
        ContractHash::compute(self.contract.as_bytes())
    }
}

/// How a service changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Newly declared
    Added,
    /// No longer declared
    Removed,
    /// Contract changed in a way that breaks callers
    ModifiedBreaking,
    /// Contract changed compatibly
    ModifiedNonBreaking,
}

impl ChangeKind {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::ModifiedBreaking => "modified_breaking",
            Self::ModifiedNonBreaking => "modified_non_breaking",
        }
    }

    /// Whether callers of the service are affected
    #[inline]
    #[must_use]
    pub const fn is_breaking(self) -> bool {
        matches!(self, Self::ModifiedBreaking | Self::Removed)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractChange {
    /// Service name
    pub service: String,
    /// Classification
    pub kind: ChangeKind,
    /// Contract reference (the recorded one for removals)
    pub contract_ref: String,
    /// Recorded hash
    pub old_hash: Option<ContractHash>,
    /// Current hash
    pub new_hash: Option<ContractHash>,
    /// Human-readable detail lines
    pub details: Vec<String>,
}

impl ContractChange {
    /// First detail line, if any
    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        self.details.first().map(String::as_str)
    }
}

/// Outcome of comparing two revisions of one contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Whether callers break
    pub breaking: bool,
    /// Human-readable detail lines
    pub details: Vec<String>,
}

impl Classification {
    /// Change kind matching the breaking flag
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ChangeKind {
        if self.breaking {
            ChangeKind::ModifiedBreaking
        } else {
            ChangeKind::ModifiedNonBreaking
        }
    }
}

/// Detect every change between the recorded state and the current set
///
/// Removals come first in recorded order, then additions and modifications
/// in current-set order, then services affected by a breaking dependency.
///
/// # Errors
/// Returns `DiffError` if the current set contains an empty or duplicate name
pub fn detect_changes(
    prior: &PersistedState,
    current: &[CurrentService],
) -> Result<Vec<ContractChange>, DiffError> {
    let mut names = HashSet::with_capacity(current.len());
    for (idx, service) in current.iter().enumerate() {
        if service.name.trim().is_empty() {
            return Err(DiffError::EmptyName { position: idx + 1 });
        }
        if !names.insert(service.name.as_str()) {
            return Err(DiffError::DuplicateService(service.name.clone()));
        }
    }

    let mut changes = Vec::new();

    for (name, recorded) in &prior.services {
        if !names.contains(name.as_str()) {
            debug!(service = %name, "service removed");
            changes.push(ContractChange {
                service: name.clone(),
                kind: ChangeKind::Removed,
                contract_ref: recorded.contract_ref.clone(),
                old_hash: Some(recorded.contract_hash),
                new_hash: None,
                details: vec![format!("Service {name} has been removed from the application")],
            });
        }
    }

    for service in current {
        let new_hash = service.hash();
        let Some(recorded) = prior.services.get(&service.name) else {
            debug!(service = %service.name, "service added");
            changes.push(ContractChange {
                service: service.name.clone(),
                kind: ChangeKind::Added,
                contract_ref: service.contract_ref.clone(),
                old_hash: None,
                new_hash: Some(new_hash),
                details: vec![format!("New service {} added to the application", service.name)],
            });
            continue;
        };

        if recorded.contract_hash == new_hash {
            continue;
        }

        let classification = classify(&recorded.contract_snapshot, &service.contract);
        debug!(
            service = %service.name,
            breaking = classification.breaking,
            details = classification.details.len(),
            "contract modified"
        );
        changes.push(ContractChange {
            service: service.name.clone(),
            kind: classification.kind(),
            contract_ref: service.contract_ref.clone(),
            old_hash: Some(recorded.contract_hash),
            new_hash: Some(new_hash),
            details: classification.details,
        });
    }

    propagate_breaking(prior, current, &mut changes);
    Ok(changes)
}

/// Classify the edit from `old` to `new` contract text
///
/// Text that cannot be parsed is classified as breaking with the parse
/// error as its only detail.
#[must_use]
pub fn classify(old: &str, new: &str) -> Classification {
    let surfaces = ContractSurface::from_yaml_str(old)
        .map_err(|e| format!("recorded contract: {e}"))
        .and_then(|old| {
            ContractSurface::from_yaml_str(new)
                .map(|new| (old, new))
                .map_err(|e| format!("current contract: {e}"))
        });

    match surfaces {
        Ok((old, new)) => compare_surfaces(&old, &new),
        Err(err) => Classification {
            breaking: true,
            details: vec![format!("Failed to analyze change: {err}")],
        },
    }
}

fn compare_surfaces(old: &ContractSurface, new: &ContractSurface) -> Classification {
    let mut breaking = false;
    let mut details = Vec::new();

    for (id, op) in &old.operations {
        if !new.operations.contains_key(id) {
            breaking = true;
            details.push(format!("Endpoint removed: {}", op.label()));
        }
    }

    for (id, op) in &new.operations {
        let Some(previous) = old.operations.get(id) else {
            details.push(format!("Endpoint added: {}", op.label()));
            continue;
        };
        for field in previous.required_fields() {
            if !op.request_fields.contains_key(field) {
                breaking = true;
                details.push(format!(
                    "Required field '{field}' removed from {}",
                    op.label()
                ));
            } else if !op.requires(field) {
                breaking = true;
                details.push(format!(
                    "Field '{field}' of {} is no longer required",
                    op.label()
                ));
            }
        }
    }

    for name in &old.types {
        if !new.types.contains(name) {
            breaking = true;
            details.push(format!("Type removed: {name}"));
        }
    }
    for name in new.types.difference(&old.types) {
        details.push(format!("Type added: {name}"));
    }

    if details.is_empty() {
        details.push(METADATA_ONLY.to_string());
    }

    Classification { breaking, details }
}

fn propagate_breaking(
    prior: &PersistedState,
    current: &[CurrentService],
    changes: &mut Vec<ContractChange>,
) {
    let breaking: HashSet<String> = changes
        .iter()
        .filter(|c| c.kind == ChangeKind::ModifiedBreaking)
        .map(|c| c.service.clone())
        .collect();
    if breaking.is_empty() {
        return;
    }

    let mut covered: HashSet<String> = changes.iter().map(|c| c.service.clone()).collect();

    for service in current {
        if covered.contains(&service.name) {
            continue;
        }
        let Some(dep) = service.dependencies.iter().find(|d| breaking.contains(*d)) else {
            continue;
        };

        debug!(service = %service.name, dependency = %dep, "breaking change propagated");
        let recorded = prior.services.get(&service.name).map(|s| s.contract_hash);
        changes.push(ContractChange {
            service: service.name.clone(),
            kind: ChangeKind::ModifiedBreaking,
            contract_ref: service.contract_ref.clone(),
            old_hash: recorded,
            new_hash: recorded,
            details: vec![format!("Affected by breaking change in dependency: {dep}")],
        });
        covered.insert(service.name.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use kiln_test_utils::{
        TODO_CONTRACT, USER_CONTRACT, USER_CONTRACT_REWORDED, USER_CONTRACT_WITHOUT_GET,
        USER_CONTRACT_WITH_SEARCH,
    };
    use pretty_assertions::assert_eq;

    fn user(text: &str) -> CurrentService {
        CurrentService::new("user", "user.contract.yaml", text)
    }

    fn todo() -> CurrentService {
        CurrentService::new("todo", "todo.contract.yaml", TODO_CONTRACT).depends_on("user")
    }

    fn recorded(services: &[CurrentService]) -> PersistedState {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        PersistedState::initialize("todo-app", services, now)
    }

    #[test]
    fn unchanged_set_has_no_changes() {
        let set = vec![user(USER_CONTRACT), todo()];
        assert!(detect_changes(&recorded(&set), &set).unwrap().is_empty());
    }

    #[test]
    fn removed_operation_is_breaking_and_propagates() {
        let prior = recorded(&[user(USER_CONTRACT), todo()]);
        let changes = detect_changes(&prior, &[user(USER_CONTRACT_WITHOUT_GET), todo()]).unwrap();

        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].service, "user");
        assert_eq!(changes[0].kind, ChangeKind::ModifiedBreaking);
        assert!(changes[0].details.iter().any(|d| d.contains("GET /users/{id}")));
        assert_ne!(changes[0].old_hash, changes[0].new_hash);

        assert_eq!(changes[1].service, "todo");
        assert_eq!(changes[1].kind, ChangeKind::ModifiedBreaking);
        assert_eq!(
            changes[1].details,
            vec!["Affected by breaking change in dependency: user".to_string()]
        );
        assert_eq!(changes[1].old_hash, changes[1].new_hash);
    }

    #[test]
    fn added_operation_is_not_breaking() {
        let prior = recorded(&[user(USER_CONTRACT), todo()]);
        let changes = detect_changes(&prior, &[user(USER_CONTRACT_WITH_SEARCH), todo()]).unwrap();

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::ModifiedNonBreaking);
        assert_eq!(changes[0].details, vec!["Endpoint added: GET /users/search".to_string()]);
    }

    #[test]
    fn metadata_edit_gets_generic_detail() {
        let prior = recorded(&[user(USER_CONTRACT)]);
        let changes = detect_changes(&prior, &[user(USER_CONTRACT_REWORDED)]).unwrap();

        assert_eq!(changes[0].kind, ChangeKind::ModifiedNonBreaking);
        assert_eq!(changes[0].summary(), Some(METADATA_ONLY));
    }

    #[test]
    fn additions_and_removals() {
        let prior = recorded(&[user(USER_CONTRACT)]);
        let changes = detect_changes(&prior, &[todo()]).unwrap();

        let kinds: Vec<_> = changes.iter().map(|c| (c.service.as_str(), c.kind)).collect();
        assert_eq!(
            kinds,
            vec![("user", ChangeKind::Removed), ("todo", ChangeKind::Added)]
        );
        assert!(changes[0].new_hash.is_none());
        assert!(changes[1].old_hash.is_none());
        assert_eq!(changes[0].contract_ref, "user.contract.yaml");
    }

    #[test]
    fn removal_does_not_propagate() {
        let prior = recorded(&[user(USER_CONTRACT), todo()]);
        let lone_todo = todo();
        let changes = detect_changes(&prior, &[lone_todo]).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Removed);
    }

    #[test]
    fn required_field_relaxation_is_breaking() {
        let relaxed = USER_CONTRACT.replace(
            "email: { type: string, required: true }",
            "email: { type: string }",
        );
        let result = classify(USER_CONTRACT, &relaxed);
        assert!(result.breaking);
        assert_eq!(
            result.details,
            vec!["Field 'email' of POST /users is no longer required".to_string()]
        );

        let dropped = USER_CONTRACT.replace("        email: { type: string, required: true }\n", "");
        let result = classify(USER_CONTRACT, &dropped);
        assert!(result.breaking);
        assert_eq!(
            result.details,
            vec!["Required field 'email' removed from POST /users".to_string()]
        );
    }

    #[test]
    fn removed_type_is_breaking() {
        let without_list = USER_CONTRACT.replace("  UserList:\n    fields: { items: \"User[]\" }\n", "");
        let result = classify(USER_CONTRACT, &without_list);
        assert!(result.breaking);
        assert!(result.details.contains(&"Type removed: UserList".to_string()));
    }

    #[test]
    fn unparseable_snapshot_is_breaking() {
        let result = classify("service: [broken", USER_CONTRACT);
        assert!(result.breaking);
        assert_eq!(result.details.len(), 1);
        assert!(result.details[0].starts_with("Failed to analyze change: recorded contract"));
    }

    #[test]
    fn rejects_duplicate_and_empty_names() {
        let prior = recorded(&[]);
        assert_eq!(
            detect_changes(&prior, &[user(USER_CONTRACT), user(USER_CONTRACT)]).unwrap_err(),
            DiffError::DuplicateService("user".to_string())
        );
        assert_eq!(
            detect_changes(&prior, &[CurrentService::new(" ", "x.yaml", "")]).unwrap_err(),
            DiffError::EmptyName { position: 1 }
        );
    }
}
