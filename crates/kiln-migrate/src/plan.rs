//! Migration planner
//!
//! Turns detected changes into an ordered list of steps, one per service,
//! followed by a single infrastructure refresh. Steps execute one at a time
//! through the same runner that builds the application.

use crate::diff::{ChangeKind, ContractChange};
use kiln_kernel::{ServiceGraph, ServiceNode, Wave, WorkAction};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// What a migration step does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationAction {
    /// Implement a service for the first time
    ImplementNew,
    /// Re-implement a service whose contract changed
    Reimplement,
    /// Delete a service's implementation
    Remove,
    /// Regenerate shared infrastructure
    RefreshInfra,
}

impl MigrationAction {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ImplementNew => "implement_new",
            Self::Reimplement => "reimplement",
            Self::Remove => "remove",
            Self::RefreshInfra => "refresh_infra",
        }
    }

    /// Action handed to the unit of work
    #[must_use]
    pub const fn work_action(self, breaking: bool) -> WorkAction {
        match self {
            Self::ImplementNew => WorkAction::Implement,
            Self::Reimplement => WorkAction::Reimplement { breaking },
            Self::Remove => WorkAction::Remove,
            Self::RefreshInfra => WorkAction::RefreshInfra,
        }
    }
}

impl fmt::Display for MigrationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One planned action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStep {
    /// Service name; `None` for the infrastructure step
    pub service: Option<String>,
    /// Resolved target node
    pub node: ServiceNode,
    /// Action
    pub action: MigrationAction,
    /// Whether callers are affected
    pub breaking: bool,
    /// Human-readable description
    pub description: String,
}

impl MigrationStep {
    /// Action handed to the unit of work
    #[inline]
    #[must_use]
    pub fn work_action(&self) -> WorkAction {
        self.action.work_action(self.breaking)
    }
}

/// Ordered migration steps and the changes they came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// Steps in execution order
    pub steps: Vec<MigrationStep>,
    /// Originating changes, in detection order
    pub changes: Vec<ContractChange>,
}

impl MigrationPlan {
    /// Whether there is nothing to do
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether any step breaks callers or removes a service
    #[must_use]
    pub fn has_breaking(&self) -> bool {
        self.steps
            .iter()
            .any(|s| s.breaking || s.action == MigrationAction::Remove)
    }

    /// Steps that break callers
    pub fn breaking_steps(&self) -> impl Iterator<Item = &MigrationStep> {
        self.steps
            .iter()
            .filter(|s| s.breaking || s.action == MigrationAction::Remove)
    }

    /// One sequential single-node wave per step, in step order
    #[must_use]
    pub fn waves(&self) -> Vec<Wave> {
        self.steps
            .iter()
            .enumerate()
            .map(|(index, step)| Wave::new(index, vec![step.node.clone()], step.work_action()))
            .collect()
    }
}

/// Plan the steps for a change list
///
/// Targets are resolved from `graph`; a removed service is no longer in the
/// graph and becomes a detached node.
#[must_use]
pub fn plan_migration(changes: &[ContractChange], graph: &ServiceGraph) -> MigrationPlan {
    let mut covered = HashSet::new();
    let mut steps = Vec::with_capacity(changes.len() + 1);

    for change in changes {
        if !covered.insert(change.service.as_str()) {
            continue;
        }

        let (action, breaking, description) = match change.kind {
            ChangeKind::Added => (
                MigrationAction::ImplementNew,
                false,
                "New service: implement from contract",
            ),
            ChangeKind::ModifiedNonBreaking => (
                MigrationAction::Reimplement,
                false,
                "Contract changed: re-implement",
            ),
            ChangeKind::ModifiedBreaking => (
                MigrationAction::Reimplement,
                true,
                "Breaking contract change: re-implement",
            ),
            ChangeKind::Removed => (
                MigrationAction::Remove,
                true,
                "Service removed: delete implementation",
            ),
        };

        let node = match (change.kind, graph.node(&change.service)) {
            (ChangeKind::Removed, _) | (_, None) => {
                ServiceNode::real(&change.service, &change.contract_ref)
            }
            (_, Some(node)) => node.clone(),
        };

        steps.push(MigrationStep {
            service: Some(change.service.clone()),
            node,
            action,
            breaking,
            description: description.to_string(),
        });
    }

    if !changes.is_empty() {
        steps.push(MigrationStep {
            service: None,
            node: ServiceNode::infrastructure(),
            action: MigrationAction::RefreshInfra,
            breaking: false,
            description: "Regenerate shared infrastructure".to_string(),
        });
    }

    tracing::debug!(steps = steps.len(), changes = changes.len(), "migration planned");
    MigrationPlan {
        steps,
        changes: changes.to_vec(),
    }
}
