//! Plain-text reports for the command line

use crate::orchestrator::BuildPlan;
use kiln_migrate::{MigrationAction, MigrationPlan, MigrationRecord};
use std::fmt::Write;

/// Waves of a build, one line each, followed by cycle warnings
#[must_use]
pub fn render_build_plan(plan: &BuildPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Build plan: {} service(s) in {} wave(s)",
        plan.graph.len(),
        plan.waves().len()
    );
    for wave in plan.waves() {
        let mode = if wave.parallel { "parallel" } else { "sequential" };
        let names: Vec<&str> = wave.names().collect();
        let _ = writeln!(out, "  wave {} ({mode}): {}", wave.index, names.join(", "));
    }
    for warning in plan.warnings() {
        let _ = writeln!(out, "  warning: {warning}");
    }
    out
}

/// Steps of a migration plan with change details
#[must_use]
pub fn render_migration_plan(plan: &MigrationPlan) -> String {
    if plan.is_empty() {
        return "No changes detected\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "Detected {} change(s):", plan.changes.len());
    for change in &plan.changes {
        let _ = writeln!(out, "  {} [{}]", change.service, change.kind);
        for detail in &change.details {
            let _ = writeln!(out, "    - {detail}");
        }
    }

    let _ = writeln!(out, "Migration steps:");
    for (idx, step) in plan.steps.iter().enumerate() {
        let target = step.service.as_deref().unwrap_or(step.node.name.as_str());
        let flag = if step.breaking || step.action == MigrationAction::Remove {
            " (breaking)"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "  {}. {} {target}{flag}: {}",
            idx + 1,
            step.action,
            step.description
        );
    }
    if plan.has_breaking() {
        let _ = writeln!(out, "Breaking changes require confirmation before applying");
    }
    out
}

/// Migration history, newest first
#[must_use]
pub fn render_history(records: &[MigrationRecord]) -> String {
    if records.is_empty() {
        return "No migrations recorded\n".to_string();
    }

    let mut out = String::new();
    for record in records {
        let _ = writeln!(
            out,
            "{} {} [{}] {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.id,
            record.kind,
            record.description
        );
        for change in &record.changes {
            let mark = if change.breaking { "!" } else { "-" };
            let _ = writeln!(
                out,
                "  {mark} {} ({}): {}",
                change.service, change.change_kind, change.description
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use kiln_kernel::{schedule, CyclePolicy, GraphBuilder};
    use kiln_migrate::{ChangeKind, ChangeRecord, MigrationKind};
    use kiln_test_utils::todo_app_manifest;

    #[test]
    fn build_plan_lists_waves() {
        let graph = GraphBuilder::from_manifest(&todo_app_manifest())
            .unwrap()
            .build()
            .unwrap();
        let schedule = schedule(&graph, CyclePolicy::Fail).unwrap();
        let text = render_build_plan(&BuildPlan { graph, schedule });

        assert!(text.starts_with("Build plan: 3 service(s) in 3 wave(s)"));
        assert!(text.contains("  wave 0 (sequential): user\n"));
        assert!(text.contains("  wave 2 (sequential): gateway-service\n"));
    }

    #[test]
    fn empty_plan_and_history() {
        assert_eq!(render_migration_plan(&MigrationPlan::default()), "No changes detected\n");
        assert_eq!(render_history(&[]), "No migrations recorded\n");
    }

    #[test]
    fn history_marks_breaking_changes() {
        let record = MigrationRecord {
            id: "01J0000000000000000000000".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            kind: MigrationKind::Migrate,
            description: "Applied 1 contract change(s)".to_string(),
            changes: vec![ChangeRecord {
                service: "user".to_string(),
                change_kind: ChangeKind::ModifiedBreaking,
                breaking: true,
                description: "Endpoint removed: GET /users/{id}".to_string(),
            }],
        };
        let text = render_history(&[record]);
        assert!(text.starts_with("2026-03-01 12:00:00 01J0000000000000000000000 [migrate]"));
        assert!(text.contains("  ! user (modified_breaking): Endpoint removed: GET /users/{id}"));
    }
}
