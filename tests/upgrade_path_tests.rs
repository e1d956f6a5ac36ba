//! Upgrade Path Integration Tests
//!
//! Chained plans running against one folder, sharing a correlation id.

use chrysalis::utilities::{Abort, AddProperty, FileExists, Log, ManualInstruction, PropertyExists};
use chrysalis::condition::Guard;
use chrysalis::{PerformResult, Step, TransformationEngine, TransformationPlan, UpgradePath, Value};
use std::fs;

fn hop(from: &str, to: &str) -> TransformationPlan {
    let mut plan = TransformationPlan::new(format!("{from}-to-{to}"), format!("Upgrade {from} to {to}"))
        .with_versions(from, to)
        .with_application_type("properties-app");
    plan.add(Step::operation(AddProperty::new("version", to)).relative("app.properties"))
        .unwrap();
    plan
}

fn folder() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("app.properties"), "version=1\n").unwrap();
    dir
}

#[test]
fn test_full_chain_applies_every_hop() {
    let dir = folder();
    let path = UpgradePath::new(vec![hop("1", "2"), hop("2", "3"), hop("3", "4")]).unwrap();

    let run = TransformationEngine::new().run_upgrade_path(dir.path(), &path).unwrap();
    assert!(run.is_successful());
    assert_eq!(run.runs.len(), 3);
    assert_eq!(
        fs::read_to_string(dir.path().join("app.properties")).unwrap(),
        "version=4\n"
    );

    let metrics = run.metrics();
    assert!(metrics.iter().all(|m| m.upgrade_correlation_id == Some(run.correlation_id)));
    assert!(metrics.iter().all(|m| m.plan_kind == "UpgradeStep"));
    assert_eq!(metrics[1].from_version.as_deref(), Some("2"));
    assert_eq!(metrics[1].to_version.as_deref(), Some("3"));
    assert_eq!(run.statistics().operation_success_count, 3);
}

#[test]
fn test_truncated_chain_stops_at_version() {
    let dir = folder();
    let path = UpgradePath::new(vec![hop("1", "2"), hop("2", "3"), hop("3", "4")])
        .unwrap()
        .up_to("2")
        .unwrap();

    let run = TransformationEngine::new().run_upgrade_path(dir.path(), &path).unwrap();
    assert!(run.is_successful());
    assert_eq!(run.runs.len(), 1);
    assert_eq!(
        fs::read_to_string(dir.path().join("app.properties")).unwrap(),
        "version=2\n"
    );
}

#[test]
fn test_each_plan_starts_with_a_fresh_context() {
    let dir = folder();
    let mut first = hop("1", "2");
    first
        .add(Step::condition(FileExists).relative("app.properties").named("found"))
        .unwrap();
    let mut second = hop("2", "3");
    second
        .add(
            Step::utility(Log::info("found in an earlier plan"))
                .named("needs-found")
                .when(Guard::attribute("found")),
        )
        .unwrap();
    let path = UpgradePath::new(vec![first, second]).unwrap();

    let run = TransformationEngine::new().run_upgrade_path(dir.path(), &path).unwrap();
    assert!(run.is_successful());
    assert_eq!(run.runs[0].context.get("found"), Some(&Value::Bool(true)));
    assert_eq!(run.runs[1].context.get("found"), None);
    assert!(matches!(
        run.runs[1].context.result("needs-found"),
        Some(PerformResult::SkippedCondition { .. })
    ));
    assert_eq!(run.statistics().skipped_condition_count, 1);
}

#[test]
fn test_abort_stops_the_chain() {
    let dir = folder();
    let mut broken = hop("2", "3");
    broken
        .add(
            Step::utility(Abort::new("version 3 needs a manual database migration"))
                .named("stop")
                .when(Guard::condition_at(
                    PropertyExists::new("version").with_value("3").unwrap(),
                    chrysalis::Target::relative("app.properties"),
                )),
        )
        .unwrap();
    let path = UpgradePath::new(vec![hop("1", "2"), broken, hop("3", "4")]).unwrap();

    let run = TransformationEngine::new().run_upgrade_path(dir.path(), &path).unwrap();
    assert!(!run.is_successful());
    // The aborting plan's run is included
    assert_eq!(run.runs.len(), 2);
    let completed: Vec<_> = run.metrics().into_iter().filter(|m| m.successful).collect();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].plan_name, "1-to-2");
    let details = run.abort_details().unwrap();
    assert_eq!(details.plan_name, "2-to-3");
    assert_eq!(details.plan_kind, "UpgradeStep");
    assert_eq!(details.abort_message, "version 3 needs a manual database migration");
    assert_eq!(
        fs::read_to_string(dir.path().join("app.properties")).unwrap(),
        "version=3\n"
    );
}

#[test]
fn test_manual_instructions_collected_across_plans() {
    let dir = folder();
    let mut first = hop("1", "2");
    first
        .add(Step::utility(ManualInstruction::new("Review logging", "docs/logging.md")))
        .unwrap();
    let mut second = hop("2", "3");
    second
        .add(Step::utility(ManualInstruction::new("Rotate secrets", "docs/secrets.md")))
        .unwrap();
    let path = UpgradePath::new(vec![first, second]).unwrap();

    let run = TransformationEngine::new().run_upgrade_path(dir.path(), &path).unwrap();
    let instructions = run.manual_instructions();
    assert_eq!(instructions.len(), 2);
    assert_eq!(instructions[0].plan_name, "1-to-2");
    assert_eq!(instructions[1].plan_name, "2-to-3");
    assert_eq!(run.statistics().manual_instructions_count, 2);
}
