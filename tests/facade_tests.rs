//! Facade Integration Tests
//!
//! JSON plan documents run through the `Transformer`, the way the binary
//! drives them.

use chrysalis::{Configuration, PlanDocument, PlanRegistry, TransformationRequest, TransformationResult, Transformer};
use std::fs;
use std::path::{Path, PathBuf};

const MIGRATION: &str = r#"{
    "name": "logging-migration",
    "description": "Move to the structured logging backend",
    "plans": [{
        "name": "logging-migration",
        "description": "Swap the logging properties",
        "application_type": "service",
        "steps": [
            { "type": "FindFiles", "name": "find-props", "relative": "conf", "name_pattern": ".*\\.properties",
              "result_attribute": "props" },
            { "type": "MultipleOperations", "name": "drop-legacy", "files": ["props"],
              "step": { "type": "RemoveProperty", "key": "log.legacy" } },
            { "type": "PropertyExists", "name": "has-backend", "relative": "conf/app.properties",
              "key": "log.backend" },
            { "type": "AddProperty", "relative": "conf/app.properties", "key": "log.backend", "value": "structured",
              "execute_unless": "has-backend" },
            { "type": "ManualInstruction", "instruction": "Check dashboards", "resource": "docs/dashboards.md",
              "depends_on": ["drop-legacy"] }
        ]
    }]
}"#;

const UPGRADE: &str = r#"{
    "name": "framework-upgrade",
    "description": "Framework 1 to 3",
    "plans": [
        { "name": "v1-to-v2", "from_version": "1", "to_version": "2", "steps": [
            { "type": "ReplaceText", "relative": "build.txt", "regex": "framework:1", "replacement": "framework:2" }
        ] },
        { "name": "v2-to-v3", "from_version": "2", "to_version": "3", "steps": [
            { "type": "FileExists", "name": "legacy", "relative": "legacy.cfg" },
            { "type": "Abort", "message": "remove legacy.cfg first", "execute_if": "legacy" },
            { "type": "ReplaceText", "relative": "build.txt", "regex": "framework:2", "replacement": "framework:3" }
        ] }
    ]
}"#;

fn application(parent: &Path) -> PathBuf {
    let app = parent.join("service");
    fs::create_dir_all(app.join("conf")).unwrap();
    fs::write(app.join("conf/app.properties"), "name=svc\nlog.legacy=true\n").unwrap();
    fs::write(app.join("conf/extra.properties"), "log.legacy=false\n").unwrap();
    fs::write(app.join("build.txt"), "dependency framework:1\n").unwrap();
    app
}

fn request(json: &str) -> TransformationRequest {
    PlanDocument::from_json(json).unwrap().build(None).unwrap()
}

#[test]
fn test_document_runs_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let app = application(dir.path());

    let result = Transformer::new()
        .transform(&app, &request(MIGRATION), &Configuration::new())
        .unwrap();

    assert!(result.successful);
    assert_eq!(result.transformed_application_location, app);
    assert_eq!(
        fs::read_to_string(app.join("conf/app.properties")).unwrap(),
        "name=svc\nlog.backend=structured\n"
    );
    assert_eq!(fs::read_to_string(app.join("conf/extra.properties")).unwrap(), "");
    assert_eq!(result.manual_instructions.len(), 1);
    assert_eq!(result.manual_instructions[0].plan_name, "logging-migration");
    assert!(app.join("MANUAL_INSTRUCTIONS.md").is_file());
    assert_eq!(result.metrics[0].application_type.as_deref(), Some("service"));
}

#[test]
fn test_second_run_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let app = application(dir.path());
    let transformer = Transformer::new();
    let config = Configuration::new();

    transformer.transform(&app, &request(MIGRATION), &config).unwrap();
    let before = fs::read_to_string(app.join("conf/app.properties")).unwrap();
    let second = transformer.transform(&app, &request(MIGRATION), &config).unwrap();

    assert!(second.successful);
    assert_eq!(fs::read_to_string(app.join("conf/app.properties")).unwrap(), before);
    assert_eq!(second.statistics.skipped_condition_count, 1);
    assert_eq!(second.statistics.operation_success_count, 0);
}

#[test]
fn test_upgrade_document_with_output_folder() {
    let dir = tempfile::tempdir().unwrap();
    let app = application(dir.path());
    let out = dir.path().join("out");
    fs::create_dir_all(&out).unwrap();

    let config = Configuration::new().with_output_folder(&out);
    let result = Transformer::new().transform(&app, &request(UPGRADE), &config).unwrap();

    assert!(result.successful);
    assert!(result.upgrade_correlation_id.is_some());
    assert_eq!(result.metrics.len(), 2);
    assert_eq!(result.request_name, "upgrade-1-to-3");
    assert!(result.transformed_application_location.starts_with(&out));
    assert_eq!(
        fs::read_to_string(result.transformed_application_location.join("build.txt")).unwrap(),
        "dependency framework:3\n"
    );
    // The original is untouched
    assert_eq!(fs::read_to_string(app.join("build.txt")).unwrap(), "dependency framework:1\n");
}

#[test]
fn test_upgrade_document_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let app = application(dir.path());
    fs::write(app.join("legacy.cfg"), "old").unwrap();

    let result = Transformer::new()
        .transform(&app, &request(UPGRADE), &Configuration::new())
        .unwrap();

    assert!(!result.successful);
    let details = result.abort_details.as_ref().unwrap();
    assert_eq!(details.abort_message, "remove legacy.cfg first");
    assert_eq!(details.plan_name, "v2-to-v3");
    assert_eq!(result.metrics.len(), 2);
    assert_eq!(fs::read_to_string(app.join("build.txt")).unwrap(), "dependency framework:2\n");
}

#[test]
fn test_registry_request_and_result_file() {
    let dir = tempfile::tempdir().unwrap();
    let plans = dir.path().join("plans");
    fs::create_dir_all(&plans).unwrap();
    fs::write(plans.join("migration.json"), MIGRATION).unwrap();
    fs::write(plans.join("upgrade.json"), UPGRADE).unwrap();

    let mut registry = PlanRegistry::new();
    assert_eq!(registry.load_from_directory(&plans).unwrap(), 2);
    assert_eq!(registry.names().collect::<Vec<_>>(), vec!["framework-upgrade", "logging-migration"]);

    let app = application(dir.path());
    let request = registry.request("framework-upgrade", Some("2")).unwrap();
    let result = Transformer::new()
        .transform(&app, &request, &Configuration::new().with_zip_output(true))
        .unwrap();
    assert!(result.successful);
    assert_eq!(result.metrics.len(), 1);
    assert!(result.transformed_application_location.to_string_lossy().ends_with(".zip"));

    let result_file = dir.path().join("result.json");
    result.save_to_file(&result_file).unwrap();
    let loaded: TransformationResult = serde_json::from_str(&fs::read_to_string(&result_file).unwrap()).unwrap();
    assert_eq!(loaded.id, result.id);
    assert_eq!(loaded.request_name, "upgrade-1-to-2");
}
