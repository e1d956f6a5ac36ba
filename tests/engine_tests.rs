//! Engine Integration Tests
//!
//! End-to-end runs of plans against temporary application folders.

use chrysalis::condition::Guard;
use chrysalis::utilities::{
    AddLine, AddProperty, DeleteFile, FileExists, FindFile, FindFiles, Log, ResultCondition, StringFormat,
};
use chrysalis::{
    MultipleOperations, PerformResult, RunStage, Step, StepGroup, StepLoop, Target, TransformationEngine,
    TransformationPlan, Value,
};
use std::collections::BTreeMap;
use std::fs;
use tempfile::TempDir;

fn app(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, content) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
    dir
}

fn cleanup_plan() -> TransformationPlan {
    let mut plan = TransformationPlan::new("cleanup", "Delete a.txt and add x=1");
    plan.add(
        Step::operation(DeleteFile)
            .relative("a.txt")
            .when(Guard::condition(FileExists)),
    )
    .unwrap();
    plan.add(Step::operation(AddLine::new("x=1")).relative("app.properties"))
        .unwrap();
    plan
}

// =============================================================================
// Guarded operations
// =============================================================================

#[test]
fn test_guarded_delete_when_file_exists() {
    let dir = app(&[("a.txt", "old"), ("app.properties", "a=1\n")]);
    let run = TransformationEngine::new().run(dir.path(), &cleanup_plan()).unwrap();

    assert!(run.is_successful());
    assert!(!dir.path().join("a.txt").exists());
    assert_eq!(
        fs::read_to_string(dir.path().join("app.properties")).unwrap(),
        "a=1\nx=1\n"
    );

    let stats = run.statistics();
    assert_eq!(stats.operations_count, 2);
    assert_eq!(stats.operation_success_count, 2);
    assert_eq!(stats.error_count(), 0);
    assert!(run.abort_details().is_none());
}

#[test]
fn test_guarded_delete_skipped_when_file_missing() {
    let dir = app(&[("app.properties", "a=1\n")]);
    let run = TransformationEngine::new().run(dir.path(), &cleanup_plan()).unwrap();

    assert!(run.is_successful());
    let stats = run.statistics();
    assert_eq!(stats.skipped_condition_count, 1);
    assert_eq!(stats.operations_count, 1);
    assert!(matches!(
        run.context.result("cleanup-1-DeleteFile"),
        Some(PerformResult::SkippedCondition { .. })
    ));
    // A skipped step leaves no value behind
    assert!(!run.context.contains("cleanup-1-DeleteFile"));
}

// =============================================================================
// Abort
// =============================================================================

#[test]
fn test_abort_stops_remaining_steps() {
    let dir = app(&[("app.properties", "a=1\n")]);
    let mut plan = TransformationPlan::new("five", "Abort at the third step");
    plan.log("one").unwrap();
    plan.log("two").unwrap();
    // The attribute is never set, so the target cannot resolve
    plan.add(
        Step::operation(DeleteFile)
            .absolute("no_such_attribute")
            .named("third")
            .abort_with("cannot locate the build file"),
    )
    .unwrap();
    plan.add(Step::operation(AddLine::new("never")).relative("app.properties").named("fourth"))
        .unwrap();
    plan.log("five").unwrap();

    let run = TransformationEngine::new().run(dir.path(), &plan).unwrap();
    assert!(!run.is_successful());
    assert_eq!(run.stage, RunStage::Aborted);

    let details = run.abort_details().unwrap();
    assert_eq!(details.utility_name, "third");
    assert_eq!(details.abort_message, "cannot locate the build file");
    assert_eq!(details.plan_name, "five");

    // Only the first three steps are counted
    let stats = run.statistics();
    assert_eq!(stats.steps_count(), 3);
    assert_eq!(stats.utilities_count, 2);
    assert_eq!(stats.utility_value_count, 2);
    assert_eq!(stats.operations_count, 1);
    assert_eq!(stats.operation_error_count, 1);
    assert_eq!(stats.error_count(), 1);

    assert!(run.context.has_result("third"));
    assert!(!run.context.has_result("fourth"));
    assert!(!run.context.has_result("five-5-Log"));
    assert_eq!(
        fs::read_to_string(dir.path().join("app.properties")).unwrap(),
        "a=1\n"
    );
}

#[test]
fn test_failure_without_abort_continues() {
    let dir = app(&[("app.properties", "a=1\n")]);
    let mut plan = TransformationPlan::new("lenient", "Errors do not stop the run");
    plan.add(Step::operation(AddLine::new("x")).relative("missing.txt").named("bad"))
        .unwrap();
    plan.add(Step::operation(AddLine::new("b=2")).relative("app.properties"))
        .unwrap();

    let run = TransformationEngine::new().run(dir.path(), &plan).unwrap();
    assert!(run.is_successful());
    assert!(run.context.result("bad").unwrap().is_failure());
    assert_eq!(run.statistics().operation_error_count, 1);
    assert_eq!(run.statistics().operation_success_count, 1);
}

// =============================================================================
// Fan-out
// =============================================================================

#[test]
fn test_fan_out_over_union_of_file_sets() {
    let dir = app(&[
        ("conf/a.properties", "k=1\n"),
        ("conf/b.properties", "k=2\n"),
        ("extra/c.properties", "k=3\n"),
    ]);
    let mut plan = TransformationPlan::new("fan", "Add a property everywhere");
    plan.add(
        Step::utility(FindFiles::new().named(r".*\.properties").unwrap())
            .relative("conf")
            .result_attribute("conf_files"),
    )
    .unwrap();
    plan.add(
        Step::utility(FindFiles::new().recursive(true).named(r"[ab]\.properties").unwrap())
            .relative(".")
            .result_attribute("ab_files"),
    )
    .unwrap();
    let fan = plan
        .add(Step::multiple(
            MultipleOperations::new(Step::operation(AddProperty::new("env", "prod")), ["conf_files", "ab_files"])
                .unwrap(),
        ))
        .unwrap();

    let run = TransformationEngine::new().run(dir.path(), &plan).unwrap();
    assert!(run.is_successful());

    // Two distinct files, each edited once
    for file in ["conf/a.properties", "conf/b.properties"] {
        let text = fs::read_to_string(dir.path().join(file)).unwrap();
        assert_eq!(text.matches("env=prod").count(), 1, "{file}");
    }
    assert!(!fs::read_to_string(dir.path().join("extra/c.properties")).unwrap().contains("env"));

    let children = vec![
        Value::from(format!("{fan}-1-AddProperty")),
        Value::from(format!("{fan}-2-AddProperty")),
    ];
    assert_eq!(run.context.get(&fan), Some(&Value::List(children)));
    assert!(run.context.has_result(&format!("{fan}-2-AddProperty")));
    assert!(!run.context.has_result(&format!("{fan}-3-AddProperty")));
    assert_eq!(run.statistics().operations_count, 2);
}

#[test]
fn test_fan_out_over_nothing_found() {
    let dir = app(&[("readme.md", "hi")]);
    let mut plan = TransformationPlan::new("empty-fan", "No matches");
    plan.add(
        Step::utility(FindFiles::new().named(r".*\.xml").unwrap())
            .relative(".")
            .result_attribute("xml"),
    )
    .unwrap();
    let fan = plan.add_multiple(Step::operation(DeleteFile), ["xml"]).unwrap();

    let run = TransformationEngine::new().run(dir.path(), &plan).unwrap();
    assert!(run.is_successful());
    assert!(run.context.has_result(&fan));
    assert!(!run.context.has_result(&format!("{fan}-1-DeleteFile")));
    assert_eq!(run.statistics().operations_count, 0);
}

// =============================================================================
// Dependencies, groups, loops, properties
// =============================================================================

#[test]
fn test_dependency_on_skipped_step() {
    let dir = app(&[("app.properties", "a=1\n")]);
    let mut plan = TransformationPlan::new("deps", "Dependency chain");
    plan.add(
        Step::operation(DeleteFile)
            .relative("a.txt")
            .named("delete")
            .when(Guard::condition(FileExists)),
    )
    .unwrap();
    plan.add(
        Step::operation(AddLine::new("deleted=true"))
            .relative("app.properties")
            .named("mark")
            .depends_on("delete"),
    )
    .unwrap();
    plan.add(
        Step::operation(AddLine::new("after=true"))
            .relative("app.properties")
            .named("after")
            .depends_on("mark"),
    )
    .unwrap();

    let run = TransformationEngine::new().run(dir.path(), &plan).unwrap();
    // Skips cascade down the dependency chain
    assert!(matches!(
        run.context.result("mark"),
        Some(PerformResult::SkippedDependency { .. })
    ));
    assert!(matches!(
        run.context.result("after"),
        Some(PerformResult::SkippedDependency { .. })
    ));
    assert_eq!(run.statistics().skipped_condition_count, 1);
    assert_eq!(run.statistics().skipped_dependency_count, 2);
    assert_eq!(
        fs::read_to_string(dir.path().join("app.properties")).unwrap(),
        "a=1\n"
    );
    assert!(run.is_successful());
}

#[test]
fn test_result_condition_guard() {
    let dir = app(&[("app.properties", "a=1\n")]);
    let mut plan = TransformationPlan::new("result-guard", "Run only if a step executed");
    plan.add(Step::operation(AddLine::new("b=2")).relative("app.properties").named("first"))
        .unwrap();
    plan.add(
        Step::operation(AddLine::new("c=3"))
            .relative("app.properties")
            .named("second")
            .when(Guard::condition(ResultCondition::executed("first"))),
    )
    .unwrap();
    plan.add(
        Step::operation(AddLine::new("d=4"))
            .relative("app.properties")
            .named("third")
            .when(Guard::condition(ResultCondition::executed("nobody"))),
    )
    .unwrap();

    let run = TransformationEngine::new().run(dir.path(), &plan).unwrap();
    assert_eq!(
        fs::read_to_string(dir.path().join("app.properties")).unwrap(),
        "a=1\nb=2\nc=3\n"
    );
    assert_eq!(run.statistics().skipped_condition_count, 1);
}

#[test]
fn test_group_and_loop() {
    let dir = app(&[("app.properties", "")]);
    let mut plan = TransformationPlan::new("composite", "Group then loop");
    let group = plan
        .add(
            Step::group(
                StepGroup::new()
                    .with(Step::operation(AddLine::new("one")).relative("app.properties"))
                    .with(Step::operation(AddLine::new("two")).relative("app.properties")),
            )
            .named("lines"),
        )
        .unwrap();
    plan.add(
        Step::repeat(
            StepLoop::times(Step::operation(AddLine::new("again")).relative("app.properties"), 3).unwrap(),
        )
        .named("repeat"),
    )
    .unwrap();

    let run = TransformationEngine::new().run(dir.path(), &plan).unwrap();
    assert!(run.is_successful());
    assert_eq!(
        fs::read_to_string(dir.path().join("app.properties")).unwrap(),
        "one\ntwo\nagain\nagain\nagain\n"
    );
    assert!(run.context.has_result(&format!("{group}-1-AddLine")));
    assert!(run.context.has_result(&format!("{group}-2-AddLine")));
    assert_eq!(run.context.get("repeat"), Some(&Value::Integer(3)));
}

#[test]
fn test_properties_reach_steps_and_formats_use_context() {
    let dir = app(&[("app.properties", "a=1\n")]);
    let mut plan = TransformationPlan::new("fmt", "Format from context");
    plan.add(
        Step::utility(FindFiles::new().named(r".*\.properties").unwrap())
            .relative(".")
            .result_attribute("props"),
    )
    .unwrap();
    plan.add(Step::utility(StringFormat::new("found {}", ["props"])).named("message"))
        .unwrap();
    plan.add(Step::utility(Log::info("{}").with_attributes(["message"])).named("log"))
        .unwrap();

    let mut properties = BTreeMap::new();
    properties.insert("env".to_string(), "prod".to_string());
    let engine = TransformationEngine::new().with_properties(properties);
    let run = engine.run(dir.path(), &plan).unwrap();

    assert!(run.is_successful());
    let message = run.context.get_text("message").unwrap();
    assert!(message.starts_with("found "));
    assert!(message.contains("app.properties"));
    // Log does not save its value
    assert!(!run.context.contains("log"));
    assert_eq!(engine.properties().get("env").map(String::as_str), Some("prod"));
}

#[test]
fn test_attribute_target_from_found_file() {
    let dir = app(&[("conf/app.properties", "a=1\n")]);
    let mut plan = TransformationPlan::new("attr", "Attribute targets");
    plan.add(
        Step::utility(FindFile::named("app.properties"))
            .relative(".")
            .result_attribute("props_file"),
    )
    .unwrap();
    plan.add(Step::operation(AddLine::new("b=2")).at(Target::attribute("props_file")))
        .unwrap();

    let run = TransformationEngine::new().run(dir.path(), &plan).unwrap();
    assert!(run.is_successful());
    assert_eq!(
        fs::read_to_string(dir.path().join("conf/app.properties")).unwrap(),
        "a=1\nb=2\n"
    );
    assert_eq!(run.statistics().operation_success_count, 1);
}
