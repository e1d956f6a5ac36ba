//! Transformation Plan
//!
//! An ordered list of steps built before execution. Adding a step registers it:
//! it gets its 1-based order, a derived name if it has none, and its name is
//! checked against every name already in the plan. Children of group steps are
//! registered in the same name space.
//!
//! # Design
//!
//! - **Declarative**: building a plan never touches the file system
//! - **Unique names**: duplicate step names are rejected at `add` time
//! - **Lenient targets**: a step without a target is reported by `validate`
//!   but still accepted; the engine turns it into an ERROR result at run time

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use crate::step::{Action, MultipleOperations, Step};
use crate::utilities::Log;

/// Plan definition errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A step name is already used in the plan
    #[error("step name '{name}' is already registered in plan '{plan}'")]
    DuplicateName { plan: String, name: String },

    /// A step or composite was configured in a way that cannot run
    #[error("invalid step definition: {0}")]
    Definition(String),
}

/// The version increment an upgrade plan performs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionHop {
    pub from: String,
    pub to: String,
}

/// Problems `validate` finds without failing the plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanIssue {
    /// The step needs a target but has none
    UnsetTarget { step: String },
    /// The step depends on a name that is not registered before it
    UnknownDependency { step: String, dependency: String },
}

impl PlanIssue {
    /// Unset targets still fail at run time, so they do not invalidate the plan
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::UnsetTarget { .. })
    }
}

impl fmt::Display for PlanIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsetTarget { step } => write!(f, "step '{step}' requires a target but has none"),
            Self::UnknownDependency { step, dependency } => write!(
                f,
                "step '{step}' depends on '{dependency}', which is not registered before it"
            ),
        }
    }
}

/// An ordered, declarative sequence of steps
#[derive(Debug, Clone)]
pub struct TransformationPlan {
    name: String,
    description: String,
    application_type: Option<String>,
    upgrade: Option<VersionHop>,
    steps: Vec<Step>,
    names: HashSet<String>,
}

impl TransformationPlan {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            application_type: None,
            upgrade: None,
            steps: Vec::new(),
            names: HashSet::new(),
        }
    }

    pub fn with_application_type(mut self, application_type: impl Into<String>) -> Self {
        self.application_type = Some(application_type.into());
        self
    }

    /// Mark the plan as one version increment of an upgrade path
    pub fn with_versions(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.upgrade = Some(VersionHop {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Register a step at the end of the plan, returning its name
    pub fn add(&mut self, mut step: Step) -> Result<String, PlanError> {
        let order = self.steps.len() + 1;
        step.assign(&self.name, order, false);

        let mut names = Vec::new();
        register_tree(&mut step, &mut names);

        {
            let mut seen = HashSet::new();
            for name in &names {
                if self.names.contains(name) || !seen.insert(name.as_str()) {
                    return Err(PlanError::DuplicateName {
                        plan: self.name.clone(),
                        name: name.clone(),
                    });
                }
            }
        }

        self.names.extend(names);
        let name = step.name().to_string();
        tracing::debug!(plan = %self.name, step = %name, order, "Step registered");
        self.steps.push(step);
        Ok(name)
    }

    /// Register a fan-out of `template` over the files held by `attributes`
    pub fn add_multiple<I, S>(&mut self, template: Step, attributes: I) -> Result<String, PlanError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add(Step::multiple(MultipleOperations::new(template, attributes)?))
    }

    /// Register an info-level log step
    pub fn log(&mut self, message: impl Into<String>) -> Result<String, PlanError> {
        self.add(Step::utility(Log::info(message)))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn application_type(&self) -> Option<&str> {
        self.application_type.as_deref()
    }

    pub fn upgrade(&self) -> Option<&VersionHop> {
        self.upgrade.as_ref()
    }

    #[inline]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether a step (or group child) with this name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Definition problems that will surface as ERROR or skipped results at run time
    pub fn validate(&self) -> Vec<PlanIssue> {
        let mut issues = Vec::new();
        let mut earlier = HashSet::new();
        for step in &self.steps {
            check_tree(step, &mut earlier, &mut issues);
        }
        issues
    }

    /// Human-readable one-line-per-step listing
    pub fn summary(&self) -> String {
        let mut lines = vec![format!("{} ({} steps): {}", self.name, self.steps.len(), self.description)];
        for step in &self.steps {
            summarize(step, 1, &mut lines);
        }
        lines.join("\n")
    }
}

fn register_tree(step: &mut Step, names: &mut Vec<String>) {
    let parent = step.name().to_string();
    names.push(parent.clone());
    if let Action::Group(group) = step.action_mut() {
        for (i, child) in group.steps_mut().iter_mut().enumerate() {
            child.assign(&parent, i + 1, true);
            register_tree(child, names);
        }
    }
}

fn check_tree<'a>(step: &'a Step, earlier: &mut HashSet<&'a str>, issues: &mut Vec<PlanIssue>) {
    if step.requires_target() && !step.target().is_set() {
        issues.push(PlanIssue::UnsetTarget {
            step: step.name().to_string(),
        });
    }
    for dependency in step.dependencies() {
        if !earlier.contains(dependency.as_str()) {
            issues.push(PlanIssue::UnknownDependency {
                step: step.name().to_string(),
                dependency: dependency.clone(),
            });
        }
    }
    earlier.insert(step.name());
    if let Action::Group(group) = step.action() {
        for child in group.steps() {
            check_tree(child, earlier, issues);
        }
    }
}

fn summarize(step: &Step, depth: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    lines.push(format!("{indent}{}. {}: {}", step.order(), step.name(), step.description()));
    if let Action::Group(group) = step.action() {
        for child in group.steps() {
            summarize(child, depth + 1, lines);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepGroup;
    use crate::utilities::{AddLine, DeleteFile};

    #[test]
    fn test_add_assigns_order_and_names() {
        let mut plan = TransformationPlan::new("plan", "test");
        let first = plan.add(Step::operation(DeleteFile).relative("a.txt")).unwrap();
        let second = plan.add(Step::operation(AddLine::new("x=1")).relative("b").named("add")).unwrap();

        assert_eq!(first, "plan-1-DeleteFile");
        assert_eq!(second, "add");
        assert_eq!(plan.steps()[1].order(), 2);
        assert_eq!(plan.steps()[0].parent(), None);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut plan = TransformationPlan::new("plan", "test");
        plan.add(Step::operation(DeleteFile).relative("a").named("same")).unwrap();
        let err = plan.add(Step::operation(DeleteFile).relative("b").named("same")).unwrap_err();
        assert_eq!(
            err,
            PlanError::DuplicateName {
                plan: "plan".into(),
                name: "same".into()
            }
        );
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_group_children_registered() {
        let mut plan = TransformationPlan::new("plan", "test");
        let group = StepGroup::new()
            .with(Step::operation(DeleteFile).relative("a"))
            .with(Step::operation(DeleteFile).relative("b"));
        let name = plan.add(Step::group(group).named("cleanup")).unwrap();

        assert_eq!(name, "cleanup");
        assert!(plan.contains("cleanup-1-DeleteFile"));
        assert!(plan.contains("cleanup-2-DeleteFile"));

        let clash = plan.add(Step::operation(DeleteFile).relative("c").named("cleanup-2-DeleteFile"));
        assert!(clash.is_err());
    }

    #[test]
    fn test_duplicates_inside_one_group_rejected() {
        let mut plan = TransformationPlan::new("plan", "test");
        let group = StepGroup::new()
            .with(Step::operation(DeleteFile).relative("a").named("x"))
            .with(Step::operation(DeleteFile).relative("b").named("x"));
        assert!(plan.add(Step::group(group)).is_err());
        assert!(plan.is_empty());
    }

    #[test]
    fn test_validate_reports_unset_targets_and_dependencies() {
        let mut plan = TransformationPlan::new("plan", "test");
        plan.add(Step::operation(DeleteFile).named("no-target")).unwrap();
        plan.add(Step::operation(DeleteFile).relative("a").depends_on("later")).unwrap();
        plan.add(Step::operation(DeleteFile).relative("b").named("later")).unwrap();

        let issues = plan.validate();
        assert_eq!(issues.len(), 2);
        assert!(matches!(&issues[0], PlanIssue::UnsetTarget { step } if step == "no-target"));
        assert!(matches!(&issues[1], PlanIssue::UnknownDependency { dependency, .. } if dependency == "later"));

        // Only the unknown dependency invalidates the plan
        assert!(issues[0].is_warning());
        assert!(!issues[1].is_warning());
    }

    #[test]
    fn test_summary_lists_steps() {
        let mut plan = TransformationPlan::new("plan", "Demo plan");
        plan.add(Step::operation(DeleteFile).relative("a.txt")).unwrap();
        let summary = plan.summary();
        assert!(summary.starts_with("plan (1 steps): Demo plan"));
        assert!(summary.contains("1. plan-1-DeleteFile: Delete file (a.txt)"));
    }
}
