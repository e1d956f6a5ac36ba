//! Declarative Plan Documents
//!
//! Plans described as JSON instead of Rust code. A document holds one or more
//! plans; each step is an object with a `type` tag, the common step fields and
//! the fields of its type.
//!
//! ```json
//! {
//!   "name": "spring-upgrade",
//!   "description": "Spring 5 to 6",
//!   "plans": [{
//!     "name": "5-to-6", "description": "...", "from_version": "5", "to_version": "6",
//!     "steps": [
//!       { "type": "FileExists", "relative": "pom.xml", "result_attribute": "maven" },
//!       { "type": "AddLine", "relative": "app.properties", "line": "x=1", "execute_if": "maven" }
//!     ]
//!   }]
//! }
//! ```
//!
//! A document whose single plan declares no versions builds a plain plan; a
//! document whose plans all declare versions builds an upgrade path.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::condition::{Condition, Guard, Mode, MultipleConditions};
use crate::facade::TransformationRequest;
use crate::plan::{PlanError, TransformationPlan};
use crate::result::{OperationResultKind, PerformResultKind, UtilityResultKind};
use crate::step::{Action, MultipleOperations, Step, StepGroup, StepLoop, Target};
use crate::upgrade::{UpgradePath, UpgradePathError};
use crate::utilities::{
    Abort, AddLine, AddProperty, CompareFiles, CopyFile, DeleteFile, FileExists, FilterFiles, FindFile, FindFiles,
    InsertLine, LoadFile, Log, LogLevel, ManualInstruction, MapValue, PropertyExists, RegexMatch, RemoveLine,
    RemoveProperty, RenameFile, ReplaceText, ResultCondition, StringFormat,
};

/// Errors that can occur when loading or building plan documents
#[derive(Error, Debug)]
pub enum PlanFileError {
    /// Reading the document failed
    #[error("Failed to read plan document: {reason}")]
    Io { reason: String },

    /// The document is not valid JSON for this format
    #[error("Invalid plan document: {0}")]
    Parse(#[from] serde_json::Error),

    /// A regex field does not compile
    #[error("Invalid regular expression '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },

    /// The document is well-formed but cannot describe a runnable request
    #[error("Invalid plan definition: {0}")]
    Definition(String),

    /// No registered document has this name
    #[error("Plan document not found: {name}")]
    NotFound { name: String },

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    UpgradePath(#[from] UpgradePathError),
}

impl From<std::io::Error> for PlanFileError {
    fn from(err: std::io::Error) -> Self {
        PlanFileError::Io {
            reason: err.to_string(),
        }
    }
}

fn regex_error(pattern: &str, err: regex::Error) -> PlanFileError {
    PlanFileError::InvalidRegex {
        pattern: pattern.to_string(),
        reason: err.to_string(),
    }
}

// ============================================================================
// Document Model
// ============================================================================

/// A named set of plans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDocument {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub plans: Vec<PlanDefinition>,
}

/// One plan of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub from_version: Option<String>,
    #[serde(default)]
    pub to_version: Option<String>,
    #[serde(default)]
    pub application_type: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

/// One step: common fields plus a `type`-tagged action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    #[serde(flatten)]
    pub common: CommonFields,
    #[serde(flatten)]
    pub action: ActionDefinition,
}

/// Fields every step type accepts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommonFields {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Target relative to the application root
    pub relative: Option<String>,
    /// Attribute holding an absolute target path
    pub absolute: Option<String>,
    /// Path appended to the `absolute` attribute's path
    pub additional: Option<String>,
    pub execute_if: Option<String>,
    pub execute_unless: Option<String>,
    pub guards: Vec<GuardDefinition>,
    pub depends_on: Vec<String>,
    pub abort_on_failure: Option<bool>,
    pub abort_message: Option<String>,
    pub save_result: Option<bool>,
    pub result_attribute: Option<String>,
}

/// A condition guard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardDefinition {
    pub condition: ConditionDefinition,
    #[serde(default)]
    pub relative: Option<String>,
    #[serde(default)]
    pub absolute: Option<String>,
    #[serde(default)]
    pub negate: bool,
}

/// Built-in conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConditionDefinition {
    FileExists,
    RegexMatch {
        regex: String,
    },
    PropertyExists {
        key: String,
        #[serde(default)]
        value: Option<String>,
    },
    CompareFiles {
        attribute: String,
    },
    ResultCondition {
        step: String,
        #[serde(default = "default_perform_kind")]
        result: PerformResultKind,
        #[serde(default)]
        utility_kinds: Vec<UtilityResultKind>,
        #[serde(default)]
        operation_kinds: Vec<OperationResultKind>,
    },
    MultipleConditions {
        condition: Box<ConditionDefinition>,
        files: Vec<String>,
        #[serde(default)]
        mode: Mode,
    },
}

fn default_perform_kind() -> PerformResultKind {
    PerformResultKind::ExecutionResult
}

fn default_true() -> bool {
    true
}

/// Step actions, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ActionDefinition {
    // Conditions run as steps
    Condition {
        condition: ConditionDefinition,
    },
    FileExists,
    RegexMatch {
        regex: String,
    },
    PropertyExists {
        key: String,
        #[serde(default)]
        value: Option<String>,
    },
    CompareFiles {
        attribute: String,
    },

    // Utilities
    FindFiles {
        /// Whole-name regex
        #[serde(default)]
        name_pattern: Option<String>,
        /// Whole-path regex, matched against the path relative to the target
        #[serde(default)]
        path_pattern: Option<String>,
        #[serde(default)]
        recursive: bool,
        #[serde(default = "default_true")]
        files: bool,
        #[serde(default)]
        folders: bool,
    },
    FindFile {
        file_name: String,
    },
    LoadFile,
    FilterFiles {
        attribute: String,
        condition: ConditionDefinition,
    },
    MapValue {
        attribute: String,
        key: String,
    },
    StringFormat {
        format: String,
        #[serde(default)]
        attributes: Vec<String>,
    },
    Log {
        message: String,
        #[serde(default)]
        level: LogLevel,
        #[serde(default)]
        attributes: Vec<String>,
    },
    Abort {
        message: String,
    },
    ManualInstruction {
        instruction: String,
        resource: String,
    },

    // Operations
    AddLine {
        line: String,
    },
    InsertLine {
        line: String,
        #[serde(default)]
        line_number: Option<usize>,
        #[serde(default)]
        after: Option<String>,
        #[serde(default)]
        before: Option<String>,
        #[serde(default)]
        all: bool,
    },
    RemoveLine {
        regex: String,
        #[serde(default)]
        first_only: bool,
    },
    ReplaceText {
        regex: String,
        replacement: String,
        #[serde(default)]
        first_only: bool,
    },
    DeleteFile,
    CopyFile {
        to: String,
    },
    RenameFile {
        to: String,
    },
    AddProperty {
        key: String,
        value: String,
    },
    RemoveProperty {
        key: String,
    },

    // Composites
    Group {
        steps: Vec<StepDefinition>,
    },
    Loop {
        step: Box<StepDefinition>,
        #[serde(default)]
        iterations: Option<usize>,
        #[serde(default)]
        while_attribute: Option<String>,
        #[serde(default)]
        while_condition: Option<GuardDefinition>,
        #[serde(default)]
        max_iterations: Option<usize>,
    },
    MultipleOperations {
        step: Box<StepDefinition>,
        files: Vec<String>,
    },
}

// ============================================================================
// Loading
// ============================================================================

impl PlanDocument {
    /// Load a document from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PlanFileError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Load a document from a JSON string
    pub fn from_json(json: &str) -> Result<Self, PlanFileError> {
        let document: Self = serde_json::from_str(json)?;
        document.validate_structure()?;
        Ok(document)
    }

    fn validate_structure(&self) -> Result<(), PlanFileError> {
        if self.name.trim().is_empty() {
            return Err(PlanFileError::Definition("document name cannot be empty".into()));
        }
        if self.plans.is_empty() {
            return Err(PlanFileError::Definition(format!("document '{}' has no plans", self.name)));
        }
        Ok(())
    }

    /// Build every plan of the document, in order
    pub fn build_plans(&self) -> Result<Vec<TransformationPlan>, PlanFileError> {
        self.plans.iter().map(PlanDefinition::build).collect()
    }

    /// Build the request the document describes
    ///
    /// `up_to` truncates an upgrade path; it is rejected for a plain plan.
    pub fn build(&self, up_to: Option<&str>) -> Result<TransformationRequest, PlanFileError> {
        let versioned = self.plans.iter().filter(|p| p.is_versioned()).count();
        let mut plans = self.build_plans()?;

        if versioned == 0 && plans.len() == 1 {
            if up_to.is_some() {
                return Err(PlanFileError::Definition(format!(
                    "document '{}' is not an upgrade path",
                    self.name
                )));
            }
            return Ok(TransformationRequest::Plan(plans.remove(0)));
        }
        if versioned != plans.len() {
            return Err(PlanFileError::Definition(format!(
                "document '{}' mixes plans with and without versions, or holds several unversioned plans",
                self.name
            )));
        }

        let path = UpgradePath::new(plans)?;
        let path = match up_to {
            Some(version) => path.up_to(version)?,
            None => path,
        };
        Ok(TransformationRequest::UpgradePath(path))
    }
}

impl PlanDefinition {
    fn is_versioned(&self) -> bool {
        self.from_version.is_some() && self.to_version.is_some()
    }

    /// Build and register every step
    pub fn build(&self) -> Result<TransformationPlan, PlanFileError> {
        let mut plan = TransformationPlan::new(&self.name, &self.description);
        if let Some(kind) = &self.application_type {
            plan = plan.with_application_type(kind);
        }
        match (&self.from_version, &self.to_version) {
            (Some(from), Some(to)) => plan = plan.with_versions(from, to),
            (None, None) => {}
            _ => {
                return Err(PlanFileError::Definition(format!(
                    "plan '{}' must declare both from_version and to_version, or neither",
                    self.name
                )));
            }
        }
        for step in &self.steps {
            plan.add(step.build()?)?;
        }
        Ok(plan)
    }
}

// ============================================================================
// Building
// ============================================================================

impl ConditionDefinition {
    pub fn build(&self) -> Result<Arc<dyn Condition>, PlanFileError> {
        let condition: Arc<dyn Condition> = match self {
            Self::FileExists => Arc::new(FileExists),
            Self::RegexMatch { regex } => Arc::new(RegexMatch::new(regex.as_str()).map_err(|e| regex_error(regex, e))?),
            Self::PropertyExists { key, value } => {
                let condition = PropertyExists::new(key);
                Arc::new(match value {
                    Some(pattern) => condition.with_value(pattern).map_err(|e| regex_error(pattern, e))?,
                    None => condition,
                })
            }
            Self::CompareFiles { attribute } => Arc::new(CompareFiles::with(attribute)),
            Self::ResultCondition {
                step,
                result,
                utility_kinds,
                operation_kinds,
            } => Arc::new(
                ResultCondition::new(step, *result)
                    .with_utility_kinds(utility_kinds.iter().copied())
                    .with_operation_kinds(operation_kinds.iter().copied()),
            ),
            Self::MultipleConditions { condition, files, mode } => Arc::new(
                MultipleConditions::from_shared(condition.build()?)
                    .with_files(files.iter().cloned())
                    .with_mode(*mode),
            ),
        };
        Ok(condition)
    }
}

fn target_of(relative: Option<&String>, absolute: Option<&String>, additional: Option<&String>) -> Result<Target, String> {
    match (relative, absolute) {
        (Some(_), Some(_)) => Err("set either 'relative' or 'absolute', not both".to_string()),
        (Some(rel), None) => Ok(Target::relative(rel)),
        (None, Some(attr)) => Ok(match additional {
            Some(extra) => Target::attribute_with(attr, extra),
            None => Target::attribute(attr),
        }),
        (None, None) => Ok(Target::Unset),
    }
}

impl GuardDefinition {
    pub fn build(&self) -> Result<Guard, PlanFileError> {
        let target = target_of(self.relative.as_ref(), self.absolute.as_ref(), None).map_err(PlanFileError::Definition)?;
        let guard = Guard::shared(self.condition.build()?, target);
        Ok(if self.negate { guard.negate() } else { guard })
    }
}

impl StepDefinition {
    /// Build the step with its common fields applied
    pub fn build(&self) -> Result<Step, PlanFileError> {
        let mut step = self.action.build()?;
        let c = &self.common;

        if let Some(name) = &c.name {
            step = step.named(name);
        }
        if let Some(description) = &c.description {
            step = step.described(description);
        }
        let target = target_of(c.relative.as_ref(), c.absolute.as_ref(), c.additional.as_ref())
            .map_err(|e| PlanFileError::Definition(format!("step {}: {e}", c.name.as_deref().unwrap_or("<unnamed>"))))?;
        if target.is_set() {
            step = step.at(target);
        }
        if let Some(attribute) = &c.execute_if {
            step = step.execute_if(attribute);
        }
        if let Some(attribute) = &c.execute_unless {
            step = step.execute_unless(attribute);
        }
        for guard in &c.guards {
            step = step.when(guard.build()?);
        }
        for dependency in &c.depends_on {
            step = step.depends_on(dependency);
        }
        if let Some(abort) = c.abort_on_failure {
            step = step.abort_on_failure(abort);
        }
        if let Some(message) = &c.abort_message {
            step = step.abort_with(message);
        }
        if let Some(save) = c.save_result {
            step = step.save_result(save);
        }
        if let Some(attribute) = &c.result_attribute {
            step = step.result_attribute(attribute);
        }
        Ok(step)
    }
}

impl ActionDefinition {
    fn build(&self) -> Result<Step, PlanFileError> {
        let step = match self {
            Self::Condition { condition } => Step::new(Action::Condition(condition.build()?)),
            Self::FileExists => Step::condition(FileExists),
            Self::RegexMatch { regex } => {
                Step::condition(RegexMatch::new(regex.as_str()).map_err(|e| regex_error(regex, e))?)
            }
            Self::PropertyExists { key, value } => {
                let condition = ConditionDefinition::PropertyExists {
                    key: key.clone(),
                    value: value.clone(),
                };
                Step::new(Action::Condition(condition.build()?))
            }
            Self::CompareFiles { attribute } => Step::condition(CompareFiles::with(attribute)),

            Self::FindFiles {
                name_pattern,
                path_pattern,
                recursive,
                files,
                folders,
            } => {
                let mut finder = FindFiles::new().recursive(*recursive).include(*files, *folders);
                if let Some(pattern) = name_pattern {
                    finder = finder.named(pattern).map_err(|e| regex_error(pattern, e))?;
                }
                if let Some(pattern) = path_pattern {
                    finder = finder.with_path(pattern).map_err(|e| regex_error(pattern, e))?;
                }
                Step::utility(finder)
            }
            Self::FindFile { file_name } => Step::utility(FindFile::named(file_name)),
            Self::LoadFile => Step::utility(LoadFile),
            Self::FilterFiles { attribute, condition } => {
                Step::utility(FilterFiles::from_shared(attribute, condition.build()?))
            }
            Self::MapValue { attribute, key } => Step::utility(MapValue::new(attribute, key)),
            Self::StringFormat { format, attributes } => {
                Step::utility(StringFormat::new(format, attributes.iter().cloned()))
            }
            Self::Log {
                message,
                level,
                attributes,
            } => Step::utility(Log::new(*level, message).with_attributes(attributes.iter().cloned())),
            Self::Abort { message } => Step::utility(Abort::new(message)),
            Self::ManualInstruction { instruction, resource } => {
                Step::utility(ManualInstruction::new(instruction, resource))
            }

            Self::AddLine { line } => Step::operation(AddLine::new(line)),
            Self::InsertLine {
                line,
                line_number,
                after,
                before,
                all,
            } => {
                let insert = match (line_number, after, before) {
                    (Some(n), None, None) => InsertLine::at_line(line, *n),
                    (None, Some(pattern), None) => {
                        InsertLine::after(line, pattern).map_err(|e| regex_error(pattern, e))?
                    }
                    (None, None, Some(pattern)) => {
                        InsertLine::before(line, pattern).map_err(|e| regex_error(pattern, e))?
                    }
                    _ => {
                        return Err(PlanFileError::Definition(
                            "InsertLine needs exactly one of 'line_number', 'after' or 'before'".into(),
                        ));
                    }
                };
                Step::operation(if *all { insert.all_matches() } else { insert })
            }
            Self::RemoveLine { regex, first_only } => {
                let remove = RemoveLine::new(regex).map_err(|e| regex_error(regex, e))?;
                Step::operation(if *first_only { remove.first_only() } else { remove })
            }
            Self::ReplaceText {
                regex,
                replacement,
                first_only,
            } => {
                let replace = ReplaceText::new(regex, replacement).map_err(|e| regex_error(regex, e))?;
                Step::operation(if *first_only { replace.first_only() } else { replace })
            }
            Self::DeleteFile => Step::operation(DeleteFile),
            Self::CopyFile { to } => Step::operation(CopyFile::to(to)),
            Self::RenameFile { to } => Step::operation(RenameFile::to(to)),
            Self::AddProperty { key, value } => Step::operation(AddProperty::new(key, value)),
            Self::RemoveProperty { key } => Step::operation(RemoveProperty::new(key)),

            Self::Group { steps } => {
                let mut group = StepGroup::new();
                for child in steps {
                    group.push(child.build()?);
                }
                Step::group(group)
            }
            Self::Loop {
                step,
                iterations,
                while_attribute,
                while_condition,
                max_iterations,
            } => {
                let template = step.build()?;
                let mut step_loop = match (iterations, while_attribute, while_condition) {
                    (Some(n), None, None) => StepLoop::times(template, *n)?,
                    (None, Some(attribute), None) => StepLoop::while_attribute(template, attribute),
                    (None, None, Some(guard)) => {
                        let target = target_of(guard.relative.as_ref(), guard.absolute.as_ref(), None)
                            .map_err(PlanFileError::Definition)?;
                        StepLoop::while_shared_condition(template, guard.condition.build()?, target)
                    }
                    _ => {
                        return Err(PlanFileError::Definition(
                            "Loop needs exactly one of 'iterations', 'while_attribute' or 'while_condition'".into(),
                        ));
                    }
                };
                if let Some(max) = max_iterations {
                    step_loop = step_loop.with_max_iterations(*max);
                }
                Step::repeat(step_loop)
            }
            Self::MultipleOperations { step, files } => {
                Step::multiple(MultipleOperations::new(step.build()?, files.iter().cloned())?)
            }
        };
        Ok(step)
    }
}
