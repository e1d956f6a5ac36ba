//! Execution Result Model
//!
//! Immutable outcome values produced by every step.
//!
//! # Layers
//!
//! ```text
//! PerformResult
//! ├── Executed(ExecutionResult)
//! │       ├── Utility(UtilityResult)      VALUE | NULL | WARNING | ERROR
//! │       └── Operation(OperationResult)  SUCCESS | NO_OP | WARNING | ERROR
//! ├── SkippedCondition
//! └── SkippedDependency
//! ```
//!
//! Faults never travel as raw errors past the engine. They are captured as a
//! [`StepFault`] (class, message, cause chain) on the ERROR or WARNING result.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumIter, EnumString};

use crate::error::StepError;
use crate::value::Value;

// ============================================================================
// Faults
// ============================================================================

/// A captured fault: what went wrong, in a form that outlives the error value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFault {
    /// Error class (stable name for known faults, IO kind for IO faults)
    pub class: String,
    /// Top-level message
    pub message: String,
    /// Cause chain, outermost first, not including `message`
    pub causes: Vec<String>,
}

impl StepFault {
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
            causes: Vec::new(),
        }
    }

    /// Capture an `anyhow::Error`, classifying it by the first known error in its chain
    pub fn from_error(err: &anyhow::Error) -> Self {
        let class = err
            .chain()
            .find_map(|cause| {
                if let Some(step) = cause.downcast_ref::<StepError>() {
                    Some(step.class().to_string())
                } else {
                    cause
                        .downcast_ref::<std::io::Error>()
                        .map(|io| format!("Io{:?}", io.kind()))
                }
            })
            .unwrap_or_else(|| "Error".to_string());

        Self {
            class,
            message: err.to_string(),
            causes: err.chain().skip(1).map(ToString::to_string).collect(),
        }
    }

    /// Multi-line trace text: `class: message` then one `caused by:` line per cause
    pub fn trace(&self) -> String {
        let mut lines = vec![format!("{}: {}", self.class, self.message)];
        lines.extend(self.causes.iter().map(|c| format!("  caused by: {c}")));
        lines.join("\n")
    }
}

impl From<StepError> for StepFault {
    fn from(err: StepError) -> Self {
        Self::new(err.class(), err.to_string())
    }
}

impl fmt::Display for StepFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class, self.message)
    }
}

// ============================================================================
// Result Kinds
// ============================================================================

/// Outcome kinds of a read-only utility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum UtilityResultKind {
    Value,
    Null,
    Warning,
    Error,
}

/// Outcome kinds of a mutating operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationResultKind {
    Success,
    NoOp,
    Warning,
    Error,
}

/// Per-step outcome classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PerformResultKind {
    ExecutionResult,
    SkippedCondition,
    SkippedDependency,
}

// ============================================================================
// Utility Results
// ============================================================================

/// Result of a read-only utility (conditions included)
#[derive(Debug, Clone, PartialEq)]
pub enum UtilityResult {
    /// A produced value
    Value { value: Value, details: Option<String> },
    /// Legitimately nothing to return
    Null { details: Option<String> },
    /// Succeeded with caveats; the value may still be null
    Warning {
        value: Value,
        warnings: Vec<StepFault>,
        details: Option<String>,
    },
    /// Failed; no value
    Error { fault: StepFault, details: Option<String> },
}

impl UtilityResult {
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value {
            value: value.into(),
            details: None,
        }
    }

    pub fn null() -> Self {
        Self::Null { details: None }
    }

    pub fn warning(value: impl Into<Value>, warning: StepFault) -> Self {
        Self::Warning {
            value: value.into(),
            warnings: vec![warning],
            details: None,
        }
    }

    pub fn error(fault: impl Into<StepFault>) -> Self {
        Self::Error {
            fault: fault.into(),
            details: None,
        }
    }

    /// Attach a human-readable detail string
    pub fn with_details(mut self, text: impl Into<String>) -> Self {
        let text = Some(text.into());
        match &mut self {
            Self::Value { details, .. }
            | Self::Null { details }
            | Self::Warning { details, .. }
            | Self::Error { details, .. } => *details = text,
        }
        self
    }

    /// Add a warning. VALUE and NULL results become WARNING; ERROR stays ERROR.
    pub fn add_warning(self, warning: StepFault) -> Self {
        match self {
            Self::Value { value, details } => Self::Warning {
                value,
                warnings: vec![warning],
                details,
            },
            Self::Null { details } => Self::Warning {
                value: Value::Null,
                warnings: vec![warning],
                details,
            },
            Self::Warning {
                value,
                mut warnings,
                details,
            } => {
                warnings.push(warning);
                Self::Warning {
                    value,
                    warnings,
                    details,
                }
            }
            err @ Self::Error { .. } => err,
        }
    }

    pub const fn kind(&self) -> UtilityResultKind {
        match self {
            Self::Value { .. } => UtilityResultKind::Value,
            Self::Null { .. } => UtilityResultKind::Null,
            Self::Warning { .. } => UtilityResultKind::Warning,
            Self::Error { .. } => UtilityResultKind::Error,
        }
    }

    /// The produced value, if any
    pub fn value_ref(&self) -> Option<&Value> {
        match self {
            Self::Value { value, .. } | Self::Warning { value, .. } => Some(value),
            Self::Null { .. } | Self::Error { .. } => None,
        }
    }

    pub fn details(&self) -> Option<&str> {
        match self {
            Self::Value { details, .. }
            | Self::Null { details }
            | Self::Warning { details, .. }
            | Self::Error { details, .. } => details.as_deref(),
        }
    }

    pub fn fault(&self) -> Option<&StepFault> {
        match self {
            Self::Error { fault, .. } => Some(fault),
            _ => None,
        }
    }

    pub fn warnings(&self) -> &[StepFault] {
        match self {
            Self::Warning { warnings, .. } => warnings,
            _ => &[],
        }
    }
}

// ============================================================================
// Operation Results
// ============================================================================

/// Result of a mutating operation
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    /// Mutation applied
    Success { details: String },
    /// Mutation correctly skipped (nothing to do)
    NoOp { details: String },
    /// Applied with caveats
    Warning {
        details: String,
        warnings: Vec<StepFault>,
    },
    /// Failed
    Error { fault: StepFault, details: Option<String> },
}

impl OperationResult {
    pub fn success(details: impl Into<String>) -> Self {
        Self::Success {
            details: details.into(),
        }
    }

    pub fn no_op(details: impl Into<String>) -> Self {
        Self::NoOp {
            details: details.into(),
        }
    }

    pub fn warning(details: impl Into<String>, warning: StepFault) -> Self {
        Self::Warning {
            details: details.into(),
            warnings: vec![warning],
        }
    }

    pub fn error(fault: impl Into<StepFault>) -> Self {
        Self::Error {
            fault: fault.into(),
            details: None,
        }
    }

    pub const fn kind(&self) -> OperationResultKind {
        match self {
            Self::Success { .. } => OperationResultKind::Success,
            Self::NoOp { .. } => OperationResultKind::NoOp,
            Self::Warning { .. } => OperationResultKind::Warning,
            Self::Error { .. } => OperationResultKind::Error,
        }
    }

    pub fn details(&self) -> Option<&str> {
        match self {
            Self::Success { details } | Self::NoOp { details } | Self::Warning { details, .. } => {
                Some(details)
            }
            Self::Error { details, .. } => details.as_deref(),
        }
    }

    pub fn fault(&self) -> Option<&StepFault> {
        match self {
            Self::Error { fault, .. } => Some(fault),
            _ => None,
        }
    }

    pub fn warnings(&self) -> &[StepFault] {
        match self {
            Self::Warning { warnings, .. } => warnings,
            _ => &[],
        }
    }
}

// ============================================================================
// Execution and Perform Results
// ============================================================================

/// Typed result of a step that actually ran
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    Utility(UtilityResult),
    Operation(OperationResult),
}

impl ExecutionResult {
    /// True for ERROR outcomes, the only ones that can trigger an abort
    pub fn is_failure(&self) -> bool {
        self.fault().is_some()
    }

    /// True when steps depending on this one must be skipped
    pub fn is_dependency_failure(&self) -> bool {
        match self {
            Self::Utility(r) => matches!(r.kind(), UtilityResultKind::Null | UtilityResultKind::Error),
            Self::Operation(r) => r.kind() == OperationResultKind::Error,
        }
    }

    pub fn fault(&self) -> Option<&StepFault> {
        match self {
            Self::Utility(r) => r.fault(),
            Self::Operation(r) => r.fault(),
        }
    }

    pub fn details(&self) -> Option<&str> {
        match self {
            Self::Utility(r) => r.details(),
            Self::Operation(r) => r.details(),
        }
    }

    pub fn warnings(&self) -> &[StepFault] {
        match self {
            Self::Utility(r) => r.warnings(),
            Self::Operation(r) => r.warnings(),
        }
    }

    /// Value to store in the context when the step saves its result.
    ///
    /// Utilities save their value (null when absent); operations save their
    /// detail string.
    pub fn saved_value(&self) -> Value {
        match self {
            Self::Utility(r) => r.value_ref().cloned().unwrap_or(Value::Null),
            Self::Operation(r) => match r {
                OperationResult::Error { .. } => Value::Null,
                other => other.details().map_or(Value::Null, Value::from),
            },
        }
    }

    /// Kind name (`VALUE`, `NO_OP`, ...) for logs and reports
    pub fn kind_name(&self) -> String {
        match self {
            Self::Utility(r) => r.kind().to_string(),
            Self::Operation(r) => r.kind().to_string(),
        }
    }
}

/// Per-step outcome recorded in the result ledger
#[derive(Debug, Clone, PartialEq)]
pub enum PerformResult {
    Executed(ExecutionResult),
    SkippedCondition { details: String },
    SkippedDependency { details: String },
}

impl PerformResult {
    pub const fn kind(&self) -> PerformResultKind {
        match self {
            Self::Executed(_) => PerformResultKind::ExecutionResult,
            Self::SkippedCondition { .. } => PerformResultKind::SkippedCondition,
            Self::SkippedDependency { .. } => PerformResultKind::SkippedDependency,
        }
    }

    pub fn execution(&self) -> Option<&ExecutionResult> {
        match self {
            Self::Executed(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.execution().is_some_and(ExecutionResult::is_failure)
    }

    /// Skips count as dependency failures, as do ERROR and utility NULL outcomes
    pub fn is_dependency_failure(&self) -> bool {
        match self {
            Self::Executed(r) => r.is_dependency_failure(),
            Self::SkippedCondition { .. } | Self::SkippedDependency { .. } => true,
        }
    }

    pub fn fault(&self) -> Option<&StepFault> {
        self.execution().and_then(ExecutionResult::fault)
    }

    pub fn details(&self) -> Option<&str> {
        match self {
            Self::Executed(r) => r.details(),
            Self::SkippedCondition { details } | Self::SkippedDependency { details } => Some(details),
        }
    }

    /// Short label such as `EXECUTION_RESULT(SUCCESS)` or `SKIPPED_CONDITION`
    pub fn label(&self) -> String {
        match self {
            Self::Executed(r) => format!("{}({})", self.kind(), r.kind_name()),
            _ => self.kind().to_string(),
        }
    }
}

impl From<UtilityResult> for PerformResult {
    fn from(r: UtilityResult) -> Self {
        Self::Executed(ExecutionResult::Utility(r))
    }
}

impl From<OperationResult> for PerformResult {
    fn from(r: OperationResult) -> Self {
        Self::Executed(ExecutionResult::Operation(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_add_warning_upgrades_value_and_null() {
        let w = StepFault::new("Warn", "careful");
        let r = UtilityResult::value(true).add_warning(w.clone());
        assert_eq!(r.kind(), UtilityResultKind::Warning);
        assert_eq!(r.value_ref(), Some(&Value::Bool(true)));

        let r = UtilityResult::null().add_warning(w.clone());
        assert_eq!(r.kind(), UtilityResultKind::Warning);
        assert_eq!(r.value_ref(), Some(&Value::Null));

        let r = UtilityResult::error(StepFault::new("E", "boom")).add_warning(w);
        assert_eq!(r.kind(), UtilityResultKind::Error);
    }

    #[test]
    fn test_fault_classification() {
        let err = anyhow::Error::new(StepError::NoFiles("none".into())).context("evaluating");
        let fault = StepFault::from_error(&err);
        assert_eq!(fault.class, "NoFilesSpecified");
        assert_eq!(fault.message, "evaluating");
        assert_eq!(fault.causes, vec!["No files specified: none".to_string()]);

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let fault = StepFault::from_error(&anyhow::Error::new(io));
        assert_eq!(fault.class, "IoPermissionDenied");

        let fault = StepFault::from_error(&anyhow::anyhow!("plain"));
        assert_eq!(fault.class, "Error");
        assert_eq!(fault.trace(), "Error: plain");
    }

    #[test]
    fn test_dependency_failure_rules() {
        assert!(PerformResult::SkippedCondition { details: String::new() }.is_dependency_failure());
        assert!(PerformResult::from(UtilityResult::null()).is_dependency_failure());
        assert!(!PerformResult::from(UtilityResult::value(1_i64)).is_dependency_failure());
        assert!(!PerformResult::from(OperationResult::no_op("absent")).is_dependency_failure());
        assert!(PerformResult::from(OperationResult::error(StepFault::new("E", "x"))).is_dependency_failure());
    }

    #[test]
    fn test_only_errors_are_failures() {
        assert!(!PerformResult::from(UtilityResult::null()).is_failure());
        assert!(!PerformResult::SkippedDependency { details: String::new() }.is_failure());
        assert!(PerformResult::from(UtilityResult::error(StepFault::new("E", "x"))).is_failure());
    }

    #[test]
    fn test_saved_values() {
        let op = ExecutionResult::Operation(OperationResult::success("Line added"));
        assert_eq!(op.saved_value(), Value::Text("Line added".into()));
        let null = ExecutionResult::Utility(UtilityResult::null());
        assert_eq!(null.saved_value(), Value::Null);
    }

    #[test]
    fn test_kind_names_parse_back() {
        for kind in OperationResultKind::iter() {
            assert_eq!(OperationResultKind::from_str(&kind.to_string()).unwrap(), kind);
        }
        assert_eq!(OperationResultKind::NoOp.to_string(), "NO_OP");
        assert_eq!(PerformResultKind::SkippedCondition.to_string(), "SKIPPED_CONDITION");
        let r = PerformResult::from(OperationResult::success("ok"));
        assert_eq!(r.label(), "EXECUTION_RESULT(SUCCESS)");
    }
}
