//! Built-in conditions.

use anyhow::Context;
use regex::Regex;
use std::fs;
use tracing::warn;

use super::full_match;
use super::properties::parse_property;
use super::text::TextFile;
use crate::condition::Condition;
use crate::error::StepError;
use crate::result::{ExecutionResult, OperationResultKind, PerformResultKind, UtilityResultKind};
use crate::step::StepInput;

/// True iff the target exists (file or folder)
#[derive(Debug, Clone, Copy, Default)]
pub struct FileExists;

impl Condition for FileExists {
    fn kind(&self) -> &'static str {
        "FileExists"
    }

    fn description(&self) -> String {
        "Check that the file exists".to_string()
    }

    fn evaluate(&self, input: &StepInput<'_>) -> anyhow::Result<bool> {
        Ok(input.target()?.exists())
    }
}

/// True iff at least one line of the target file fully matches a regex
#[derive(Debug, Clone)]
pub struct RegexMatch {
    pattern: String,
    regex: Regex,
}

impl RegexMatch {
    pub fn new(pattern: impl Into<String>) -> Result<Self, regex::Error> {
        let pattern = pattern.into();
        let regex = full_match(&pattern)?;
        Ok(Self { pattern, regex })
    }
}

impl Condition for RegexMatch {
    fn kind(&self) -> &'static str {
        "RegexMatch"
    }

    fn description(&self) -> String {
        format!("Check that a line matches '{}'", self.pattern)
    }

    fn evaluate(&self, input: &StepInput<'_>) -> anyhow::Result<bool> {
        let file = TextFile::read(input.target()?)?;
        Ok(file.lines.iter().any(|line| self.regex.is_match(line)))
    }
}

/// True iff a `.properties` file defines a key, optionally with a value matching a regex
#[derive(Debug, Clone)]
pub struct PropertyExists {
    key: String,
    value: Option<Regex>,
}

impl PropertyExists {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.value = Some(full_match(pattern)?);
        Ok(self)
    }
}

impl Condition for PropertyExists {
    fn kind(&self) -> &'static str {
        "PropertyExists"
    }

    fn description(&self) -> String {
        format!("Check that property '{}' exists", self.key)
    }

    fn evaluate(&self, input: &StepInput<'_>) -> anyhow::Result<bool> {
        let file = TextFile::read(input.target()?)?;
        Ok(file
            .lines
            .iter()
            .filter_map(|line| parse_property(line))
            .any(|(key, value)| key == self.key && self.value.as_ref().is_none_or(|re| re.is_match(value))))
    }
}

/// True iff the target and the file held by an attribute have the same content.
///
/// Two missing files compare equal; one missing file does not.
#[derive(Debug, Clone)]
pub struct CompareFiles {
    attribute: String,
}

impl CompareFiles {
    pub fn with(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
        }
    }
}

impl Condition for CompareFiles {
    fn kind(&self) -> &'static str {
        "CompareFiles"
    }

    fn description(&self) -> String {
        format!("Compare file with the one in attribute '{}'", self.attribute)
    }

    fn evaluate(&self, input: &StepInput<'_>) -> anyhow::Result<bool> {
        let left = input.target()?;
        let right = input.context().get_path(&self.attribute).map_err(StepError::from)?;
        match (left.is_file(), right.is_file()) {
            (false, false) => Ok(true),
            (true, true) => {
                let a = fs::read(left).with_context(|| format!("Failed to read {}", left.display()))?;
                let b = fs::read(right).with_context(|| format!("Failed to read {}", right.display()))?;
                Ok(a == b)
            }
            _ => Ok(false),
        }
    }
}

/// Checks another step's ledger entry.
///
/// Matches on the entry's kind and, for executed steps, on the utility or
/// operation outcome when expected kinds are given. A step with no entry yet
/// evaluates false.
#[derive(Debug, Clone)]
pub struct ResultCondition {
    step: String,
    perform: PerformResultKind,
    utility: Vec<UtilityResultKind>,
    operation: Vec<OperationResultKind>,
}

impl ResultCondition {
    /// Passes if the step executed, whatever its outcome
    pub fn executed(step: impl Into<String>) -> Self {
        Self::new(step, PerformResultKind::ExecutionResult)
    }

    pub fn new(step: impl Into<String>, perform: PerformResultKind) -> Self {
        Self {
            step: step.into(),
            perform,
            utility: Vec::new(),
            operation: Vec::new(),
        }
    }

    pub fn with_utility_kinds(mut self, kinds: impl IntoIterator<Item = UtilityResultKind>) -> Self {
        self.utility.extend(kinds);
        self
    }

    pub fn with_operation_kinds(mut self, kinds: impl IntoIterator<Item = OperationResultKind>) -> Self {
        self.operation.extend(kinds);
        self
    }
}

impl Condition for ResultCondition {
    fn kind(&self) -> &'static str {
        "ResultCondition"
    }

    fn description(&self) -> String {
        format!("Check that step '{}' resulted in {}", self.step, self.perform)
    }

    fn requires_target(&self) -> bool {
        false
    }

    fn evaluate(&self, input: &StepInput<'_>) -> anyhow::Result<bool> {
        let Some(result) = input.context().result(&self.step) else {
            warn!(step = %self.step, "No result recorded for step, condition evaluates false");
            return Ok(false);
        };
        if result.kind() != self.perform {
            return Ok(false);
        }
        Ok(match result.execution() {
            Some(ExecutionResult::Utility(r)) => self.utility.is_empty() || self.utility.contains(&r.kind()),
            Some(ExecutionResult::Operation(r)) => self.operation.is_empty() || self.operation.contains(&r.kind()),
            None => true,
        })
    }
}
