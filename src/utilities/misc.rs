//! Context helpers, logging, aborts and manual instructions.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, error, info, trace, warn};

use crate::context::ContextError;
use crate::error::StepError;
use crate::result::UtilityResult;
use crate::step::{StepInput, Utility};
use crate::value::{ManualInstructionRecord, Value};

/// Fill `{}` placeholders, in order, with the display form of context attributes
fn fill(format: &str, attributes: &[String], input: &StepInput<'_>) -> Result<String, StepError> {
    let pieces: Vec<&str> = format.split("{}").collect();
    if pieces.len() - 1 != attributes.len() {
        return Err(StepError::invalid_argument(format!(
            "'{format}' has {} placeholders but {} attributes were given",
            pieces.len() - 1,
            attributes.len()
        )));
    }

    let mut out = String::from(pieces[0]);
    for (attribute, piece) in attributes.iter().zip(&pieces[1..]) {
        out.push_str(&input.context().require(attribute)?.to_string());
        out.push_str(piece);
    }
    Ok(out)
}

/// Look up a key in a map attribute. A missing key is a NULL result.
#[derive(Debug, Clone)]
pub struct MapValue {
    attribute: String,
    key: String,
}

impl MapValue {
    pub fn new(attribute: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            key: key.into(),
        }
    }
}

impl Utility for MapValue {
    fn kind(&self) -> &'static str {
        "MapValue"
    }

    fn description(&self) -> String {
        format!("Look up '{}' in map '{}'", self.key, self.attribute)
    }

    fn requires_target(&self) -> bool {
        false
    }

    fn execute(&self, input: &StepInput<'_>) -> anyhow::Result<UtilityResult> {
        let value = input.context().require(&self.attribute).map_err(StepError::from)?;
        let Value::Map(map) = value else {
            return Err(StepError::from(ContextError::TypeMismatch {
                name: self.attribute.clone(),
                expected: "map",
                found: value.type_name(),
            })
            .into());
        };
        Ok(match map.get(&self.key) {
            Some(found) => UtilityResult::value(found.clone()),
            None => UtilityResult::null().with_details(format!("'{}' has no key '{}'", self.attribute, self.key)),
        })
    }
}

/// Text built from a format string whose `{}` placeholders take attribute values
#[derive(Debug, Clone)]
pub struct StringFormat {
    format: String,
    attributes: Vec<String>,
}

impl StringFormat {
    pub fn new<I, S>(format: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            format: format.into(),
            attributes: attributes.into_iter().map(Into::into).collect(),
        }
    }
}

impl Utility for StringFormat {
    fn kind(&self) -> &'static str {
        "StringFormat"
    }

    fn description(&self) -> String {
        format!("Format '{}'", self.format)
    }

    fn requires_target(&self) -> bool {
        false
    }

    fn execute(&self, input: &StepInput<'_>) -> anyhow::Result<UtilityResult> {
        Ok(UtilityResult::value(fill(&self.format, &self.attributes, input)?))
    }
}

/// Severity of a [`Log`] step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// Write a message to the run log. The message is also the step's value.
#[derive(Debug, Clone)]
pub struct Log {
    level: LogLevel,
    message: String,
    attributes: Vec<String>,
}

impl Log {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            attributes: Vec::new(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    /// Fill `{}` placeholders in the message with these attributes
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }
}

impl Utility for Log {
    fn kind(&self) -> &'static str {
        "Log"
    }

    fn description(&self) -> String {
        format!("Log '{}'", self.message)
    }

    fn requires_target(&self) -> bool {
        false
    }

    fn saves_result(&self) -> bool {
        false
    }

    fn execute(&self, input: &StepInput<'_>) -> anyhow::Result<UtilityResult> {
        let message = if self.attributes.is_empty() {
            self.message.clone()
        } else {
            fill(&self.message, &self.attributes, input)?
        };
        let plan = input.plan_name();
        match self.level {
            LogLevel::Trace => trace!(plan, "{message}"),
            LogLevel::Debug => debug!(plan, "{message}"),
            LogLevel::Info => info!(plan, "{message}"),
            LogLevel::Warn => warn!(plan, "{message}"),
            LogLevel::Error => error!(plan, "{message}"),
        }
        Ok(UtilityResult::value(message))
    }
}

/// Always fails, aborting the plan unless the step turns aborts off
#[derive(Debug, Clone)]
pub struct Abort {
    message: String,
}

impl Abort {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Utility for Abort {
    fn kind(&self) -> &'static str {
        "Abort"
    }

    fn description(&self) -> String {
        format!("Abort the transformation: {}", self.message)
    }

    fn requires_target(&self) -> bool {
        false
    }

    fn saves_result(&self) -> bool {
        false
    }

    fn aborts_on_failure(&self) -> bool {
        true
    }

    fn execute(&self, _input: &StepInput<'_>) -> anyhow::Result<UtilityResult> {
        Err(StepError::Aborted(self.message.clone()).into())
    }
}

/// Work a human has to do once the run is over
#[derive(Debug, Clone)]
pub struct ManualInstruction {
    description: String,
    resource: String,
}

impl ManualInstruction {
    /// `resource` points at the document with the details
    pub fn new(description: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            resource: resource.into(),
        }
    }
}

impl Utility for ManualInstruction {
    fn kind(&self) -> &'static str {
        "ManualInstruction"
    }

    fn description(&self) -> String {
        format!("Manual instruction: {}", self.description)
    }

    fn requires_target(&self) -> bool {
        false
    }

    fn saves_result(&self) -> bool {
        false
    }

    fn execute(&self, input: &StepInput<'_>) -> anyhow::Result<UtilityResult> {
        let record = ManualInstructionRecord {
            plan_name: input.plan_name().to_string(),
            description: self.description.clone(),
            resource: self.resource.clone(),
        };
        Ok(UtilityResult::value(record).with_details("Manual instruction registered"))
    }
}
