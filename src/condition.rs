//! Condition Evaluator
//!
//! A [`Condition`] is read-only step logic whose outcome is a boolean. Steps
//! carry zero or more [`Guard`]s; the engine evaluates every guard before the
//! step and runs it only if all of them pass.
//!
//! # Evaluation shapes
//!
//! - **Single file**: the condition runs against one resolved target (its own,
//!   or the guarded step's when it has none).
//! - **Multiple files**: [`MultipleConditions`] runs a template condition over
//!   the de-duplicated union of files held by context attributes, combined with
//!   a [`Mode`] quantifier. An empty file set is an error, never vacuous.
//!
//! Negation is applied to a guard's raw outcome, after evaluation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strum::{Display, EnumString};

use crate::error::StepError;
use crate::step::{StepInput, Target};

/// Boolean step logic.
///
/// # Contract
///
/// - `evaluate()` never mutates the application folder.
/// - Faults are returned as `Err`; a guard that faults turns the guarded step
///   into an ERROR result.
pub trait Condition: Send + Sync + fmt::Debug {
    /// Short type name, used in generated step names
    fn kind(&self) -> &'static str;

    fn description(&self) -> String;

    fn requires_target(&self) -> bool {
        true
    }

    fn evaluate(&self, input: &StepInput<'_>) -> anyhow::Result<bool>;
}

// ============================================================================
// Multiple-file Conditions
// ============================================================================

/// Quantifier for multi-file evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Mode {
    /// True as soon as one file satisfies the condition
    #[default]
    AtLeastOne,
    /// False as soon as one file does not
    All,
}

/// One condition evaluated over a file set drawn from context attributes
#[derive(Debug, Clone)]
pub struct MultipleConditions {
    template: Arc<dyn Condition>,
    attributes: Vec<String>,
    mode: Mode,
}

impl MultipleConditions {
    pub fn new(template: impl Condition + 'static) -> Self {
        Self::from_shared(Arc::new(template))
    }

    pub fn from_shared(template: Arc<dyn Condition>) -> Self {
        Self {
            template,
            attributes: Vec::new(),
            mode: Mode::default(),
        }
    }

    /// Add attributes holding file references
    pub fn with_files<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.extend(attributes.into_iter().map(Into::into));
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[inline]
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// De-duplicated union of the files held by the attributes
    pub fn files(&self, input: &StepInput<'_>) -> Result<BTreeSet<PathBuf>, StepError> {
        let mut files = BTreeSet::new();
        for attribute in &self.attributes {
            files.extend(input.context().get_files(attribute)?);
        }
        Ok(files)
    }
}

impl Condition for MultipleConditions {
    fn kind(&self) -> &'static str {
        "MultipleConditions"
    }

    fn description(&self) -> String {
        let quantifier = match self.mode {
            Mode::AtLeastOne => "at least one file",
            Mode::All => "all files",
        };
        format!(
            "{} in {} ({})",
            self.template.description(),
            self.attributes.join(", "),
            quantifier
        )
    }

    fn requires_target(&self) -> bool {
        false
    }

    fn evaluate(&self, input: &StepInput<'_>) -> anyhow::Result<bool> {
        let files = self.files(input)?;
        if files.is_empty() {
            return Err(StepError::NoFiles(format!(
                "attributes [{}] hold no files",
                self.attributes.join(", ")
            ))
            .into());
        }

        for file in &files {
            let outcome = self.template.evaluate(&input.with_target(file))?;
            match (self.mode, outcome) {
                (Mode::AtLeastOne, true) => return Ok(true),
                (Mode::All, false) => return Ok(false),
                _ => {}
            }
        }
        Ok(self.mode == Mode::All)
    }
}

// ============================================================================
// Guards
// ============================================================================

/// What a guard checks
#[derive(Debug, Clone)]
pub enum Predicate {
    /// True iff the attribute holds boolean `true`
    Attribute(String),
    /// A condition against its own target, or the guarded step's target when unset
    Condition {
        condition: Arc<dyn Condition>,
        target: Target,
    },
}

/// A run condition attached to a step
#[derive(Debug, Clone)]
pub struct Guard {
    predicate: Predicate,
    negate: bool,
}

impl Guard {
    /// Pass iff the attribute holds `true`
    pub fn attribute(name: impl Into<String>) -> Self {
        Self {
            predicate: Predicate::Attribute(name.into()),
            negate: false,
        }
    }

    /// Pass iff the condition holds for the guarded step's target
    pub fn condition(condition: impl Condition + 'static) -> Self {
        Self::shared(Arc::new(condition), Target::Unset)
    }

    /// Pass iff the condition holds for the given target
    pub fn condition_at(condition: impl Condition + 'static, target: Target) -> Self {
        Self::shared(Arc::new(condition), target)
    }

    /// Pass iff the multi-file condition holds
    pub fn multiple(conditions: MultipleConditions) -> Self {
        Self::condition(conditions)
    }

    pub fn shared(condition: Arc<dyn Condition>, target: Target) -> Self {
        Self {
            predicate: Predicate::Condition { condition, target },
            negate: false,
        }
    }

    /// Invert the outcome
    pub fn negate(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    #[inline]
    pub fn is_negated(&self) -> bool {
        self.negate
    }

    #[inline]
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Raw outcome, before negation
    pub fn evaluate_raw(&self, input: &StepInput<'_>) -> anyhow::Result<bool> {
        match &self.predicate {
            Predicate::Attribute(name) => Ok(input
                .context()
                .get(name)
                .and_then(|v| v.as_bool())
                .unwrap_or(false)),
            Predicate::Condition { condition, target } => {
                if !condition.requires_target() {
                    return condition.evaluate(&input.without_target());
                }
                let own: PathBuf;
                let path: &Path = if target.is_set() {
                    own = target.resolve(input.root(), input.context())?;
                    &own
                } else {
                    input.target()?
                };
                condition.evaluate(&input.with_target(path))
            }
        }
    }

    /// Outcome with negation applied
    pub fn evaluate(&self, input: &StepInput<'_>) -> anyhow::Result<bool> {
        Ok(self.evaluate_raw(input)? != self.negate)
    }

    pub fn describe(&self) -> String {
        let text = match &self.predicate {
            Predicate::Attribute(name) => format!("attribute '{name}' is true"),
            Predicate::Condition { condition, target } if target.is_set() => {
                format!("{} ({target})", condition.description())
            }
            Predicate::Condition { condition, .. } => condition.description(),
        };
        if self.negate { format!("not [{text}]") } else { text }
    }
}
