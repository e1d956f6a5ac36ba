//! Composite steps: groups and loops.

use std::sync::Arc;

use super::{specialize, Step, StepInput, Target};
use crate::condition::Condition;
use crate::plan::PlanError;

/// Cap for loops driven by an attribute or a condition
pub const DEFAULT_MAX_ITERATIONS: usize = 1000;

/// An ordered list of child steps run right after the group step itself
#[derive(Debug, Clone, Default)]
pub struct StepGroup {
    steps: Vec<Step>,
}

impl StepGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`StepGroup::push`]
    pub fn with(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    #[inline]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub(crate) fn steps_mut(&mut self) -> &mut [Step] {
        &mut self.steps
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Re-derive every child from its current form under a new parent name
    pub(crate) fn respecialize(&mut self, parent: &str) {
        self.steps = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| specialize(step, parent, i + 1, None))
            .collect();
    }
}

/// What decides whether a loop runs another iteration
#[derive(Debug, Clone)]
pub enum LoopDriver {
    /// Exactly this many iterations
    Iterations(usize),
    /// While the attribute holds `true` (re-read before each iteration)
    Attribute(String),
    /// While the condition holds (re-evaluated before each iteration)
    Condition {
        condition: Arc<dyn Condition>,
        target: Target,
    },
}

/// Repeats a template step
#[derive(Debug, Clone)]
pub struct StepLoop {
    template: Box<Step>,
    driver: LoopDriver,
    max_iterations: usize,
}

impl StepLoop {
    /// Run the template a fixed number of times (at least two)
    pub fn times(template: Step, iterations: usize) -> Result<Self, PlanError> {
        if iterations < 2 {
            return Err(PlanError::Definition(format!(
                "a counted loop needs at least 2 iterations, got {iterations}"
            )));
        }
        Ok(Self::new(template, LoopDriver::Iterations(iterations)))
    }

    /// Run the template while a boolean attribute is `true`
    pub fn while_attribute(template: Step, attribute: impl Into<String>) -> Self {
        Self::new(template, LoopDriver::Attribute(attribute.into()))
    }

    /// Run the template while a condition holds
    pub fn while_condition(template: Step, condition: impl Condition + 'static, target: Target) -> Self {
        Self::while_shared_condition(template, Arc::new(condition), target)
    }

    pub fn while_shared_condition(template: Step, condition: Arc<dyn Condition>, target: Target) -> Self {
        Self::new(template, LoopDriver::Condition { condition, target })
    }

    fn new(template: Step, driver: LoopDriver) -> Self {
        Self {
            template: Box::new(template),
            driver,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    #[inline]
    pub fn template(&self) -> &Step {
        &self.template
    }

    #[inline]
    pub fn driver(&self) -> &LoopDriver {
        &self.driver
    }

    /// Upper bound on iterations; fixed counts are not capped
    pub fn max_iterations(&self) -> usize {
        match self.driver {
            LoopDriver::Iterations(n) => n,
            _ => self.max_iterations,
        }
    }

    pub fn description(&self) -> String {
        let what = self.template.description();
        match &self.driver {
            LoopDriver::Iterations(n) => format!("Repeat '{what}' {n} times"),
            LoopDriver::Attribute(name) => format!("Repeat '{what}' while '{name}' is true"),
            LoopDriver::Condition { condition, .. } => {
                format!("Repeat '{what}' while {}", condition.description())
            }
        }
    }

    /// Whether iteration number `completed + 1` should run
    pub fn should_continue(&self, completed: usize, input: &StepInput<'_>) -> anyhow::Result<bool> {
        match &self.driver {
            LoopDriver::Iterations(n) => Ok(completed < *n),
            LoopDriver::Attribute(name) => {
                Ok(input.context().get(name).and_then(|v| v.as_bool()).unwrap_or(false))
            }
            LoopDriver::Condition { condition, target } => {
                if condition.requires_target() {
                    let path = target.resolve(input.root(), input.context())?;
                    condition.evaluate(&input.with_target(&path))
                } else {
                    condition.evaluate(&input.without_target())
                }
            }
        }
    }
}
