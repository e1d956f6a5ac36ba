//! Execution Engine
//!
//! Walks a [`TransformationPlan`] in declared order, threading one
//! [`TransformationContext`] through every step.
//!
//! # Per-step pipeline
//!
//! 1. Stop if the run already aborted
//! 2. Resolve the target (a failure is the step's ERROR result)
//! 3. Evaluate guards (any false records `SKIPPED_CONDITION`)
//! 4. Check dependencies (unmet records `SKIPPED_DEPENDENCY`)
//! 5. Execute, converting leaf faults and panics into an ERROR result
//! 6. Save the value (when the step saves results) and record the ledger entry
//! 7. On ERROR with abort-on-failure, capture [`AbortDetails`] and stop
//!
//! Children produced by fan-out and group steps run right after their parent,
//! through the same pipeline. Loop iterations run before the loop's own entry
//! is recorded, since the loop only knows its outcome once they are done.
//!
//! Only the engine's own bookkeeping faults escape as [`EngineError`].

pub mod state;
pub mod stats;

use chrono::Utc;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub use state::{RunStage, RunTracker, RunTransitionError};
pub use stats::{AbortDetails, Metrics, Statistics};

use crate::context::{ContextError, TransformationContext};
use crate::error::StepError;
use crate::plan::TransformationPlan;
use crate::result::{ExecutionResult, OperationResult, PerformResult, StepFault, UtilityResult};
use crate::step::{specialize, Action, Step, StepInput, StepLoop};
use crate::value::{ManualInstructionRecord, Value};

/// Engine bookkeeping faults
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The folder to transform is missing or not a directory
    #[error("application folder {} does not exist or is not a directory", .0.display())]
    InvalidApplicationFolder(PathBuf),

    /// Two steps produced a ledger entry under the same name
    #[error("a result for step '{0}' was already recorded in this run")]
    DuplicateResult(String),

    /// A value could not be written to the context
    #[error("context write failed: {0}")]
    Context(#[from] ContextError),

    /// Run stage transition outside the allowed flow
    #[error(transparent)]
    Transition(#[from] RunTransitionError),
}

/// Outcome of one plan run
#[derive(Debug)]
pub struct PlanRun {
    pub metrics: Metrics,
    /// Final context, ledger included
    pub context: TransformationContext,
    pub manual_instructions: Vec<ManualInstructionRecord>,
    pub stage: RunStage,
}

impl PlanRun {
    /// Completed without abort
    #[inline]
    pub fn is_successful(&self) -> bool {
        self.stage == RunStage::Completed
    }

    pub fn abort_details(&self) -> Option<&AbortDetails> {
        self.metrics.abort_details.as_ref()
    }

    pub fn statistics(&self) -> &Statistics {
        &self.metrics.statistics
    }
}

/// Runs plans against application folders
#[derive(Debug, Clone, Default)]
pub struct TransformationEngine {
    properties: BTreeMap<String, String>,
}

impl TransformationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Properties handed to every step; never interpreted by the engine
    pub fn with_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.properties = properties;
        self
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Run one plan against a folder with a fresh context
    pub fn run(&self, application_folder: &Path, plan: &TransformationPlan) -> Result<PlanRun, EngineError> {
        self.run_correlated(application_folder, plan, None)
    }

    pub(crate) fn run_correlated(
        &self,
        application_folder: &Path,
        plan: &TransformationPlan,
        correlation: Option<Uuid>,
    ) -> Result<PlanRun, EngineError> {
        if !application_folder.is_dir() {
            return Err(EngineError::InvalidApplicationFolder(application_folder.to_path_buf()));
        }
        PlanRunner::new(application_folder, plan, &self.properties).run(correlation)
    }
}

// ============================================================================
// Plan Runner
// ============================================================================

struct PlanRunner<'a> {
    root: &'a Path,
    plan: &'a TransformationPlan,
    properties: &'a BTreeMap<String, String>,
    context: TransformationContext,
    statistics: Statistics,
    tracker: RunTracker,
    abort: Option<AbortDetails>,
    manual_instructions: Vec<ManualInstructionRecord>,
}

impl<'a> PlanRunner<'a> {
    fn new(root: &'a Path, plan: &'a TransformationPlan, properties: &'a BTreeMap<String, String>) -> Self {
        Self {
            root,
            plan,
            properties,
            context: TransformationContext::new(),
            statistics: Statistics::default(),
            tracker: RunTracker::new(),
            abort: None,
            manual_instructions: Vec::new(),
        }
    }

    fn run(mut self, correlation: Option<Uuid>) -> Result<PlanRun, EngineError> {
        let plan = self.plan;
        self.tracker.start()?;
        info!(
            plan = %plan.name(),
            folder = %self.root.display(),
            steps = plan.len(),
            "Starting transformation plan"
        );

        for step in plan.steps() {
            if self.abort.is_some() {
                break;
            }
            if let Err(err) = self.perform(step) {
                error!(plan = %plan.name(), step = %step.name(), error = %err, "Engine fault, run failed");
                let _ = self.tracker.fail();
                return Err(err);
            }
        }

        if let Some(details) = &self.abort {
            self.tracker.abort()?;
            warn!(
                plan = %plan.name(),
                step = %details.utility_name,
                "Transformation plan aborted: {}",
                details.abort_message
            );
        } else {
            self.tracker.complete()?;
            info!(
                plan = %plan.name(),
                steps = self.statistics.steps_count(),
                errors = self.statistics.error_count(),
                warnings = self.statistics.warning_count(),
                "Transformation plan completed"
            );
        }

        Ok(self.into_run(correlation))
    }

    fn into_run(self, correlation: Option<Uuid>) -> PlanRun {
        let finished_at = self.tracker.finished_at().unwrap_or_else(Utc::now);
        let started_at = self.tracker.started_at().unwrap_or(finished_at);
        let stage = self.tracker.current();
        let metrics = Metrics {
            metrics_id: Uuid::new_v4(),
            plan_name: self.plan.name().to_string(),
            plan_description: self.plan.description().to_string(),
            plan_kind: stats::plan_kind(self.plan).to_string(),
            application_type: self.plan.application_type().map(str::to_string),
            application_location: self.root.to_path_buf(),
            from_version: self.plan.upgrade().map(|hop| hop.from.clone()),
            to_version: self.plan.upgrade().map(|hop| hop.to.clone()),
            upgrade_correlation_id: correlation,
            user_id: std::env::var("USER").or_else(|_| std::env::var("USERNAME")).ok(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            started_at,
            finished_at,
            successful: stage == RunStage::Completed,
            requires_manual_instructions: !self.manual_instructions.is_empty(),
            statistics: self.statistics,
            abort_details: self.abort,
        };
        PlanRun {
            metrics,
            context: self.context,
            manual_instructions: self.manual_instructions,
            stage,
        }
    }

    fn input<'b>(&'b self, step: &'b Step, target: Option<&'b Path>) -> StepInput<'b> {
        let input = StepInput::new(self.root, &self.context)
            .with_properties(self.properties)
            .with_names(step.name(), self.plan.name());
        match target {
            Some(path) => input.with_target(path),
            None => input,
        }
    }

    fn perform(&mut self, step: &Step) -> Result<(), EngineError> {
        if self.abort.is_some() {
            return Ok(());
        }
        debug!(step = %step.name(), "Performing: {}", step.description());

        let target = match self.resolve_target(step) {
            Ok(target) => target,
            Err(err) => {
                let result = error_result(step, StepFault::from(err));
                return self.finish(step, PerformResult::Executed(result), Vec::new());
            }
        };

        if let Some(outcome) = self.check_guards(step, target.as_deref()) {
            return self.finish(step, outcome, Vec::new());
        }

        if let Some(details) = self.unmet_dependency(step) {
            return self.finish(step, PerformResult::SkippedDependency { details }, Vec::new());
        }

        let (result, children) = self.execute(step, target.as_deref())?;
        self.finish(step, PerformResult::Executed(result), children)
    }

    fn resolve_target(&self, step: &Step) -> Result<Option<PathBuf>, StepError> {
        if step.target().is_set() {
            step.target().resolve(self.root, &self.context).map(Some)
        } else if step.requires_target() {
            Err(StepError::resolution(format!(
                "step '{}' requires a target but neither a relative path nor a path attribute is set",
                step.name()
            )))
        } else {
            Ok(None)
        }
    }

    fn check_guards(&self, step: &Step, target: Option<&Path>) -> Option<PerformResult> {
        let input = self.input(step, target);
        for guard in step.guards() {
            match catch_panics(|| guard.evaluate(&input)) {
                Ok(true) => {}
                Ok(false) => {
                    return Some(PerformResult::SkippedCondition {
                        details: format!("guard not met: {}", guard.describe()),
                    });
                }
                Err(err) => {
                    let err = err.context(format!("guard '{}' could not be evaluated", guard.describe()));
                    return Some(PerformResult::Executed(error_result(step, StepFault::from_error(&err))));
                }
            }
        }
        None
    }

    /// Explicit dependencies must have run without a dependency failure; the
    /// parent, when it already has an entry, must not have failed either.
    fn unmet_dependency(&self, step: &Step) -> Option<String> {
        for dependency in step.dependencies() {
            match self.context.result(dependency) {
                None => return Some(format!("dependency '{dependency}' has no result")),
                Some(result) if result.is_dependency_failure() => {
                    return Some(format!("dependency '{dependency}' ended as {}", result.label()));
                }
                Some(_) => {}
            }
        }
        let parent = step.parent()?;
        match self.context.result(parent) {
            Some(result) if result.is_dependency_failure() => {
                Some(format!("parent '{parent}' ended as {}", result.label()))
            }
            _ => None,
        }
    }

    fn execute(&mut self, step: &Step, target: Option<&Path>) -> Result<(ExecutionResult, Vec<Step>), EngineError> {
        let outcome = match step.action() {
            Action::Utility(utility) => {
                let input = self.input(step, target);
                let result = catch_panics(|| utility.execute(&input))
                    .unwrap_or_else(|err| UtilityResult::error(StepFault::from_error(&err)));
                (ExecutionResult::Utility(result), Vec::new())
            }
            Action::Operation(operation) => {
                let input = self.input(step, target);
                let result = catch_panics(|| operation.execute(&input))
                    .unwrap_or_else(|err| OperationResult::error(StepFault::from_error(&err)));
                (ExecutionResult::Operation(result), Vec::new())
            }
            Action::Condition(condition) => {
                let input = self.input(step, target);
                let result = match catch_panics(|| condition.evaluate(&input)) {
                    Ok(outcome) => UtilityResult::value(outcome),
                    Err(err) => UtilityResult::error(StepFault::from_error(&err)),
                };
                (ExecutionResult::Utility(result), Vec::new())
            }
            Action::FanOut(fan_out) => match fan_out.expand(step.name(), self.root, &self.context) {
                Ok(children) if children.is_empty() => {
                    let result = UtilityResult::null().with_details("no files to fan out over");
                    (ExecutionResult::Utility(result), Vec::new())
                }
                Ok(children) => {
                    let result = UtilityResult::value(child_names(&children))
                        .with_details(format!("{} child steps", children.len()));
                    (ExecutionResult::Utility(result), children)
                }
                Err(err) => {
                    let fault = StepFault::from(StepError::from(err));
                    (ExecutionResult::Utility(UtilityResult::error(fault)), Vec::new())
                }
            },
            Action::Group(group) => {
                let result = UtilityResult::value(child_names(group.steps()));
                (ExecutionResult::Utility(result), group.steps().to_vec())
            }
            Action::Loop(step_loop) => (self.run_loop(step, step_loop, target)?, Vec::new()),
        };
        Ok(outcome)
    }

    fn run_loop(
        &mut self,
        step: &Step,
        step_loop: &StepLoop,
        target: Option<&Path>,
    ) -> Result<ExecutionResult, EngineError> {
        let mut completed = 0usize;
        loop {
            if self.abort.is_some() {
                break;
            }
            let proceed = {
                let input = self.input(step, target);
                catch_panics(|| step_loop.should_continue(completed, &input))
            };
            match proceed {
                Ok(false) => break,
                Ok(true) if completed >= step_loop.max_iterations() => {
                    let fault = StepError::invalid_argument(format!(
                        "loop '{}' reached its cap of {} iterations",
                        step.name(),
                        step_loop.max_iterations()
                    ));
                    return Ok(ExecutionResult::Utility(UtilityResult::error(fault)));
                }
                Ok(true) => {}
                Err(err) => {
                    return Ok(ExecutionResult::Utility(UtilityResult::error(StepFault::from_error(&err))));
                }
            }
            completed += 1;
            let iteration = specialize(step_loop.template(), step.name(), completed, None);
            self.perform(&iteration)?;
        }

        let result = UtilityResult::value(completed as i64).with_details(format!("{completed} iterations"));
        Ok(ExecutionResult::Utility(result))
    }

    fn finish(&mut self, step: &Step, result: PerformResult, children: Vec<Step>) -> Result<(), EngineError> {
        let name = step.name();

        if let PerformResult::Executed(execution) = &result {
            if step.saves_result() {
                self.context.put(step.result_key(), execution.saved_value())?;
            }
            if let ExecutionResult::Utility(utility) = execution {
                if let Some(Value::ManualInstruction(record)) = utility.value_ref() {
                    self.manual_instructions.push(record.clone());
                    self.statistics.add_manual_instruction();
                }
            }
        }

        self.statistics.register(&result);
        log_result(name, &result);

        let abort_fault = (step.aborts_on_failure() && result.is_failure())
            .then(|| result.fault().cloned())
            .flatten();

        if self.context.put_result(name, result).is_some() {
            return Err(EngineError::DuplicateResult(name.to_string()));
        }

        if let Some(fault) = abort_fault {
            let details = AbortDetails::capture(step, self.plan, &fault);
            error!(step = %name, error = %fault, "Step failed with abort on failure set");
            self.abort = Some(details);
            return Ok(());
        }

        for child in &children {
            if self.abort.is_some() {
                break;
            }
            self.perform(child)?;
        }
        Ok(())
    }
}

fn error_result(step: &Step, fault: StepFault) -> ExecutionResult {
    if step.is_operation() {
        ExecutionResult::Operation(OperationResult::error(fault))
    } else {
        ExecutionResult::Utility(UtilityResult::error(fault))
    }
}

fn child_names(children: &[Step]) -> Value {
    Value::List(children.iter().map(|c| Value::from(c.name())).collect())
}

fn log_result(name: &str, result: &PerformResult) {
    let label = result.label();
    let details = result.details().unwrap_or_default();
    match result {
        PerformResult::Executed(execution) => {
            if let Some(fault) = execution.fault() {
                warn!(step = %name, result = %label, error = %fault, "Step failed");
            } else if !execution.warnings().is_empty() {
                for warning in execution.warnings() {
                    warn!(step = %name, result = %label, warning = %warning, "{details}");
                }
            } else {
                info!(step = %name, result = %label, "{details}");
            }
        }
        _ => info!(step = %name, result = %label, "Step skipped: {details}"),
    }
}

/// Run leaf code, turning a panic into a `StepError::Panicked`
fn catch_panics<T>(f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(StepError::Panicked(panic_message(payload.as_ref())).into()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
