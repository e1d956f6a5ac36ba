//! Statistics, Metrics and abort details for plan runs.
//!
//! Counters are updated as each step's result is recorded, never recomputed
//! afterwards, so an aborted run still reports what actually ran.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::plan::TransformationPlan;
use crate::result::{ExecutionResult, OperationResult, PerformResult, StepFault, UtilityResult};
use crate::step::Step;

/// Counters over one plan run (or, summed, over a whole chain)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    /// Utilities (conditions and composites included) that executed
    pub utilities_count: usize,
    /// Operations that executed
    pub operations_count: usize,

    // Per perform result
    pub execution_result_count: usize,
    pub skipped_condition_count: usize,
    pub skipped_dependency_count: usize,

    // Per utility result
    pub utility_value_count: usize,
    pub utility_null_count: usize,
    pub utility_warning_count: usize,
    pub utility_error_count: usize,

    // Per operation result
    pub operation_success_count: usize,
    pub operation_no_op_count: usize,
    pub operation_warning_count: usize,
    pub operation_error_count: usize,

    pub manual_instructions_count: usize,
}

impl Statistics {
    /// Count one recorded step result
    pub fn register(&mut self, result: &PerformResult) {
        match result {
            PerformResult::SkippedCondition { .. } => self.skipped_condition_count += 1,
            PerformResult::SkippedDependency { .. } => self.skipped_dependency_count += 1,
            PerformResult::Executed(execution) => {
                self.execution_result_count += 1;
                match execution {
                    ExecutionResult::Utility(r) => {
                        self.utilities_count += 1;
                        match r {
                            UtilityResult::Value { .. } => self.utility_value_count += 1,
                            UtilityResult::Null { .. } => self.utility_null_count += 1,
                            UtilityResult::Warning { .. } => self.utility_warning_count += 1,
                            UtilityResult::Error { .. } => self.utility_error_count += 1,
                        }
                    }
                    ExecutionResult::Operation(r) => {
                        self.operations_count += 1;
                        match r {
                            OperationResult::Success { .. } => self.operation_success_count += 1,
                            OperationResult::NoOp { .. } => self.operation_no_op_count += 1,
                            OperationResult::Warning { .. } => self.operation_warning_count += 1,
                            OperationResult::Error { .. } => self.operation_error_count += 1,
                        }
                    }
                }
            }
        }
    }

    pub fn add_manual_instruction(&mut self) {
        self.manual_instructions_count += 1;
    }

    /// Add another run's counters to these
    pub fn absorb(&mut self, other: &Statistics) {
        self.utilities_count += other.utilities_count;
        self.operations_count += other.operations_count;
        self.execution_result_count += other.execution_result_count;
        self.skipped_condition_count += other.skipped_condition_count;
        self.skipped_dependency_count += other.skipped_dependency_count;
        self.utility_value_count += other.utility_value_count;
        self.utility_null_count += other.utility_null_count;
        self.utility_warning_count += other.utility_warning_count;
        self.utility_error_count += other.utility_error_count;
        self.operation_success_count += other.operation_success_count;
        self.operation_no_op_count += other.operation_no_op_count;
        self.operation_warning_count += other.operation_warning_count;
        self.operation_error_count += other.operation_error_count;
        self.manual_instructions_count += other.manual_instructions_count;
    }

    /// Steps with a ledger entry (executed or skipped)
    pub fn steps_count(&self) -> usize {
        self.execution_result_count + self.skipped_condition_count + self.skipped_dependency_count
    }

    pub fn error_count(&self) -> usize {
        self.utility_error_count + self.operation_error_count
    }

    pub fn warning_count(&self) -> usize {
        self.utility_warning_count + self.operation_warning_count
    }
}

/// Captured once, the first time a step aborts a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortDetails {
    /// Name of the step that aborted
    pub utility_name: String,
    /// Leaf type of that step
    pub utility_kind: String,
    pub plan_name: String,
    /// `TransformationPlan` or `UpgradeStep`
    pub plan_kind: String,
    pub abort_message: String,
    pub exception_class: String,
    pub exception_message: String,
    pub exception_trace: String,
}

impl AbortDetails {
    pub(crate) fn capture(step: &Step, plan: &TransformationPlan, fault: &StepFault) -> Self {
        let abort_message = step
            .abort_message()
            .map_or_else(|| fault.message.clone(), str::to_string);
        Self {
            utility_name: step.name().to_string(),
            utility_kind: step.kind().to_string(),
            plan_name: plan.name().to_string(),
            plan_kind: plan_kind(plan).to_string(),
            abort_message,
            exception_class: fault.class.clone(),
            exception_message: fault.message.clone(),
            exception_trace: fault.trace(),
        }
    }
}

pub(crate) fn plan_kind(plan: &TransformationPlan) -> &'static str {
    if plan.upgrade().is_some() { "UpgradeStep" } else { "TransformationPlan" }
}

/// Summary of one plan run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    pub metrics_id: Uuid,
    pub plan_name: String,
    pub plan_description: String,
    pub plan_kind: String,
    pub application_type: Option<String>,
    /// Folder the plan ran against
    pub application_location: PathBuf,
    pub from_version: Option<String>,
    pub to_version: Option<String>,
    /// Shared by every plan of one upgrade path run
    pub upgrade_correlation_id: Option<Uuid>,
    pub user_id: Option<String>,
    pub engine_version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Completed without abort
    pub successful: bool,
    pub requires_manual_instructions: bool,
    pub statistics: Statistics,
    pub abort_details: Option<AbortDetails>,
}
