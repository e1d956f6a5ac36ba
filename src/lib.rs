//! Chrysalis Library
//!
//! A plan-driven transformation engine for application source trees: plans of
//! steps run in order against a folder, sharing a context of attributes and a
//! ledger of results, with upgrade paths chaining plans across versions.

pub mod cli;
pub mod condition;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod facade;
pub mod plan;
pub mod plan_file;
pub mod registry;
pub mod result;
pub mod step;
pub mod upgrade;
pub mod utilities;
pub mod value;

// Re-export main types for convenience
pub use condition::{Condition, Guard, Mode, MultipleConditions};
pub use config::Configuration;
pub use context::{ContextError, TransformationContext};
pub use engine::{AbortDetails, EngineError, Metrics, PlanRun, RunStage, Statistics, TransformationEngine};
pub use error::{ChrysalisError, Result, StepError};
pub use facade::{TransformationListener, TransformationRequest, TransformationResult, Transformer};
pub use plan::{PlanError, PlanIssue, TransformationPlan};
pub use plan_file::{PlanDocument, PlanFileError};
pub use registry::PlanRegistry;
pub use result::{
    ExecutionResult, OperationResult, OperationResultKind, PerformResult, PerformResultKind, StepFault, UtilityResult,
    UtilityResultKind,
};
pub use step::{MultipleOperations, Operation, Step, StepGroup, StepInput, StepLoop, Target, Utility};
pub use upgrade::{UpgradePath, UpgradePathError, UpgradeRun};
pub use value::{ManualInstructionRecord, Value};
