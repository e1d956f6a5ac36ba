//! Error handling module for chrysalis
//!
//! Centralized error types built on thiserror.
//!
//! Two families live here:
//!
//! - [`ChrysalisError`]: faults of the crate itself (configuration, plan
//!   definitions, engine bookkeeping, output handling). These propagate to the
//!   caller as `Err`.
//! - [`StepError`]: faults raised by a step's own logic. The engine never lets
//!   these escape; they are captured into the step's ERROR result.

use thiserror::Error;

use crate::context::ContextError;
use crate::engine::EngineError;
use crate::plan::PlanError;
use crate::plan_file::PlanFileError;
use crate::upgrade::UpgradePathError;

/// Main error type for chrysalis
#[derive(Error, Debug)]
pub enum ChrysalisError {
    /// IO errors (application folder, output folder, reports)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (loading, parsing, validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Plan definition errors (duplicate names, invalid steps)
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    /// Declarative plan document errors
    #[error("Plan document error: {0}")]
    PlanFile(#[from] PlanFileError),

    /// Upgrade path definition errors
    #[error("Upgrade path error: {0}")]
    UpgradePath(#[from] UpgradePathError),

    /// Engine bookkeeping errors (contract violations, state transitions)
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Validation errors (application folder, arguments)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Output handling errors (copying, zipping, reports)
    #[error("Output error: {0}")]
    Output(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General errors (catch-all for edge cases)
    #[error("{0}")]
    General(String),
}

/// Result type alias for chrysalis operations
pub type Result<T> = std::result::Result<T, ChrysalisError>;

// Convenient error constructors
impl ChrysalisError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an output error
    pub fn output(msg: impl Into<String>) -> Self {
        Self::Output(msg.into())
    }
}

impl From<anyhow::Error> for ChrysalisError {
    fn from(err: anyhow::Error) -> Self {
        Self::General(format!("{err:#}"))
    }
}

// ============================================================================
// Step Faults
// ============================================================================

/// Faults raised by step logic.
///
/// Leaf steps return `anyhow::Result`, so any error type works; these variants
/// cover the faults the built-in steps and the engine raise themselves, and
/// give each one a stable class name for abort reports.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    /// The step's target could not be turned into a file path
    #[error("Target could not be resolved: {0}")]
    Resolution(String),

    /// A file the step needs does not exist
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// The step was configured with an unusable argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A multi-file step resolved an empty file set
    #[error("No files specified: {0}")]
    NoFiles(String),

    /// Raised deliberately by the Abort utility
    #[error("{0}")]
    Aborted(String),

    /// A context lookup failed
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    /// The step logic panicked
    #[error("Step panicked: {0}")]
    Panicked(String),
}

impl StepError {
    /// Stable class name used in abort details
    pub const fn class(&self) -> &'static str {
        match self {
            Self::Resolution(_) => "ResolutionError",
            Self::FileNotFound(_) => "FileNotFound",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::NoFiles(_) => "NoFilesSpecified",
            Self::Aborted(_) => "AbortRequested",
            Self::Context(_) => "ContextError",
            Self::Panicked(_) => "Panic",
        }
    }

    /// Create a resolution error
    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a file-not-found error for a path
    pub fn file_not_found(path: &std::path::Path) -> Self {
        Self::FileNotFound(path.display().to_string())
    }
}
