//! Plan Run State Machine
//!
//! Authoritative record of where one plan run is. Transitions are validated,
//! so a run cannot complete twice, resume after an abort, or skip `Running`.
//!
//! # Stage Flow
//!
//! ```text
//! Pending
//!    ↓
//! Running ──→ Aborted   (a step failed with abort-on-failure set)
//!    ↓
//! Completed
//!
//! (Pending or Running can transition to Failed on an engine fault)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stages of one plan run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStage {
    /// Created, no step has run yet
    Pending,
    /// Steps are being executed
    Running,
    /// Every step was processed without an abort (terminal)
    Completed,
    /// A step requested an abort (terminal)
    Aborted,
    /// The engine itself hit a fault (terminal)
    Failed,
}

impl RunStage {
    /// Returns true for Completed, Aborted and Failed
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Failed)
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Aborted => "Aborted",
            Self::Failed => "Failed",
        }
    }

    /// Whether `target` may follow this stage
    const fn allows(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Aborted)
                | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during run stage transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunTransitionError {
    /// The run already finished
    #[error("Cannot transition from terminal stage {from}")]
    FromTerminalStage { from: RunStage },

    /// Transition to the current stage
    #[error("Already at stage {stage}")]
    AlreadyAtStage { stage: RunStage },

    /// Any other transition the flow does not allow
    #[error("Cannot move from {from} to {to}")]
    InvalidTransition { from: RunStage, to: RunStage },
}

/// Current stage plus a timestamped history of every stage entered
#[derive(Debug, Clone)]
pub struct RunTracker {
    current: RunStage,
    history: Vec<(RunStage, DateTime<Utc>)>,
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RunTracker {
    /// A tracker in the Pending stage
    pub fn new() -> Self {
        Self {
            current: RunStage::Pending,
            history: vec![(RunStage::Pending, Utc::now())],
        }
    }

    #[inline]
    pub fn current(&self) -> RunStage {
        self.current
    }

    /// Stages entered so far, oldest first
    pub fn history(&self) -> &[(RunStage, DateTime<Utc>)] {
        &self.history
    }

    /// Move to `target`, validating the transition
    ///
    /// # Errors
    ///
    /// - `FromTerminalStage` if the run already finished
    /// - `AlreadyAtStage` if `target` is the current stage
    /// - `InvalidTransition` for any transition outside the flow
    pub fn transition_to(&mut self, target: RunStage) -> Result<RunStage, RunTransitionError> {
        if self.current.is_terminal() {
            return Err(RunTransitionError::FromTerminalStage { from: self.current });
        }
        if target == self.current {
            return Err(RunTransitionError::AlreadyAtStage { stage: target });
        }
        if !self.current.allows(target) {
            return Err(RunTransitionError::InvalidTransition {
                from: self.current,
                to: target,
            });
        }

        self.history.push((target, Utc::now()));
        self.current = target;
        Ok(target)
    }

    pub fn start(&mut self) -> Result<RunStage, RunTransitionError> {
        self.transition_to(RunStage::Running)
    }

    pub fn complete(&mut self) -> Result<RunStage, RunTransitionError> {
        self.transition_to(RunStage::Completed)
    }

    pub fn abort(&mut self) -> Result<RunStage, RunTransitionError> {
        self.transition_to(RunStage::Aborted)
    }

    pub fn fail(&mut self) -> Result<RunStage, RunTransitionError> {
        self.transition_to(RunStage::Failed)
    }

    /// When the run entered `Running`, if it did
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.entered(RunStage::Running)
    }

    /// When the run reached its terminal stage, if it did
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.current
            .is_terminal()
            .then(|| self.entered(self.current))
            .flatten()
    }

    fn entered(&self, stage: RunStage) -> Option<DateTime<Utc>> {
        self.history.iter().find(|(s, _)| *s == stage).map(|(_, at)| *at)
    }
}
