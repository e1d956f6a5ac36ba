//! Upgrade Path Chainer
//!
//! An [`UpgradePath`] is an ordered chain of plans, each migrating the
//! application by one version increment. Running it applies every plan to
//! the same folder in order, each with a fresh context, and stops at the
//! first abort.
//!
//! # Design
//!
//! - **Validated chain**: each plan's `from` version equals the previous
//!   plan's `to` version; this is checked once, at construction
//! - **Fresh contexts**: only the file tree carries over between plans
//! - **Correlated metrics**: every plan's metrics share one correlation id

use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::{AbortDetails, EngineError, Metrics, PlanRun, Statistics, TransformationEngine};
use crate::plan::TransformationPlan;
use crate::value::ManualInstructionRecord;

/// Upgrade path definition errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpgradePathError {
    #[error("an upgrade path needs at least one upgrade step")]
    Empty,

    #[error("plan '{plan}' does not declare from and to versions")]
    MissingVersions { plan: String },

    #[error("plan '{plan}' upgrades from {found}, but the previous step ends at {expected}")]
    BrokenChain {
        plan: String,
        expected: String,
        found: String,
    },

    #[error("upgrade version {0} is the same as the current version")]
    SameVersion(String),

    #[error("version {version} is not reachable by this upgrade path (reachable: {reachable})")]
    UnknownVersion { version: String, reachable: String },
}

/// An ordered chain of version-to-version plans
#[derive(Debug, Clone)]
pub struct UpgradePath {
    steps: Vec<TransformationPlan>,
}

impl UpgradePath {
    /// Build a chain, checking that every plan declares versions and that they connect
    pub fn new(steps: Vec<TransformationPlan>) -> Result<Self, UpgradePathError> {
        if steps.is_empty() {
            return Err(UpgradePathError::Empty);
        }

        let mut previous: Option<&str> = None;
        for plan in &steps {
            let hop = plan.upgrade().ok_or_else(|| UpgradePathError::MissingVersions {
                plan: plan.name().to_string(),
            })?;
            if let Some(expected) = previous {
                if hop.from != expected {
                    return Err(UpgradePathError::BrokenChain {
                        plan: plan.name().to_string(),
                        expected: expected.to_string(),
                        found: hop.from.clone(),
                    });
                }
            }
            previous = Some(&hop.to);
        }

        Ok(Self { steps })
    }

    /// Truncate the chain so it ends at `version`
    ///
    /// # Errors
    ///
    /// - `SameVersion` if `version` is the version the chain starts from
    /// - `UnknownVersion` if no plan in the chain upgrades to `version`
    pub fn up_to(mut self, version: &str) -> Result<Self, UpgradePathError> {
        if version == self.original_version() {
            return Err(UpgradePathError::SameVersion(version.to_string()));
        }
        let position = self
            .steps
            .iter()
            .position(|plan| plan.upgrade().is_some_and(|hop| hop.to == version))
            .ok_or_else(|| UpgradePathError::UnknownVersion {
                version: version.to_string(),
                reachable: self.reachable_versions().join(", "),
            })?;
        self.steps.truncate(position + 1);
        Ok(self)
    }

    /// Version the application is expected to be at before the chain runs
    pub fn original_version(&self) -> &str {
        self.steps
            .first()
            .and_then(TransformationPlan::upgrade)
            .map_or("", |hop| hop.from.as_str())
    }

    /// Version the application is at once the chain completes
    pub fn upgrade_version(&self) -> &str {
        self.steps
            .last()
            .and_then(TransformationPlan::upgrade)
            .map_or("", |hop| hop.to.as_str())
    }

    /// Every version the chain passes through after the original one
    pub fn reachable_versions(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|plan| plan.upgrade().map(|hop| hop.to.as_str()))
            .collect()
    }

    #[inline]
    pub fn plans(&self) -> &[TransformationPlan] {
        &self.steps
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn description(&self) -> String {
        format!(
            "Upgrade path from version {} to version {}",
            self.original_version(),
            self.upgrade_version()
        )
    }
}

/// Outcome of running an upgrade path
#[derive(Debug)]
pub struct UpgradeRun {
    pub correlation_id: Uuid,
    /// One run per plan executed, in order; the last one may be aborted
    pub runs: Vec<PlanRun>,
    planned: usize,
}

impl UpgradeRun {
    /// Every plan of the chain ran and completed
    pub fn is_successful(&self) -> bool {
        self.runs.len() == self.planned && self.runs.iter().all(PlanRun::is_successful)
    }

    pub fn abort_details(&self) -> Option<&AbortDetails> {
        self.runs.iter().find_map(PlanRun::abort_details)
    }

    pub fn metrics(&self) -> Vec<Metrics> {
        self.runs.iter().map(|run| run.metrics.clone()).collect()
    }

    /// Counters summed over every plan executed
    pub fn statistics(&self) -> Statistics {
        let mut total = Statistics::default();
        for run in &self.runs {
            total.absorb(run.statistics());
        }
        total
    }

    pub fn manual_instructions(&self) -> Vec<ManualInstructionRecord> {
        self.runs
            .iter()
            .flat_map(|run| run.manual_instructions.iter().cloned())
            .collect()
    }
}

impl TransformationEngine {
    /// Run every plan of the chain against the same folder, stopping at the first abort
    pub fn run_upgrade_path(&self, application_folder: &Path, path: &UpgradePath) -> Result<UpgradeRun, EngineError> {
        let correlation_id = Uuid::new_v4();
        info!(
            correlation = %correlation_id,
            steps = path.len(),
            "{}",
            path.description()
        );

        let mut runs = Vec::with_capacity(path.len());
        for plan in path.plans() {
            let run = self.run_correlated(application_folder, plan, Some(correlation_id))?;
            let aborted = !run.is_successful();
            runs.push(run);
            if aborted {
                warn!(
                    correlation = %correlation_id,
                    plan = %plan.name(),
                    "Upgrade path stopped at an aborted step"
                );
                break;
            }
        }

        Ok(UpgradeRun {
            correlation_id,
            runs,
            planned: path.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hop(name: &str, from: &str, to: &str) -> TransformationPlan {
        TransformationPlan::new(name, "upgrade").with_versions(from, to)
    }

    #[test]
    fn test_chain_must_connect() {
        let err = UpgradePath::new(vec![hop("a", "1", "2"), hop("b", "3", "4")]).unwrap_err();
        assert_eq!(
            err,
            UpgradePathError::BrokenChain {
                plan: "b".into(),
                expected: "2".into(),
                found: "3".into()
            }
        );
        assert_eq!(UpgradePath::new(vec![]).unwrap_err(), UpgradePathError::Empty);
        assert!(matches!(
            UpgradePath::new(vec![TransformationPlan::new("plain", "no versions")]),
            Err(UpgradePathError::MissingVersions { .. })
        ));
    }

    #[test]
    fn test_versions_and_description() {
        let path = UpgradePath::new(vec![hop("a", "1", "2"), hop("b", "2", "3")]).unwrap();
        assert_eq!(path.original_version(), "1");
        assert_eq!(path.upgrade_version(), "3");
        assert_eq!(path.reachable_versions(), vec!["2", "3"]);
        assert_eq!(path.description(), "Upgrade path from version 1 to version 3");
    }

    #[test]
    fn test_up_to() {
        let path = UpgradePath::new(vec![hop("a", "1", "2"), hop("b", "2", "3"), hop("c", "3", "4")]).unwrap();
        let shorter = path.clone().up_to("3").unwrap();
        assert_eq!(shorter.len(), 2);
        assert_eq!(shorter.upgrade_version(), "3");

        assert_eq!(path.clone().up_to("1").unwrap_err(), UpgradePathError::SameVersion("1".into()));
        assert!(matches!(path.up_to("9"), Err(UpgradePathError::UnknownVersion { .. })));
    }
}
