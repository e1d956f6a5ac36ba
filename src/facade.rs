//! Transformer Facade
//!
//! Entry point for callers: validates the request, prepares the folder the
//! plans run against, runs a single plan or an upgrade path, writes manual
//! instructions, optionally zips the result and notifies listeners.
//!
//! # Output handling
//!
//! ```text
//! no output folder, no zip   →  run in place
//! otherwise                  →  copy to <output or parent>/<app>-transformed-<timestamp>
//!                               run against the copy
//! zip                        →  archive the copy as <copy>.zip, remove the copy
//! ```

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::config::Configuration;
use crate::engine::{AbortDetails, Metrics, Statistics, TransformationEngine};
use crate::error::{ChrysalisError, Result};
use crate::plan::TransformationPlan;
use crate::upgrade::UpgradePath;
use crate::value::ManualInstructionRecord;

/// File manual instructions are written to, at the root of the transformed folder
pub const MANUAL_INSTRUCTIONS_FILE: &str = "MANUAL_INSTRUCTIONS.md";

// ============================================================================
// Requests and Results
// ============================================================================

/// What to apply to an application
#[derive(Debug, Clone)]
pub enum TransformationRequest {
    Plan(TransformationPlan),
    UpgradePath(UpgradePath),
}

impl TransformationRequest {
    pub fn name(&self) -> String {
        match self {
            Self::Plan(plan) => plan.name().to_string(),
            Self::UpgradePath(path) => format!(
                "upgrade-{}-to-{}",
                path.original_version(),
                path.upgrade_version()
            ),
        }
    }

    pub fn description(&self) -> String {
        match self {
            Self::Plan(plan) => plan.description().to_string(),
            Self::UpgradePath(path) => path.description(),
        }
    }

    #[inline]
    pub fn is_upgrade(&self) -> bool {
        matches!(self, Self::UpgradePath(_))
    }

    /// Every plan the request will run, in order
    pub fn plans(&self) -> &[TransformationPlan] {
        match self {
            Self::Plan(plan) => std::slice::from_ref(plan),
            Self::UpgradePath(path) => path.plans(),
        }
    }
}

/// Outcome of one transformation, serialisable to JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformationResult {
    pub id: Uuid,
    pub request_name: String,
    pub successful: bool,
    pub application_location: PathBuf,
    /// Folder (or zip file) holding the transformed application
    pub transformed_application_location: PathBuf,
    /// Absolute when the result is a folder, relative to the archive root when zipped
    pub manual_instructions_file: Option<PathBuf>,
    pub manual_instructions: Vec<ManualInstructionRecord>,
    pub upgrade_correlation_id: Option<Uuid>,
    /// One entry per plan that ran
    pub metrics: Vec<Metrics>,
    pub statistics: Statistics,
    pub abort_details: Option<AbortDetails>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TransformationResult {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Notified once per transformation, after output handling
pub trait TransformationListener: Send + Sync {
    /// Called after every run, aborted or not
    fn post_transformation(&self, _request: &TransformationRequest, _result: &TransformationResult) {}

    /// Called after `post_transformation` when the run aborted
    fn post_transformation_abort(&self, _request: &TransformationRequest, _result: &TransformationResult) {}
}

// ============================================================================
// Transformer
// ============================================================================

/// Runs requests against application folders
#[derive(Default)]
pub struct Transformer {
    listeners: Vec<Box<dyn TransformationListener>>,
}

impl Transformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listener(mut self, listener: impl TransformationListener + 'static) -> Self {
        self.listeners.push(Box::new(listener));
        self
    }

    /// Apply a request to an application folder
    ///
    /// # Errors
    ///
    /// - `Validation` if the application folder does not exist
    /// - `Config` if the configuration does not validate
    /// - `Engine` if the engine's bookkeeping fails
    /// - `Io`/`Output` if the copy, manual instructions or zip cannot be written
    ///
    /// An aborted plan is not an error: it is reported in the result.
    pub fn transform(
        &self,
        application: &Path,
        request: &TransformationRequest,
        config: &Configuration,
    ) -> Result<TransformationResult> {
        if !application.is_dir() {
            return Err(ChrysalisError::validation(format!(
                "application folder {} does not exist or is not a directory",
                application.display()
            )));
        }
        config
            .validate()
            .map_err(|e| ChrysalisError::config(format!("{e:#}")))?;

        let started_at = Utc::now();
        let work = prepare_folder(application, config)?;
        info!(
            request = %request.name(),
            folder = %work.display(),
            "Starting transformation: {}",
            request.description()
        );

        let engine = TransformationEngine::new().with_properties(config.properties.clone());
        let (runs, correlation) = match request {
            TransformationRequest::Plan(plan) => (vec![engine.run(&work, plan)?], None),
            TransformationRequest::UpgradePath(path) => {
                let upgrade = engine.run_upgrade_path(&work, path)?;
                (upgrade.runs, Some(upgrade.correlation_id))
            }
        };

        // an upgrade path that stops early has fewer runs than plans
        let successful = runs.len() == request.plans().len() && runs.iter().all(|r| r.is_successful());
        let mut statistics = Statistics::default();
        for run in &runs {
            statistics.absorb(run.statistics());
        }
        let manual_instructions: Vec<ManualInstructionRecord> =
            runs.iter().flat_map(|r| r.manual_instructions.iter().cloned()).collect();
        let abort_details = runs.iter().find_map(|r| r.abort_details()).cloned();
        let metrics: Vec<Metrics> = runs.into_iter().map(|r| r.metrics).collect();

        let mut manual_instructions_file = None;
        if !manual_instructions.is_empty() {
            let path = work.join(MANUAL_INSTRUCTIONS_FILE);
            write_manual_instructions(&path, request, &manual_instructions)?;
            manual_instructions_file = Some(path);
        }

        let mut transformed = work.clone();
        if config.zip_output {
            let archive = PathBuf::from(format!("{}.zip", work.display()));
            zip_folder(&work, &archive).map_err(|e| ChrysalisError::output(format!("{e:#}")))?;
            fs::remove_dir_all(&work)?;
            transformed = archive;
            manual_instructions_file = manual_instructions_file.map(|_| PathBuf::from(MANUAL_INSTRUCTIONS_FILE));
        }

        let result = TransformationResult {
            id: Uuid::new_v4(),
            request_name: request.name(),
            successful,
            application_location: application.to_path_buf(),
            transformed_application_location: transformed,
            manual_instructions_file,
            manual_instructions,
            upgrade_correlation_id: correlation,
            metrics,
            statistics,
            abort_details,
            started_at,
            finished_at: Utc::now(),
        };

        if result.successful {
            info!(request = %result.request_name, "Transformation completed");
        } else {
            warn!(request = %result.request_name, "Transformation aborted");
        }
        for listener in &self.listeners {
            listener.post_transformation(request, &result);
            if !result.successful {
                listener.post_transformation_abort(request, &result);
            }
        }

        Ok(result)
    }
}

// ============================================================================
// Output Helpers
// ============================================================================

/// The folder plans run against: the application itself, or a fresh copy
fn prepare_folder(application: &Path, config: &Configuration) -> Result<PathBuf> {
    if config.modifies_original_folder() {
        return Ok(application.to_path_buf());
    }

    let parent = match &config.output_folder {
        Some(folder) => folder.clone(),
        None => application
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ChrysalisError::output("application folder has no parent folder"))?,
    };
    let app_name = application
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "application".to_string());
    let timestamp = Utc::now().format("%Y%m%d%H%M%S%3f");
    let destination = parent.join(format!("{app_name}-transformed-{timestamp}"));

    copy_folder(application, &destination).map_err(|e| ChrysalisError::output(format!("{e:#}")))?;
    info!(from = %application.display(), to = %destination.display(), "Application copied");
    Ok(destination)
}

fn copy_folder(source: &Path, destination: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(destination).with_context(|| format!("failed to create {}", destination.display()))?;

    // the destination may sit inside the source when the output folder does
    let walker = WalkDir::new(source)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !e.path().starts_with(destination));

    for entry in walker {
        let entry = entry.with_context(|| format!("failed to read entry under {}", source.display()))?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .with_context(|| "failed to compute relative path")?;
        let target = destination.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).with_context(|| format!("failed to create {}", target.display()))?;
        } else {
            fs::copy(entry.path(), &target).with_context(|| format!("failed to copy {}", entry.path().display()))?;
        }
    }
    Ok(())
}

fn zip_folder(input_dir: &Path, output_path: &Path) -> anyhow::Result<usize> {
    let output_file = File::create(output_path)
        .with_context(|| format!("failed to create output file: {}", output_path.display()))?;

    let mut zip = ZipWriter::new(output_file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut file_count = 0usize;
    for entry in WalkDir::new(input_dir).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to read entry under {}", input_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(input_dir)
            .with_context(|| "failed to compute relative path")?;

        zip.start_file(normalize_zip_path(rel), options)
            .with_context(|| "failed to add file to zip")?;
        let mut src = File::open(entry.path()).with_context(|| format!("failed to open {}", entry.path().display()))?;
        std::io::copy(&mut src, &mut zip).with_context(|| format!("failed to write {}", entry.path().display()))?;
        file_count += 1;
    }

    zip.finish().with_context(|| "failed to finalize zip")?;
    Ok(file_count)
}

fn normalize_zip_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn write_manual_instructions(
    path: &Path,
    request: &TransformationRequest,
    records: &[ManualInstructionRecord],
) -> Result<()> {
    let mut text = format!(
        "# Manual Instructions\n\nThe transformation `{}` requires {} manual instruction(s).\n\n",
        request.name(),
        records.len()
    );
    for (i, record) in records.iter().enumerate() {
        text.push_str(&format!(
            "{}. **{}** ({})\n   See: {}\n",
            i + 1,
            record.description,
            record.plan_name,
            record.resource
        ));
    }
    fs::write(path, text)?;
    Ok(())
}
