//! Read-only file system lookups.

use anyhow::Context;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use super::full_match;
use crate::condition::Condition;
use crate::error::StepError;
use crate::result::UtilityResult;
use crate::step::{relative_to_root, StepInput, Utility};
use crate::value::Value;

fn require_folder(path: &Path) -> Result<(), StepError> {
    if path.is_dir() {
        Ok(())
    } else if path.exists() {
        Err(StepError::invalid_argument(format!("{} is not a folder", path.display())))
    } else {
        Err(StepError::file_not_found(path))
    }
}

/// Collect files and/or folders under the target folder.
///
/// Name patterns are matched against the entry's file name, path patterns
/// against its path relative to the target with `/` separators; both must
/// match the whole string. Results are sorted; nothing found is a NULL result.
#[derive(Debug, Clone)]
pub struct FindFiles {
    name: Option<Regex>,
    path: Option<Regex>,
    recursive: bool,
    files: bool,
    folders: bool,
}

impl Default for FindFiles {
    fn default() -> Self {
        Self::new()
    }
}

impl FindFiles {
    /// Every file directly under the target
    pub fn new() -> Self {
        Self {
            name: None,
            path: None,
            recursive: false,
            files: true,
            folders: false,
        }
    }

    pub fn named(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.name = Some(full_match(pattern)?);
        Ok(self)
    }

    pub fn with_path(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.path = Some(full_match(pattern)?);
        Ok(self)
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Choose which entry types are collected
    pub fn include(mut self, files: bool, folders: bool) -> Self {
        self.files = files;
        self.folders = folders;
        self
    }

    fn accepts(&self, base: &Path, entry: &walkdir::DirEntry) -> bool {
        let kind_ok = if entry.file_type().is_dir() { self.folders } else { self.files };
        if !kind_ok {
            return false;
        }
        let name_ok = self
            .name
            .as_ref()
            .is_none_or(|re| re.is_match(&entry.file_name().to_string_lossy()));
        let path_ok = self
            .path
            .as_ref()
            .is_none_or(|re| re.is_match(&relative_to_root(base, entry.path())));
        name_ok && path_ok
    }
}

impl Utility for FindFiles {
    fn kind(&self) -> &'static str {
        "FindFiles"
    }

    fn description(&self) -> String {
        let mut text = String::from("Find ");
        text.push_str(match (self.files, self.folders) {
            (true, true) => "files and folders",
            (false, true) => "folders",
            _ => "files",
        });
        if let Some(name) = &self.name {
            text.push_str(&format!(" named {name}"));
        }
        if let Some(path) = &self.path {
            text.push_str(&format!(" with path {path}"));
        }
        if self.recursive {
            text.push_str(" recursively");
        }
        text
    }

    fn execute(&self, input: &StepInput<'_>) -> anyhow::Result<UtilityResult> {
        let base = input.target()?;
        require_folder(base)?;

        let depth = if self.recursive { usize::MAX } else { 1 };
        let mut found = Vec::new();
        for entry in WalkDir::new(base).min_depth(1).max_depth(depth).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", base.display()))?;
            if self.accepts(base, &entry) {
                found.push(entry.into_path());
            }
        }

        let rel = input.relative(base);
        if found.is_empty() {
            return Ok(UtilityResult::null().with_details(format!("Nothing found under {rel}")));
        }
        let details = format!("{} entries found under {rel}", found.len());
        Ok(UtilityResult::value(found).with_details(details))
    }
}

/// First file with an exact name under the target folder, searched recursively
#[derive(Debug, Clone)]
pub struct FindFile {
    name: String,
}

impl FindFile {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Utility for FindFile {
    fn kind(&self) -> &'static str {
        "FindFile"
    }

    fn description(&self) -> String {
        format!("Find file {}", self.name)
    }

    fn execute(&self, input: &StepInput<'_>) -> anyhow::Result<UtilityResult> {
        let base = input.target()?;
        require_folder(base)?;

        let hit = WalkDir::new(base)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .find(|e| e.file_type().is_file() && e.file_name().to_string_lossy() == self.name.as_str());

        Ok(match hit {
            Some(entry) => {
                let details = format!("Found {}", input.relative(entry.path()));
                UtilityResult::value(entry.into_path()).with_details(details)
            }
            None => UtilityResult::null().with_details(format!("{} not found", self.name)),
        })
    }
}

/// Contents of the target file as text
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadFile;

impl Utility for LoadFile {
    fn kind(&self) -> &'static str {
        "LoadFile"
    }

    fn description(&self) -> String {
        "Load file contents".to_string()
    }

    fn execute(&self, input: &StepInput<'_>) -> anyhow::Result<UtilityResult> {
        let path = input.target()?;
        if !path.is_file() {
            return Err(StepError::file_not_found(path).into());
        }
        let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(UtilityResult::value(text).with_details(format!("Loaded {}", input.relative(path))))
    }
}

/// The files of a file-list attribute that satisfy a condition
#[derive(Debug, Clone)]
pub struct FilterFiles {
    attribute: String,
    condition: Arc<dyn Condition>,
}

impl FilterFiles {
    pub fn new(attribute: impl Into<String>, condition: impl Condition + 'static) -> Self {
        Self {
            attribute: attribute.into(),
            condition: Arc::new(condition),
        }
    }

    pub fn from_shared(attribute: impl Into<String>, condition: Arc<dyn Condition>) -> Self {
        Self {
            attribute: attribute.into(),
            condition,
        }
    }
}

impl Utility for FilterFiles {
    fn kind(&self) -> &'static str {
        "FilterFiles"
    }

    fn description(&self) -> String {
        format!("Filter files in '{}': {}", self.attribute, self.condition.description())
    }

    fn requires_target(&self) -> bool {
        false
    }

    fn execute(&self, input: &StepInput<'_>) -> anyhow::Result<UtilityResult> {
        let files = input.context().get_files(&self.attribute).map_err(StepError::from)?;
        let total = files.len();
        let mut kept: Vec<PathBuf> = Vec::new();
        for file in files {
            if self.condition.evaluate(&input.with_target(&file))? {
                kept.push(file);
            }
        }

        if kept.is_empty() {
            return Ok(UtilityResult::null().with_details(format!("None of {total} files matched")));
        }
        let details = format!("{} of {total} files matched", kept.len());
        Ok(UtilityResult::value(Value::Paths(kept)).with_details(details))
    }
}
