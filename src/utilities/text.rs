//! Line-oriented text edits.
//!
//! Every edit reads the whole file, changes its lines and writes it back with
//! the line separator it was read with.

use anyhow::Context;
use regex::Regex;
use std::fs;
use std::path::Path;

use super::full_match;
use crate::error::StepError;
use crate::result::OperationResult;
use crate::step::{Operation, StepInput};

// ============================================================================
// Text File Buffer
// ============================================================================

/// A text file split into lines, remembering its end-of-line convention
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TextFile {
    pub lines: Vec<String>,
    eol: &'static str,
    trailing_eol: bool,
}

impl TextFile {
    pub fn parse(content: &str) -> Self {
        let eol = if content.contains("\r\n") { "\r\n" } else { "\n" };
        let trailing_eol = content.ends_with('\n');
        let body = content.strip_suffix('\n').unwrap_or(content);
        let body = body.strip_suffix('\r').unwrap_or(body);
        let lines = if content.is_empty() {
            Vec::new()
        } else {
            body.split('\n')
                .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
                .collect()
        };
        Self {
            lines,
            eol,
            trailing_eol,
        }
    }

    /// Read a file that must exist
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        if !path.is_file() {
            return Err(StepError::file_not_found(path).into());
        }
        let content = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Self::parse(&content))
    }

    pub fn render(&self) -> String {
        let mut out = self.lines.join(self.eol);
        if !self.lines.is_empty() && self.trailing_eol {
            out.push_str(self.eol);
        }
        out
    }

    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        fs::write(path, self.render()).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Append a line, closing an unterminated last line first
    pub fn append(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
        self.trailing_eol = true;
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Append a line at the end of a file
#[derive(Debug, Clone)]
pub struct AddLine {
    line: String,
}

impl AddLine {
    pub fn new(line: impl Into<String>) -> Self {
        Self { line: line.into() }
    }
}

impl Operation for AddLine {
    fn kind(&self) -> &'static str {
        "AddLine"
    }

    fn description(&self) -> String {
        format!("Add line '{}'", self.line)
    }

    fn execute(&self, input: &StepInput<'_>) -> anyhow::Result<OperationResult> {
        let path = input.target()?;
        let mut file = TextFile::read(path)?;
        file.append(self.line.as_str());
        file.write(path)?;
        Ok(OperationResult::success(format!("Line added to {}", input.relative(path))))
    }
}

/// Where [`InsertLine`] puts its line
#[derive(Debug, Clone)]
pub enum Insertion {
    /// Before the existing line with this 1-based number (one past the end appends)
    LineNumber(usize),
    After { regex: Regex, all: bool },
    Before { regex: Regex, all: bool },
}

/// Insert a line at a line number or next to lines matching a regex
#[derive(Debug, Clone)]
pub struct InsertLine {
    line: String,
    at: Insertion,
}

impl InsertLine {
    pub fn at_line(line: impl Into<String>, number: usize) -> Self {
        Self {
            line: line.into(),
            at: Insertion::LineNumber(number),
        }
    }

    /// After the first line fully matching `pattern`
    pub fn after(line: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            line: line.into(),
            at: Insertion::After {
                regex: full_match(pattern)?,
                all: false,
            },
        })
    }

    /// Before the first line fully matching `pattern`
    pub fn before(line: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            line: line.into(),
            at: Insertion::Before {
                regex: full_match(pattern)?,
                all: false,
            },
        })
    }

    /// Apply a regex insertion next to every matching line
    pub fn all_matches(mut self) -> Self {
        if let Insertion::After { all, .. } | Insertion::Before { all, .. } = &mut self.at {
            *all = true;
        }
        self
    }

    fn insert(&self, lines: &[String]) -> Result<Option<Vec<String>>, StepError> {
        match &self.at {
            Insertion::LineNumber(number) => self.insert_at(lines, *number),
            Insertion::After { regex, all } => Ok(self.insert_near(lines, regex, *all, true)),
            Insertion::Before { regex, all } => Ok(self.insert_near(lines, regex, *all, false)),
        }
    }

    fn insert_at(&self, lines: &[String], number: usize) -> Result<Option<Vec<String>>, StepError> {
        if number == 0 {
            return Err(StepError::invalid_argument("line numbers start at 1"));
        }
        if number > lines.len() + 1 {
            return Ok(None);
        }
        let mut out = lines.to_vec();
        out.insert(number - 1, self.line.clone());
        Ok(Some(out))
    }

    fn insert_near(&self, lines: &[String], regex: &Regex, all: bool, after: bool) -> Option<Vec<String>> {
        let mut out = Vec::with_capacity(lines.len() + 1);
        let mut inserted = 0usize;
        for line in lines {
            let hit = (all || inserted == 0) && regex.is_match(line);
            if hit && !after {
                out.push(self.line.clone());
            }
            out.push(line.clone());
            if hit && after {
                out.push(self.line.clone());
            }
            inserted += usize::from(hit);
        }
        (inserted > 0).then_some(out)
    }
}

impl Operation for InsertLine {
    fn kind(&self) -> &'static str {
        "InsertLine"
    }

    fn description(&self) -> String {
        match &self.at {
            Insertion::LineNumber(n) => format!("Insert line '{}' at line {n}", self.line),
            Insertion::After { regex, .. } => format!("Insert line '{}' after lines matching {regex}", self.line),
            Insertion::Before { regex, .. } => format!("Insert line '{}' before lines matching {regex}", self.line),
        }
    }

    fn execute(&self, input: &StepInput<'_>) -> anyhow::Result<OperationResult> {
        let path = input.target()?;
        let mut file = TextFile::read(path)?;
        let rel = input.relative(path);
        match self.insert(&file.lines)? {
            Some(lines) => {
                file.lines = lines;
                file.write(path)?;
                Ok(OperationResult::success(format!("Line inserted into {rel}")))
            }
            None => Ok(OperationResult::no_op(format!("No insertion point found in {rel}"))),
        }
    }
}

/// Remove lines fully matching a regex
#[derive(Debug, Clone)]
pub struct RemoveLine {
    regex: Regex,
    first_only: bool,
}

impl RemoveLine {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: full_match(pattern)?,
            first_only: false,
        })
    }

    pub fn first_only(mut self) -> Self {
        self.first_only = true;
        self
    }
}

impl Operation for RemoveLine {
    fn kind(&self) -> &'static str {
        "RemoveLine"
    }

    fn description(&self) -> String {
        let which = if self.first_only { "the first line" } else { "lines" };
        format!("Remove {which} matching {}", self.regex)
    }

    fn execute(&self, input: &StepInput<'_>) -> anyhow::Result<OperationResult> {
        let path = input.target()?;
        let mut file = TextFile::read(path)?;
        let rel = input.relative(path);

        let mut removed = 0usize;
        file.lines.retain(|line| {
            let drop = !(self.first_only && removed > 0) && self.regex.is_match(line);
            removed += usize::from(drop);
            !drop
        });

        if removed == 0 {
            return Ok(OperationResult::no_op(format!("No line in {rel} matched")));
        }
        file.write(path)?;
        Ok(OperationResult::success(format!("{removed} line(s) removed from {rel}")))
    }
}

/// Replace regex matches line by line
#[derive(Debug, Clone)]
pub struct ReplaceText {
    regex: Regex,
    replacement: String,
    first_only: bool,
}

impl ReplaceText {
    /// `replacement` may refer to capture groups as `$1` or `${name}`
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            replacement: replacement.into(),
            first_only: false,
        })
    }

    pub fn first_only(mut self) -> Self {
        self.first_only = true;
        self
    }
}

impl Operation for ReplaceText {
    fn kind(&self) -> &'static str {
        "ReplaceText"
    }

    fn description(&self) -> String {
        format!("Replace {} with '{}'", self.regex, self.replacement)
    }

    fn execute(&self, input: &StepInput<'_>) -> anyhow::Result<OperationResult> {
        let path = input.target()?;
        let mut file = TextFile::read(path)?;
        let rel = input.relative(path);

        let mut replaced = 0usize;
        for line in &mut file.lines {
            if self.first_only && replaced > 0 {
                break;
            }
            let hits = self.regex.find_iter(line).count();
            if hits == 0 {
                continue;
            }
            if self.first_only {
                *line = self.regex.replace(line, self.replacement.as_str()).into_owned();
                replaced += 1;
            } else {
                *line = self.regex.replace_all(line, self.replacement.as_str()).into_owned();
                replaced += hits;
            }
        }

        if replaced == 0 {
            return Ok(OperationResult::no_op(format!("No text in {rel} matched {}", self.regex)));
        }
        file.write(path)?;
        Ok(OperationResult::success(format!("{replaced} replacement(s) made in {rel}")))
    }
}
