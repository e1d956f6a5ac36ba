//! Multi-file cloning: one template operation fanned out over a file set.
//!
//! The file set is gathered from context attributes while the plan runs, so
//! the number of children is only known at that point. Files are collected
//! into a `BTreeSet`: duplicates across attributes collapse, and children are
//! produced in path order, which does not depend on file contents.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::{relative_to_root, specialize, Step, Target};
use crate::context::{ContextError, TransformationContext};
use crate::plan::PlanError;

/// A template operation plus the attributes naming the files to apply it to
#[derive(Debug, Clone)]
pub struct MultipleOperations {
    template: Box<Step>,
    attributes: Vec<String>,
}

impl MultipleOperations {
    /// The template must be an operation; its own target is cleared.
    pub fn new<I, S>(template: Step, attributes: I) -> Result<Self, PlanError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if !template.is_operation() {
            return Err(PlanError::Definition(format!(
                "fan-out template must be an operation, got {}",
                template.kind()
            )));
        }
        let attributes: Vec<String> = attributes.into_iter().map(Into::into).collect();
        if attributes.is_empty() {
            return Err(PlanError::Definition(
                "fan-out needs at least one file attribute".to_string(),
            ));
        }
        Ok(Self {
            template: Box::new(template.at(Target::Unset)),
            attributes,
        })
    }

    #[inline]
    pub fn template(&self) -> &Step {
        &self.template
    }

    #[inline]
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn description(&self) -> String {
        format!(
            "Perform '{}' on every file in {}",
            self.template.description(),
            self.attributes.join(", ")
        )
    }

    /// De-duplicated union of the files held by every attribute
    pub fn files(&self, context: &TransformationContext) -> Result<BTreeSet<PathBuf>, ContextError> {
        let mut files = BTreeSet::new();
        for attribute in &self.attributes {
            files.extend(context.get_files(attribute)?);
        }
        Ok(files)
    }

    /// One specialized child per file, ordered 1..=n, each pointed at its file
    pub fn expand(
        &self,
        parent: &str,
        root: &Path,
        context: &TransformationContext,
    ) -> Result<Vec<Step>, ContextError> {
        let children = self
            .files(context)?
            .iter()
            .enumerate()
            .map(|(i, file)| {
                let target = Target::relative(relative_to_root(root, file));
                specialize(&self.template, parent, i + 1, Some(target))
            })
            .collect();
        Ok(children)
    }
}
