//! File system operations.

use anyhow::Context;
use std::fs;

use crate::error::StepError;
use crate::result::OperationResult;
use crate::step::{Operation, StepInput, Target};

/// Delete a file or folder. A target that does not exist is a NO_OP.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteFile;

impl Operation for DeleteFile {
    fn kind(&self) -> &'static str {
        "DeleteFile"
    }

    fn description(&self) -> String {
        "Delete file".to_string()
    }

    fn execute(&self, input: &StepInput<'_>) -> anyhow::Result<OperationResult> {
        let path = input.target()?;
        let rel = input.relative(path);
        if !path.exists() {
            return Ok(OperationResult::no_op(format!("{rel} does not exist")));
        }
        if path.is_dir() {
            fs::remove_dir_all(path).with_context(|| format!("Failed to delete folder {rel}"))?;
        } else {
            fs::remove_file(path).with_context(|| format!("Failed to delete {rel}"))?;
        }
        Ok(OperationResult::success(format!("{rel} deleted")))
    }
}

/// Copy the target file into a destination folder, keeping its name
#[derive(Debug, Clone)]
pub struct CopyFile {
    destination: Target,
}

impl CopyFile {
    /// Destination folder relative to the application root
    pub fn to(folder: impl AsRef<str>) -> Self {
        Self::to_target(Target::relative(folder))
    }

    pub fn to_target(destination: Target) -> Self {
        Self { destination }
    }
}

impl Operation for CopyFile {
    fn kind(&self) -> &'static str {
        "CopyFile"
    }

    fn description(&self) -> String {
        format!("Copy file to {}", self.destination)
    }

    fn execute(&self, input: &StepInput<'_>) -> anyhow::Result<OperationResult> {
        let source = input.target()?;
        if !source.is_file() {
            return Err(StepError::file_not_found(source).into());
        }
        let folder = self.destination.resolve(input.root(), input.context())?;
        let file_name = source
            .file_name()
            .ok_or_else(|| StepError::invalid_argument(format!("{} has no file name", source.display())))?;
        let destination = folder.join(file_name);

        fs::create_dir_all(&folder).with_context(|| format!("Failed to create {}", folder.display()))?;
        fs::copy(source, &destination)
            .with_context(|| format!("Failed to copy {} to {}", source.display(), destination.display()))?;
        Ok(OperationResult::success(format!(
            "{} copied to {}",
            input.relative(source),
            input.relative(&destination)
        )))
    }
}

/// Rename the target within its own folder
#[derive(Debug, Clone)]
pub struct RenameFile {
    new_name: String,
}

impl RenameFile {
    pub fn to(new_name: impl Into<String>) -> Self {
        Self {
            new_name: new_name.into(),
        }
    }
}

impl Operation for RenameFile {
    fn kind(&self) -> &'static str {
        "RenameFile"
    }

    fn description(&self) -> String {
        format!("Rename file to {}", self.new_name)
    }

    fn execute(&self, input: &StepInput<'_>) -> anyhow::Result<OperationResult> {
        if self.new_name.is_empty() || self.new_name.contains(['/', '\\']) {
            return Err(StepError::invalid_argument(format!("'{}' is not a plain file name", self.new_name)).into());
        }
        let source = input.target()?;
        if !source.exists() {
            return Err(StepError::file_not_found(source).into());
        }
        let destination = source.with_file_name(&self.new_name);
        if destination.exists() {
            return Err(StepError::invalid_argument(format!("{} already exists", input.relative(&destination))).into());
        }
        fs::rename(source, &destination)
            .with_context(|| format!("Failed to rename {} to {}", source.display(), self.new_name))?;
        Ok(OperationResult::success(format!(
            "{} renamed to {}",
            input.relative(source),
            self.new_name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TransformationContext;
    use crate::result::OperationResultKind;

    #[test]
    fn test_delete_file_and_folder() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        let ctx = TransformationContext::new();
        let input = StepInput::new(dir.path(), &ctx);

        let file = dir.path().join("a.txt");
        assert_eq!(DeleteFile.execute(&input.with_target(&file)).unwrap().kind(), OperationResultKind::Success);
        assert!(!file.exists());
        assert_eq!(DeleteFile.execute(&input.with_target(&file)).unwrap().kind(), OperationResultKind::NoOp);

        let folder = dir.path().join("sub");
        DeleteFile.execute(&input.with_target(&folder)).unwrap();
        assert!(!folder.exists());
    }

    #[test]
    fn test_copy_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "payload").unwrap();
        let ctx = TransformationContext::new();
        let input = StepInput::new(dir.path(), &ctx);
        let source = dir.path().join("a.txt");

        let result = CopyFile::to("backup").execute(&input.with_target(&source)).unwrap();
        assert_eq!(result.details(), Some("a.txt copied to backup/a.txt"));
        assert_eq!(fs::read_to_string(dir.path().join("backup/a.txt")).unwrap(), "payload");
        assert!(source.exists());
    }

    #[test]
    fn test_rename_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old.txt"), "x").unwrap();
        fs::write(dir.path().join("taken.txt"), "y").unwrap();
        let ctx = TransformationContext::new();
        let input = StepInput::new(dir.path(), &ctx);
        let source = dir.path().join("old.txt");

        assert!(RenameFile::to("taken.txt").execute(&input.with_target(&source)).is_err());
        assert!(RenameFile::to("a/b.txt").execute(&input.with_target(&source)).is_err());
        RenameFile::to("new.txt").execute(&input.with_target(&source)).unwrap();
        assert!(dir.path().join("new.txt").exists());
        assert!(!source.exists());
    }
}
