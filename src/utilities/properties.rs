//! Java-style `.properties` files: `key=value`, `key: value` or `key value`,
//! with `#` and `!` comment lines.

use crate::result::OperationResult;
use crate::step::{Operation, StepInput};

use super::text::TextFile;

/// Key and raw value of a property line, `None` for comments and blank lines
pub(crate) fn parse_property(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_start();
    if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
        return None;
    }
    let end = line
        .find(|c: char| c == '=' || c == ':' || c.is_whitespace())
        .unwrap_or(line.len());
    let key = &line[..end];
    let rest = line[end..].trim_start();
    let value = rest
        .strip_prefix('=')
        .or_else(|| rest.strip_prefix(':'))
        .unwrap_or(rest)
        .trim_start();
    Some((key, value))
}

fn is_key(line: &str, key: &str) -> bool {
    parse_property(line).is_some_and(|(k, _)| k == key)
}

/// Set a property, replacing the first definition or appending a new one
#[derive(Debug, Clone)]
pub struct AddProperty {
    key: String,
    value: String,
}

impl AddProperty {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl Operation for AddProperty {
    fn kind(&self) -> &'static str {
        "AddProperty"
    }

    fn description(&self) -> String {
        format!("Set property {}={}", self.key, self.value)
    }

    fn execute(&self, input: &StepInput<'_>) -> anyhow::Result<OperationResult> {
        let path = input.target()?;
        let mut file = TextFile::read(path)?;
        let rel = input.relative(path);
        let entry = format!("{}={}", self.key, self.value);

        match file.lines.iter().position(|line| is_key(line, &self.key)) {
            Some(i) if parse_property(&file.lines[i]).map(|(_, v)| v) == Some(self.value.as_str()) => Ok(
                OperationResult::no_op(format!("Property '{}' already set in {rel}", self.key)),
            ),
            Some(i) => {
                file.lines[i] = entry;
                file.write(path)?;
                Ok(OperationResult::success(format!("Property '{}' replaced in {rel}", self.key)))
            }
            None => {
                file.append(entry);
                file.write(path)?;
                Ok(OperationResult::success(format!("Property '{}' added to {rel}", self.key)))
            }
        }
    }
}

/// Remove every definition of a property
#[derive(Debug, Clone)]
pub struct RemoveProperty {
    key: String,
}

impl RemoveProperty {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Operation for RemoveProperty {
    fn kind(&self) -> &'static str {
        "RemoveProperty"
    }

    fn description(&self) -> String {
        format!("Remove property {}", self.key)
    }

    fn execute(&self, input: &StepInput<'_>) -> anyhow::Result<OperationResult> {
        let path = input.target()?;
        let mut file = TextFile::read(path)?;
        let rel = input.relative(path);

        let before = file.lines.len();
        file.lines.retain(|line| !is_key(line, &self.key));
        if file.lines.len() == before {
            return Ok(OperationResult::no_op(format!("Property '{}' not present in {rel}", self.key)));
        }
        file.write(path)?;
        Ok(OperationResult::success(format!("Property '{}' removed from {rel}", self.key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TransformationContext;
    use crate::result::OperationResultKind;
    use std::fs;

    #[test]
    fn test_parse_property() {
        assert_eq!(parse_property("a=1"), Some(("a", "1")));
        assert_eq!(parse_property("  a : 1"), Some(("a", "1")));
        assert_eq!(parse_property("a 1"), Some(("a", "1")));
        assert_eq!(parse_property("flag"), Some(("flag", "")));
        assert_eq!(parse_property("# a=1"), None);
        assert_eq!(parse_property("! a=1"), None);
        assert_eq!(parse_property("   "), None);
    }

    fn apply(op: &dyn Operation, content: &str) -> (OperationResultKind, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.properties");
        fs::write(&path, content).unwrap();
        let ctx = TransformationContext::new();
        let input = StepInput::new(dir.path(), &ctx);
        let result = op.execute(&input.with_target(&path)).unwrap();
        (result.kind(), fs::read_to_string(&path).unwrap())
    }

    #[test]
    fn test_add_property() {
        let (kind, content) = apply(&AddProperty::new("b", "2"), "a=1\n");
        assert_eq!(kind, OperationResultKind::Success);
        assert_eq!(content, "a=1\nb=2\n");

        let (_, content) = apply(&AddProperty::new("a", "9"), "# a=0\na = 1\n");
        assert_eq!(content, "# a=0\na=9\n");

        let (kind, _) = apply(&AddProperty::new("a", "1"), "a=1\n");
        assert_eq!(kind, OperationResultKind::NoOp);
    }

    #[test]
    fn test_remove_property() {
        let (kind, content) = apply(&RemoveProperty::new("a"), "a=1\r\nb=2\r\na:3\r\n");
        assert_eq!(kind, OperationResultKind::Success);
        assert_eq!(content, "b=2\r\n");

        let (kind, _) = apply(&RemoveProperty::new("zzz"), "a=1\n");
        assert_eq!(kind, OperationResultKind::NoOp);
    }
}
