//! Transformation Context
//!
//! The run-scoped store threaded through every step of one plan run: a map of
//! named attribute values plus the result ledger (step name to `PerformResult`).
//!
//! A name that was never written is distinct from a name written with
//! [`Value::Null`]: `contains` answers the first question, `get` the second.
//! Typed accessors return a [`ContextError`] instead of casting.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::result::PerformResult;
use crate::value::Value;

/// Context lookup failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// No attribute with that name was ever written
    #[error("context attribute '{name}' does not exist")]
    NotFound { name: String },

    /// The attribute exists but holds null
    #[error("context attribute '{name}' is null")]
    Null { name: String },

    /// The attribute holds a different kind of value
    #[error("context attribute '{name}' holds a {found} value, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Attribute names cannot be blank
    #[error("context attribute name cannot be blank")]
    BlankName,
}

/// Attribute store plus result ledger for one plan run
#[derive(Debug, Clone, Default)]
pub struct TransformationContext {
    attributes: HashMap<String, Value>,
    results: HashMap<String, PerformResult>,
}

impl TransformationContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value. The last writer for a name wins.
    pub fn put(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<(), ContextError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ContextError::BlankName);
        }
        self.attributes.insert(name, value.into());
        Ok(())
    }

    /// Whether an attribute with this name exists (null values included)
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Raw attribute lookup
    #[inline]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Lookup that fails when the attribute is absent
    pub fn require(&self, name: &str) -> Result<&Value, ContextError> {
        self.get(name).ok_or_else(|| ContextError::NotFound {
            name: name.to_string(),
        })
    }

    /// Lookup that fails when the attribute is absent or null
    fn require_non_null(&self, name: &str) -> Result<&Value, ContextError> {
        match self.require(name)? {
            Value::Null => Err(ContextError::Null {
                name: name.to_string(),
            }),
            value => Ok(value),
        }
    }

    fn mismatch(name: &str, expected: &'static str, found: &Value) -> ContextError {
        ContextError::TypeMismatch {
            name: name.to_string(),
            expected,
            found: found.type_name(),
        }
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, ContextError> {
        let value = self.require_non_null(name)?;
        value.as_bool().ok_or_else(|| Self::mismatch(name, "bool", value))
    }

    pub fn get_text(&self, name: &str) -> Result<&str, ContextError> {
        let value = self.require_non_null(name)?;
        value.as_text().ok_or_else(|| Self::mismatch(name, "text", value))
    }

    pub fn get_path(&self, name: &str) -> Result<&Path, ContextError> {
        let value = self.require_non_null(name)?;
        value.as_path().ok_or_else(|| Self::mismatch(name, "path", value))
    }

    /// File references held by an attribute (a path, a path collection or a list of paths).
    ///
    /// A null attribute yields an empty collection; an absent one is an error.
    pub fn get_files(&self, name: &str) -> Result<Vec<PathBuf>, ContextError> {
        let value = self.require(name)?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        value
            .file_references()
            .map(|refs| refs.into_iter().map(Path::to_path_buf).collect())
            .ok_or_else(|| Self::mismatch(name, "file references", value))
    }

    // ========================================================================
    // Result Ledger
    // ========================================================================

    /// Ledger entry for a step
    #[inline]
    pub fn result(&self, step_name: &str) -> Option<&PerformResult> {
        self.results.get(step_name)
    }

    /// Whether a ledger entry exists for a step
    #[inline]
    pub fn has_result(&self, step_name: &str) -> bool {
        self.results.contains_key(step_name)
    }

    /// Record a step result, returning the previous entry if the name was already used
    pub(crate) fn put_result(&mut self, step_name: impl Into<String>, result: PerformResult) -> Option<PerformResult> {
        self.results.insert(step_name.into(), result)
    }

    /// Number of ledger entries
    pub fn result_count(&self) -> usize {
        self.results.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::UtilityResult;

    #[test]
    fn test_absent_differs_from_null() {
        let mut ctx = TransformationContext::new();
        ctx.put("empty", Value::Null).unwrap();

        assert!(ctx.contains("empty"));
        assert_eq!(ctx.get("empty"), Some(&Value::Null));
        assert!(!ctx.contains("missing"));
        assert_eq!(ctx.get("missing"), None);
    }

    #[test]
    fn test_last_writer_wins() {
        let mut ctx = TransformationContext::new();
        ctx.put("k", "first").unwrap();
        ctx.put("k", "second").unwrap();
        assert_eq!(ctx.get_text("k").unwrap(), "second");
    }

    #[test]
    fn test_blank_names_rejected() {
        let mut ctx = TransformationContext::new();
        assert_eq!(ctx.put("  ", true), Err(ContextError::BlankName));
    }

    #[test]
    fn test_typed_accessor_errors() {
        let mut ctx = TransformationContext::new();
        ctx.put("flag", true).unwrap();
        ctx.put("nothing", Value::Null).unwrap();

        assert!(ctx.get_bool("flag").unwrap());
        assert_eq!(
            ctx.get_path("flag"),
            Err(ContextError::TypeMismatch {
                name: "flag".into(),
                expected: "path",
                found: "bool"
            })
        );
        assert_eq!(ctx.get_path("nothing"), Err(ContextError::Null { name: "nothing".into() }));
        assert_eq!(ctx.get_bool("nope"), Err(ContextError::NotFound { name: "nope".into() }));
    }

    #[test]
    fn test_get_files() {
        let mut ctx = TransformationContext::new();
        ctx.put("one", PathBuf::from("/app/a")).unwrap();
        ctx.put("many", vec![PathBuf::from("/app/a"), PathBuf::from("/app/b")]).unwrap();
        ctx.put("none", Value::Null).unwrap();
        ctx.put("text", "x").unwrap();

        assert_eq!(ctx.get_files("one").unwrap().len(), 1);
        assert_eq!(ctx.get_files("many").unwrap().len(), 2);
        assert!(ctx.get_files("none").unwrap().is_empty());
        assert!(ctx.get_files("text").is_err());
        assert!(ctx.get_files("absent").is_err());
    }

    #[test]
    fn test_ledger() {
        let mut ctx = TransformationContext::new();
        assert!(ctx.put_result("s1", UtilityResult::value(true).into()).is_none());
        assert!(ctx.has_result("s1"));
        assert!(ctx.put_result("s1", UtilityResult::null().into()).is_some());
        assert_eq!(ctx.result_count(), 1);
    }
}
