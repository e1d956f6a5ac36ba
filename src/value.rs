//! Typed context values.
//!
//! Every value a step produces, and every value stored in the transformation
//! context, is one [`Value`] variant. Callers read them back through the typed
//! accessors on `TransformationContext`, which report a type mismatch instead
//! of casting.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A value produced by a step or seeded into a context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Present but empty
    Null,
    Bool(bool),
    Integer(i64),
    Text(String),
    /// A single file or folder (absolute once produced by a step)
    Path(PathBuf),
    /// A collection of file references
    Paths(Vec<PathBuf>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Follow-up work a human has to do after the run
    ManualInstruction(ManualInstructionRecord),
}

impl Value {
    /// Name of the variant, used in type mismatch reports
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Text(_) => "text",
            Self::Path(_) => "path",
            Self::Paths(_) => "paths",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::ManualInstruction(_) => "manual instruction",
        }
    }

    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(p) => Some(p),
            _ => None,
        }
    }

    /// File references held by this value.
    ///
    /// A single path counts as a one-element collection, and a list counts if
    /// every element is a path. Anything else is `None`.
    pub fn file_references(&self) -> Option<Vec<&Path>> {
        match self {
            Self::Path(p) => Some(vec![p.as_path()]),
            Self::Paths(ps) => Some(ps.iter().map(PathBuf::as_path).collect()),
            Self::List(items) => items.iter().map(Value::as_path).collect(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Path(p) => write!(f, "{}", p.display()),
            Self::Paths(ps) => {
                let names: Vec<String> = ps.iter().map(|p| p.display().to_string()).collect();
                write!(f, "[{}]", names.join(", "))
            }
            Self::List(items) => {
                let items: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Self::Map(map) => {
                let entries: Vec<String> = map.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "{{{}}}", entries.join(", "))
            }
            Self::ManualInstruction(record) => write!(f, "{}", record.description),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<PathBuf> for Value {
    fn from(p: PathBuf) -> Self {
        Self::Path(p)
    }
}

impl From<Vec<PathBuf>> for Value {
    fn from(ps: Vec<PathBuf>) -> Self {
        Self::Paths(ps)
    }
}

impl From<ManualInstructionRecord> for Value {
    fn from(record: ManualInstructionRecord) -> Self {
        Self::ManualInstruction(record)
    }
}

/// A manual follow-up step surfaced to the caller at the end of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualInstructionRecord {
    /// Plan that produced the instruction
    pub plan_name: String,
    /// What the human has to do
    pub description: String,
    /// Link or document with the details
    pub resource: String,
}
