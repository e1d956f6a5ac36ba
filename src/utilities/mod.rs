//! Built-in Leaf Catalog
//!
//! Conditions, utilities and operations that plans are assembled from.
//!
//! # Layout
//!
//! - `conditions`: boolean checks ([`FileExists`], [`RegexMatch`], ...)
//! - `file`: read-only file system lookups ([`FindFiles`], [`LoadFile`], ...)
//! - `misc`: context helpers plus [`Log`], [`Abort`] and [`ManualInstruction`]
//! - `text`: line-oriented edits that keep the file's end-of-line convention
//! - `fs_ops`: delete, copy and rename
//! - `properties`: Java-style `.properties` edits

mod conditions;
mod file;
mod fs_ops;
mod misc;
mod properties;
mod text;

pub use conditions::{CompareFiles, FileExists, PropertyExists, RegexMatch, ResultCondition};
pub use file::{FilterFiles, FindFile, FindFiles, LoadFile};
pub use fs_ops::{CopyFile, DeleteFile, RenameFile};
pub use misc::{Abort, Log, LogLevel, ManualInstruction, MapValue, StringFormat};
pub use properties::{AddProperty, RemoveProperty};
pub use text::{AddLine, InsertLine, Insertion, RemoveLine, ReplaceText};

use regex::Regex;

/// Compile a pattern that must match a whole line
pub(crate) fn full_match(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}
