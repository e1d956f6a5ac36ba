//! Plan Registry
//!
//! Named plan documents, loaded from a folder of JSON files. Owned by whoever
//! builds it; there is no process-wide instance.

use std::collections::BTreeMap;
use std::path::Path;

use crate::facade::TransformationRequest;
use crate::plan_file::{PlanDocument, PlanFileError};

/// Registry of plan documents keyed by document name
#[derive(Debug, Default, Clone)]
pub struct PlanRegistry {
    documents: BTreeMap<String, PlanDocument>,
}

impl PlanRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document, replacing one with the same name
    pub fn register(&mut self, document: PlanDocument) {
        if self.documents.contains_key(&document.name) {
            tracing::warn!(name = %document.name, "Replacing registered plan document");
        }
        self.documents.insert(document.name.clone(), document);
    }

    /// Get a document by name
    pub fn get(&self, name: &str) -> Option<&PlanDocument> {
        self.documents.get(name)
    }

    /// Load every `.json` document in a directory, returning how many were read
    pub fn load_from_directory(&mut self, dir: impl AsRef<Path>) -> Result<usize, PlanFileError> {
        let dir = dir.as_ref();
        let mut count = 0;

        if !dir.exists() {
            return Ok(0);
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|e| e == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let document = PlanDocument::from_file(&path).map_err(|e| match e {
                PlanFileError::Parse(err) => PlanFileError::Definition(format!("{}: {err}", path.display())),
                other => other,
            })?;
            tracing::debug!(name = %document.name, path = %path.display(), "Plan document loaded");
            self.register(document);
            count += 1;
        }

        Ok(count)
    }

    /// Build the request of a registered document
    pub fn request(&self, name: &str, up_to: Option<&str>) -> Result<TransformationRequest, PlanFileError> {
        let document = self.get(name).ok_or_else(|| PlanFileError::NotFound {
            name: name.to_string(),
        })?;
        document.build(up_to)
    }

    /// Registered document names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }

    /// Get all registered documents
    pub fn all(&self) -> impl Iterator<Item = &PlanDocument> {
        self.documents.values()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(name: &str) -> String {
        format!(
            r#"{{"name": "{name}", "description": "test", "plans": [
                {{"name": "{name}", "steps": [ {{"type": "Log", "message": "hi"}} ]}}
            ]}}"#
        )
    }

    #[test]
    fn test_registry_register_and_get() {
        let mut registry = PlanRegistry::new();
        registry.register(PlanDocument::from_json(&document("a")).unwrap());

        assert!(registry.get("a").is_some());
        assert!(registry.get("b").is_none());
        assert!(matches!(registry.request("b", None), Err(PlanFileError::NotFound { .. })));
        assert!(matches!(registry.request("a", None), Ok(TransformationRequest::Plan(_))));
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.json"), document("beta")).unwrap();
        std::fs::write(dir.path().join("a.json"), document("alpha")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut registry = PlanRegistry::new();
        assert_eq!(registry.load_from_directory(dir.path()).unwrap(), 2);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["alpha", "beta"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = PlanRegistry::new();
        assert_eq!(registry.load_from_directory(dir.path().join("nope")).unwrap(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_invalid_document_names_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();
        let err = PlanRegistry::new().load_from_directory(dir.path()).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }
}
