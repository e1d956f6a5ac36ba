//! Transformation configuration: where the result goes and which properties
//! every step sees.
//!
//! Saved and loaded as pretty JSON. CLI flags are layered on top of a loaded
//! file by the binary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Output handling and free-form properties for one transformation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Folder the transformed copy is written to (the application's parent when unset)
    pub output_folder: Option<PathBuf>,
    /// Archive the transformed copy as a zip file and remove the folder
    pub zip_output: bool,
    /// Passed to every step; the engine never interprets them
    pub properties: BTreeMap<String, String>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.output_folder = Some(folder.into());
        self
    }

    pub fn with_zip_output(mut self, zip: bool) -> Self {
        self.zip_output = zip;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// True when the plan runs in place, against the original folder
    pub fn modifies_original_folder(&self) -> bool {
        self.output_folder.is_none() && !self.zip_output
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self = serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(folder) = &self.output_folder {
            if !folder.exists() {
                anyhow::bail!("Output folder {:?} does not exist", folder);
            }
            if !folder.is_dir() {
                anyhow::bail!("Output folder {:?} is not a directory", folder);
            }
        }

        if let Some(key) = self.properties.keys().find(|k| k.trim().is_empty()) {
            anyhow::bail!("Property names cannot be blank (found {:?})", key);
        }

        Ok(())
    }
}

/// Parse a `KEY=VALUE` property argument
pub fn parse_property(arg: &str) -> Result<(String, String)> {
    let (key, value) = arg
        .split_once('=')
        .with_context(|| format!("Property {arg:?} is not in KEY=VALUE form"))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("Property {arg:?} has an empty key");
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifies_original_folder() {
        assert!(Configuration::new().modifies_original_folder());
        assert!(!Configuration::new().with_zip_output(true).modifies_original_folder());
        assert!(!Configuration::new().with_output_folder("/tmp").modifies_original_folder());
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = Configuration::new()
            .with_output_folder(dir.path())
            .with_property("env", "prod");
        config.save_to_file(&path).unwrap();
        assert_eq!(Configuration::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: Configuration = serde_json::from_str(r#"{"zip_output": true}"#).unwrap();
        assert!(config.zip_output);
        assert!(config.output_folder.is_none());
        assert!(config.properties.is_empty());
    }

    #[test]
    fn test_validate_output_folder() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Configuration::new().with_output_folder(dir.path()).validate().is_ok());
        let missing = Configuration::new().with_output_folder(dir.path().join("missing"));
        assert!(missing.validate().unwrap_err().to_string().contains("does not exist"));
    }

    #[test]
    fn test_parse_property() {
        assert_eq!(parse_property("a=b=c").unwrap(), ("a".to_string(), "b=c".to_string()));
        assert_eq!(parse_property("flag=").unwrap(), ("flag".to_string(), String::new()));
        assert!(parse_property("novalue").is_err());
        assert!(parse_property("=x").is_err());
    }
}
