//! Run configuration loaded from `config.json`.
//!
//! The file mirrors the sections operators already maintain; only the subset
//! the consolidation core needs is lifted into [`PipelineConfig`].

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{Result, ToolError};

/// Ordered CIDR range → department mapping. File order is kept because equal
/// prefix lengths resolve to the earliest entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct DepartmentMapping {
    entries: Vec<(String, String)>,
}

impl DepartmentMapping {
    /// Builds a mapping from `(range, department)` pairs, keeping their order.
    pub fn new<I, R, D>(entries: I) -> Self
    where
        I: IntoIterator<Item = (R, D)>,
        R: Into<String>,
        D: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(range, dept)| (range.into(), dept.into()))
                .collect(),
        }
    }

    /// Iterates `(range, department)` pairs in configured order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(range, dept)| (range.as_str(), dept.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TryFrom<Map<String, Value>> for DepartmentMapping {
    type Error = String;

    fn try_from(map: Map<String, Value>) -> std::result::Result<Self, Self::Error> {
        let mut entries = Vec::with_capacity(map.len());
        for (range, dept) in map {
            match dept {
                Value::String(dept) => entries.push((range, dept)),
                other => {
                    return Err(format!(
                        "department for range '{range}' must be a string, found {other}"
                    ));
                }
            }
        }
        Ok(Self { entries })
    }
}

/// Immutable settings handed to the consolidator.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub department_mapping: DepartmentMapping,
    pub department_heads: HashMap<String, String>,
    pub default_email_domain: Option<String>,
}

/// Scan-wide settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub default_email_domain: Option<String>,
}

/// Inventory API credentials.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InventoryApiConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

impl InventoryApiConfig {
    /// Returns `(url, key, secret)` when every value is present and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str, &str)> {
        Some((
            present(&self.api_url)?,
            present(&self.api_key)?,
            present(&self.api_secret)?,
        ))
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Directory-service export settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Program and arguments of the export helper, run with the base
    /// directory as working directory.
    pub helper_command: Vec<String>,
}

/// Task selection defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScriptSettings {
    pub default_tasks_to_run: Option<Vec<String>>,
}

/// Full contents of `config.json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub department_mapping: DepartmentMapping,
    pub department_heads: HashMap<String, String>,
    pub scan_settings: ScanSettings,
    pub axonius_api: InventoryApiConfig,
    pub ad_config: DirectoryConfig,
    pub script_settings: ScriptSettings,
}

impl AppConfig {
    /// Reads and parses the configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolError::MissingConfig(path.to_path_buf()));
        }
        let source = fs::read_to_string(path)?;
        let config = Self::from_json(&source)?;
        info!(
            path = %path.display(),
            mappings = config.department_mapping.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Parses configuration from a JSON string.
    pub fn from_json(source: &str) -> Result<Self> {
        serde_json::from_str(source).map_err(|err| ToolError::InvalidConfig(err.to_string()))
    }

    /// Extracts the settings the consolidation pipeline needs.
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            department_mapping: self.department_mapping.clone(),
            department_heads: self.department_heads.clone(),
            default_email_domain: self
                .scan_settings
                .default_email_domain
                .as_deref()
                .map(str::trim)
                .filter(|domain| !domain.is_empty())
                .map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_keeps_file_order() {
        let config = AppConfig::from_json(
            r#"{
                "department_mapping": {
                    "10.1.0.0/16": "B",
                    "10.0.0.0/8": "A",
                    "0.0.0.0/0": "Unassigned"
                }
            }"#,
        )
        .expect("config parsed");
        let ranges: Vec<&str> = config.department_mapping.iter().map(|(r, _)| r).collect();
        assert_eq!(ranges, vec!["10.1.0.0/16", "10.0.0.0/8", "0.0.0.0/0"]);
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let config = AppConfig::from_json("{}").expect("config parsed");
        let pipeline = config.pipeline();
        assert!(pipeline.department_mapping.is_empty());
        assert!(pipeline.department_heads.is_empty());
        assert_eq!(pipeline.default_email_domain, None);
        assert!(config.axonius_api.credentials().is_none());
    }

    #[test]
    fn blank_domain_is_treated_as_unset() {
        let config = AppConfig::from_json(r#"{"scan_settings": {"default_email_domain": "  "}}"#)
            .expect("config parsed");
        assert_eq!(config.pipeline().default_email_domain, None);
    }

    #[test]
    fn non_string_department_is_rejected() {
        let result = AppConfig::from_json(r#"{"department_mapping": {"10.0.0.0/8": 5}}"#);
        assert!(matches!(result, Err(ToolError::InvalidConfig(_))));
    }

    #[test]
    fn credentials_require_all_parts() {
        let api = InventoryApiConfig {
            api_url: Some("https://inv.example".to_string()),
            api_key: Some("key".to_string()),
            api_secret: Some(String::new()),
        };
        assert!(api.credentials().is_none());
    }
}
