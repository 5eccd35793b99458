//! Template registry: per-template default sheet and field-name mappings

use crate::cell_ref::CellRef;
use crate::error::PatchError;
use crate::value::{CellUpdate, CellValue};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Known templates keyed by file name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateRegistry {
    #[serde(default)]
    pub templates: BTreeMap<String, TemplateConfig>,
}

impl TemplateRegistry {
    /// Load a registry from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read template registry {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse a registry from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let registry: TemplateRegistry = toml::from_str(content)?;
        Ok(registry)
    }

    pub fn get(&self, template_name: &str) -> Option<&TemplateConfig> {
        self.templates.get(template_name)
    }

    /// Check that every configured field points at a valid cell
    pub fn validate(&self) -> Result<()> {
        for (template, config) in &self.templates {
            config
                .validate()
                .with_context(|| format!("Configuration error in template '{}'", template))?;
        }
        Ok(())
    }
}

/// Mapping for one template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Sheet to patch when a request names none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
    /// Logical field name -> cell coordinate
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl TemplateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sheet_name.as_deref().is_some_and(|s| s.is_empty()) {
            anyhow::bail!("sheet_name must not be empty");
        }
        for (field, coordinate) in &self.fields {
            if CellRef::parse(coordinate).is_err() {
                anyhow::bail!(
                    "field '{}' maps to invalid cell reference '{}'",
                    field,
                    coordinate
                );
            }
        }
        Ok(())
    }

    /// Sheet to use: the requested one, else the configured default
    pub fn sheet_for<'a>(&'a self, requested: Option<&'a str>) -> Option<&'a str> {
        requested.or(self.sheet_name.as_deref())
    }

    /// Turn request data into cell updates.
    ///
    /// Keys naming a configured field map to that field's coordinate; every
    /// other key is taken as a coordinate already. Coordinates are not
    /// checked here, the patcher rejects bad ones.
    pub fn resolve_updates<I, K>(&self, data: I) -> crate::Result<Vec<CellUpdate>>
    where
        I: IntoIterator<Item = (K, CellValue)>,
        K: AsRef<str>,
    {
        let updates: Vec<CellUpdate> = data
            .into_iter()
            .map(|(key, value)| {
                let key = key.as_ref();
                let coordinate = self.fields.get(key).map(String::as_str).unwrap_or(key);
                CellUpdate::new(coordinate, value)
            })
            .collect();

        if updates.is_empty() {
            return Err(PatchError::NoUpdates);
        }
        Ok(updates)
    }
}
