//! Catalog document: the on-disk shape of frames and scaffolds (TOML or JSON).

use crate::catalog::model::{Frame, Scaffold};
use crate::error::CatalogError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// On-disk catalog format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFormat {
    Toml,
    Json,
}

impl CatalogFormat {
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(CatalogFormat::Toml),
            Some("json") => Ok(CatalogFormat::Json),
            other => Err(CatalogError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

/// Scaffold as written in a catalog file. Stage keys are strings ("1".."8")
/// because TOML table keys cannot be integers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaffoldRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub stages: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub success_criteria: BTreeMap<String, Value>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl ScaffoldRecord {
    pub fn into_scaffold(self) -> Result<Scaffold, CatalogError> {
        let mut stages = BTreeMap::new();
        for (key, frames) in self.stages {
            let stage = key
                .trim()
                .parse::<u8>()
                .map_err(|_| CatalogError::InvalidStage {
                    scaffold: self.id.clone(),
                    stage: 0,
                })?;
            stages.insert(stage, frames);
        }
        Ok(Scaffold {
            id: self.id,
            name: self.name,
            description: self.description,
            stages,
            dependencies: self.dependencies,
            success_criteria: self.success_criteria,
            version: self.version,
        })
    }

    pub fn from_scaffold(scaffold: &Scaffold) -> Self {
        Self {
            id: scaffold.id.clone(),
            name: scaffold.name.clone(),
            description: scaffold.description.clone(),
            stages: scaffold
                .stages
                .iter()
                .map(|(stage, frames)| (stage.to_string(), frames.clone()))
                .collect(),
            dependencies: scaffold.dependencies.clone(),
            success_criteria: scaffold.success_criteria.clone(),
            version: scaffold.version.clone(),
        }
    }
}

/// Complete catalog document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub frames: Vec<Frame>,
    #[serde(default)]
    pub scaffolds: Vec<ScaffoldRecord>,
}

impl CatalogDocument {
    pub fn parse(raw: &str, format: CatalogFormat) -> Result<Self, CatalogError> {
        match format {
            CatalogFormat::Toml => {
                toml::from_str(raw).map_err(|e| CatalogError::Parse(e.to_string()))
            }
            CatalogFormat::Json => {
                serde_json::from_str(raw).map_err(|e| CatalogError::Parse(e.to_string()))
            }
        }
    }

    pub fn render(&self, format: CatalogFormat) -> Result<String, CatalogError> {
        match format {
            CatalogFormat::Toml => {
                toml::to_string_pretty(self).map_err(|e| CatalogError::Parse(e.to_string()))
            }
            CatalogFormat::Json => {
                serde_json::to_string_pretty(self).map_err(|e| CatalogError::Parse(e.to_string()))
            }
        }
    }

    pub fn read(path: &Path) -> Result<Self, CatalogError> {
        let format = CatalogFormat::from_path(path)?;
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw, format)
    }

    /// Write via a temporary sibling file and rename.
    pub fn write(&self, path: &Path) -> Result<(), CatalogError> {
        let format = CatalogFormat::from_path(path)?;
        let rendered = self.render(format)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, rendered)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
