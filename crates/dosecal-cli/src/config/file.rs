use crate::error::{CliError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileStoreConfig {
    pub database: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileReferenceConfig {
    #[serde(rename = "temperature-c")]
    pub temperature_c: Option<f64>,
    #[serde(rename = "pressure-kpa")]
    pub pressure_kpa: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileDefaultsConfig {
    #[serde(rename = "reading-unit")]
    pub reading_unit: Option<String>,
    pub geometry: Option<String>,
    pub username: Option<String>,
}

/// Contents of `dosecal.toml`. Every section and key is optional.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub store: Option<FileStoreConfig>,
    pub reference: Option<FileReferenceConfig>,
    pub defaults: Option<FileDefaultsConfig>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading application configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }
}
