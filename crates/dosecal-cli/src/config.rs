mod defaults;
mod file;
mod measurement;

pub use defaults::DefaultsConfig;
pub use file::FileConfig;
pub use measurement::PartialMeasurement;

use crate::error::{CliError, Result};
use directories::ProjectDirs;
use dosecal::core::units::{ChargeUnit, GeometryMode};
use std::path::{Path, PathBuf};
use tracing::debug;

const CONFIG_FILE_NAME: &str = "dosecal.toml";

/// Application settings after merging CLI flags, the configuration file and defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database: PathBuf,
    pub username: String,
    pub reading_unit: ChargeUnit,
    pub geometry: GeometryMode,
    pub reference_temperature_c: f64,
    pub reference_pressure_kpa: f64,
    pub history_limit: usize,
}

impl AppConfig {
    /// Resolves the configuration.
    ///
    /// An explicit `config_path` must exist. Without one, `dosecal.toml` in the user's
    /// configuration directory is read when present. A relative `[store] database` path is taken
    /// relative to the file that declares it.
    pub fn load(config_path: Option<&Path>, database: Option<&Path>) -> Result<Self> {
        let defaults = DefaultsConfig::default();

        let (file_config, base_dir) = match config_path {
            Some(path) => (FileConfig::from_file(path)?, path.parent().map(Path::to_path_buf)),
            None => match Self::user_config_file() {
                Some(path) if path.is_file() => {
                    (FileConfig::from_file(&path)?, path.parent().map(Path::to_path_buf))
                }
                _ => (FileConfig::default(), None),
            },
        };

        let store = file_config.store.unwrap_or_default();
        let reference = file_config.reference.unwrap_or_default();
        let file_defaults = file_config.defaults.unwrap_or_default();

        let database = match (database, store.database) {
            (Some(path), _) => path.to_path_buf(),
            (None, Some(path)) if path.is_relative() => match &base_dir {
                Some(dir) => dir.join(path),
                None => path,
            },
            (None, Some(path)) => path,
            (None, None) => Self::default_database_path(&defaults)?,
        };

        let reading_unit = match file_defaults.reading_unit {
            Some(unit) => unit
                .parse()
                .map_err(|e| CliError::Config(format!("[defaults] reading-unit: {}", e)))?,
            None => defaults.reading_unit,
        };
        let geometry = match file_defaults.geometry {
            Some(geometry) => geometry
                .parse()
                .map_err(|e| CliError::Config(format!("[defaults] geometry: {}", e)))?,
            None => defaults.geometry,
        };

        let config = Self {
            database,
            username: file_defaults
                .username
                .filter(|name| !name.trim().is_empty())
                .unwrap_or(defaults.username),
            reading_unit,
            geometry,
            reference_temperature_c: reference
                .temperature_c
                .unwrap_or(defaults.reference_temperature_c),
            reference_pressure_kpa: reference
                .pressure_kpa
                .unwrap_or(defaults.reference_pressure_kpa),
            history_limit: defaults.history_limit,
        };
        if !(config.reference_pressure_kpa > 0.0 && config.reference_pressure_kpa.is_finite()) {
            return Err(CliError::Config(
                "[reference] pressure-kpa must be a positive number.".to_string(),
            ));
        }
        debug!("Resolved application configuration: {:?}", &config);
        Ok(config)
    }

    /// Name recorded on uploads and runs: the CLI flag, else the configured username.
    pub fn user_or_default(&self, user: Option<String>) -> String {
        user.filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.username.clone())
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("edu", "caltech", "dosecal")
    }

    fn user_config_file() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    fn default_database_path(defaults: &DefaultsConfig) -> Result<PathBuf> {
        Self::project_dirs()
            .map(|dirs| dirs.data_dir().join(defaults.database_file_name))
            .ok_or_else(|| {
                CliError::Data("Could not determine default data directory path.".to_string())
            })
    }
}

#[cfg(test)]
impl AppConfig {
    /// Default settings with the given database, for command tests.
    pub fn with_database(database: PathBuf) -> Self {
        let defaults = DefaultsConfig::default();
        Self {
            database,
            username: defaults.username,
            reading_unit: defaults.reading_unit,
            geometry: defaults.geometry,
            reference_temperature_c: defaults.reference_temperature_c,
            reference_pressure_kpa: defaults.reference_pressure_kpa,
            history_limit: defaults.history_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    static TEST_DIR: Lazy<TempDir> = Lazy::new(|| tempdir().expect("Failed to create temp dir"));

    fn write_config_file(name: &str, content: &str) -> PathBuf {
        let file_path = TEST_DIR.path().join(name);
        fs::write(&file_path, content).unwrap();
        file_path
    }

    #[test]
    fn file_values_override_defaults() {
        let path = write_config_file(
            "full.toml",
            r#"
            [store]
            database = "clinic.db"

            [reference]
            temperature-c = 22.0
            pressure-kpa = 101.33

            [defaults]
            reading-unit = "pC"
            geometry = "SAD"
            username = "physicist"
            "#,
        );

        let config = AppConfig::load(Some(&path), None).unwrap();
        assert_eq!(config.database, TEST_DIR.path().join("clinic.db"));
        assert_eq!(config.reference_temperature_c, 22.0);
        assert_eq!(config.reference_pressure_kpa, 101.33);
        assert_eq!(config.reading_unit, ChargeUnit::Picocoulomb);
        assert_eq!(config.geometry, GeometryMode::Sad);
        assert_eq!(config.username, "physicist");
    }

    #[test]
    fn database_flag_overrides_file() {
        let path = write_config_file("store.toml", "[store]\ndatabase = \"/srv/dosecal.db\"\n");
        let config = AppConfig::load(Some(&path), Some(Path::new("/tmp/other.db"))).unwrap();
        assert_eq!(config.database, PathBuf::from("/tmp/other.db"));
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let path = write_config_file("empty.toml", "");
        let config = AppConfig::load(Some(&path), Some(Path::new("db.sqlite"))).unwrap();
        let defaults = DefaultsConfig::default();
        assert_eq!(config.username, defaults.username);
        assert_eq!(config.reading_unit, ChargeUnit::Nanocoulomb);
        assert_eq!(config.reference_temperature_c, 20.0);
        assert_eq!(config.reference_pressure_kpa, 101.325);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let path = write_config_file("unknown.toml", "[store]\nurl = \"sqlite://x\"\n");
        assert!(matches!(
            AppConfig::load(Some(&path), None),
            Err(CliError::FileParsing { .. })
        ));
    }

    #[test]
    fn invalid_default_unit_is_a_config_error() {
        let path = write_config_file("unit.toml", "[defaults]\nreading-unit = \"mC\"\n");
        assert!(matches!(
            AppConfig::load(Some(&path), Some(Path::new("db.sqlite"))),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn explicit_user_wins_over_configured_username() {
        let path = write_config_file("user.toml", "[defaults]\nusername = \"qa\"\n");
        let config = AppConfig::load(Some(&path), Some(Path::new("db.sqlite"))).unwrap();
        assert_eq!(config.user_or_default(Some("alice".to_string())), "alice");
        assert_eq!(config.user_or_default(Some("  ".to_string())), "qa");
        assert_eq!(config.user_or_default(None), "qa");
    }
}
