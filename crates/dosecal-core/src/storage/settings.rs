use super::error::StoreError;
use super::store::Store;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

pub const ENV_SOURCE: &str = "env_source";
pub const ENV_MANUAL_TEMPERATURE_C: &str = "env_manual_temperature_c";
pub const ENV_MANUAL_PRESSURE_KPA: &str = "env_manual_pressure_kpa";
pub const ENV_DATASET_LOCATION: &str = "env_dataset_location";

const DEFAULT_MANUAL_TEMPERATURE_C: f64 = 22.0;
const DEFAULT_MANUAL_PRESSURE_KPA: f64 = 85.9;

/// Where ambient temperature and pressure come from when a calculation does not supply them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentSource {
    Manual,
    Dataset,
    #[default]
    Auto,
}

impl EnvironmentSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Dataset => "dataset",
            Self::Auto => "auto",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[error("Unknown environment source '{0}'. Expected 'manual', 'dataset' or 'auto'")]
pub struct UnknownEnvironmentSource(pub String);

impl FromStr for EnvironmentSource {
    type Err = UnknownEnvironmentSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "manual" => Ok(Self::Manual),
            "dataset" => Ok(Self::Dataset),
            // Older installations stored a descriptive label such as "Auto (IP + Weather API)".
            other if other.starts_with("auto") => Ok(Self::Auto),
            _ => Err(UnknownEnvironmentSource(s.to_string())),
        }
    }
}

impl fmt::Display for EnvironmentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSettings {
    pub source: EnvironmentSource,
    pub manual_temperature_c: f64,
    pub manual_pressure_kpa: f64,
    pub dataset_location: String,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            source: EnvironmentSource::default(),
            manual_temperature_c: DEFAULT_MANUAL_TEMPERATURE_C,
            manual_pressure_kpa: DEFAULT_MANUAL_PRESSURE_KPA,
            dataset_location: String::new(),
        }
    }
}

impl EnvironmentSettings {
    fn to_pairs(&self) -> [(&'static str, String); 4] {
        [
            (ENV_SOURCE, self.source.as_str().to_string()),
            (ENV_MANUAL_TEMPERATURE_C, self.manual_temperature_c.to_string()),
            (ENV_MANUAL_PRESSURE_KPA, self.manual_pressure_kpa.to_string()),
            (ENV_DATASET_LOCATION, self.dataset_location.clone()),
        ]
    }
}

/// Free-form key/value application settings.
#[derive(Debug, Clone, Copy)]
pub struct SettingsStore<'a> {
    store: &'a Store,
}

impl<'a> SettingsStore<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let connection = self.store.lock()?;
        Ok(connection
            .query_row(
                "SELECT value FROM app_settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let connection = self.store.lock()?;
        upsert(&connection, key, value)
    }

    pub fn list(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let connection = self.store.lock()?;
        let mut stmt = connection.prepare("SELECT key, value FROM app_settings")?;
        let settings = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<BTreeMap<String, String>, _>>()?;
        Ok(settings)
    }

    /// Inserts the default value of every environment setting that is not yet present.
    ///
    /// Returns how many settings were added.
    pub fn ensure_defaults(&self) -> Result<usize, StoreError> {
        let mut connection = self.store.lock()?;
        let tx = connection.transaction()?;
        let now = Utc::now();
        let mut inserted = 0;
        for (key, value) in EnvironmentSettings::default().to_pairs() {
            inserted += tx.execute(
                "INSERT OR IGNORE INTO app_settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
                params![key, value, now],
            )?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Environment settings with defaults substituted for missing or unreadable values.
    pub fn environment_settings(&self) -> Result<EnvironmentSettings, StoreError> {
        let defaults = EnvironmentSettings::default();
        let stored = self.list()?;

        let source = match stored.get(ENV_SOURCE) {
            Some(raw) => raw.parse().unwrap_or_else(|err| {
                warn!("{}; falling back to '{}'.", err, defaults.source);
                defaults.source
            }),
            None => defaults.source,
        };

        Ok(EnvironmentSettings {
            source,
            manual_temperature_c: number_setting(
                &stored,
                ENV_MANUAL_TEMPERATURE_C,
                defaults.manual_temperature_c,
            ),
            manual_pressure_kpa: number_setting(
                &stored,
                ENV_MANUAL_PRESSURE_KPA,
                defaults.manual_pressure_kpa,
            ),
            dataset_location: stored
                .get(ENV_DATASET_LOCATION)
                .map(|v| v.trim().to_string())
                .unwrap_or(defaults.dataset_location),
        })
    }

    pub fn save_environment_settings(&self, settings: &EnvironmentSettings) -> Result<(), StoreError> {
        let mut connection = self.store.lock()?;
        let tx = connection.transaction()?;
        for (key, value) in settings.to_pairs() {
            upsert(&tx, key, &value)?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn upsert(connection: &Connection, key: &str, value: &str) -> Result<(), StoreError> {
    connection.execute(
        "INSERT INTO app_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, Utc::now()],
    )?;
    Ok(())
}

fn number_setting(stored: &BTreeMap<String, String>, key: &str, fallback: f64) -> f64 {
    match stored.get(key).map(|raw| raw.trim().parse::<f64>()) {
        Some(Ok(value)) if value.is_finite() => value,
        Some(_) => {
            warn!(key, fallback, "Setting is not a number; using default.");
            fallback
        }
        None => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_overwrites_existing_value() {
        let store = Store::open_in_memory().unwrap();
        let settings = store.settings();
        settings.set("theme", "dark").unwrap();
        settings.set("theme", "light").unwrap();
        assert_eq!(settings.get("theme").unwrap().as_deref(), Some("light"));
        assert_eq!(settings.get("missing").unwrap(), None);
    }

    #[test]
    fn ensure_defaults_does_not_overwrite_existing_values() {
        let store = Store::open_in_memory().unwrap();
        let settings = store.settings();
        settings.set(ENV_SOURCE, "manual").unwrap();

        assert_eq!(settings.ensure_defaults().unwrap(), 3);
        assert_eq!(settings.ensure_defaults().unwrap(), 0);

        let all = settings.list().unwrap();
        assert_eq!(all[ENV_SOURCE], "manual");
        assert_eq!(all[ENV_MANUAL_PRESSURE_KPA], "85.9");
        assert_eq!(all[ENV_DATASET_LOCATION], "");
    }

    #[test]
    fn environment_settings_default_when_store_is_empty() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(
            store.settings().environment_settings().unwrap(),
            EnvironmentSettings::default()
        );
    }

    #[test]
    fn environment_settings_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let settings = store.settings();
        let saved = EnvironmentSettings {
            source: EnvironmentSource::Dataset,
            manual_temperature_c: 20.6,
            manual_pressure_kpa: 98.18,
            dataset_location: "Harare, Zimbabwe".to_string(),
        };
        settings.save_environment_settings(&saved).unwrap();
        assert_eq!(settings.environment_settings().unwrap(), saved);
    }

    #[test]
    fn unreadable_environment_values_fall_back_to_defaults() {
        let store = Store::open_in_memory().unwrap();
        let settings = store.settings();
        settings.set(ENV_SOURCE, "satellite").unwrap();
        settings.set(ENV_MANUAL_TEMPERATURE_C, "warm").unwrap();

        let resolved = settings.environment_settings().unwrap();
        assert_eq!(resolved.source, EnvironmentSource::Auto);
        assert_eq!(resolved.manual_temperature_c, 22.0);
    }

    #[test]
    fn environment_source_accepts_legacy_labels() {
        assert_eq!(
            "Auto (IP + Weather API)".parse::<EnvironmentSource>().unwrap(),
            EnvironmentSource::Auto
        );
        assert_eq!(
            "Manual".parse::<EnvironmentSource>().unwrap(),
            EnvironmentSource::Manual
        );
    }
}
