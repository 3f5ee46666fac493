use super::datasets::DatasetRegistry;
use super::error::StoreError;
use super::formulas::FormulaRegistry;
use super::runs::RunLog;
use super::settings::SettingsStore;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const SCHEMA_VERSION: i64 = 1;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS dataset_payloads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    checksum TEXT NOT NULL UNIQUE,
    content BLOB NOT NULL,
    size_bytes INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS datasets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    dataset_type TEXT NOT NULL,
    version INTEGER NOT NULL,
    status TEXT NOT NULL CHECK(status IN ('active', 'inactive', 'invalid')),
    validation_status TEXT NOT NULL CHECK(validation_status IN ('passed', 'failed')),
    validation_errors_json TEXT NOT NULL DEFAULT '[]',
    payload_id INTEGER NOT NULL REFERENCES dataset_payloads(id),
    checksum TEXT NOT NULL,
    notes TEXT,
    uploaded_by TEXT NOT NULL,
    uploaded_at TEXT NOT NULL,
    UNIQUE(dataset_type, version)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_datasets_single_active
    ON datasets(dataset_type) WHERE status = 'active';

CREATE TABLE IF NOT EXISTS formulas (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    beam_type TEXT NOT NULL CHECK(beam_type IN ('photon', 'electron')),
    expression TEXT NOT NULL,
    variables_json TEXT NOT NULL,
    units_json TEXT NOT NULL DEFAULT '{}',
    status TEXT NOT NULL CHECK(status IN ('active', 'inactive', 'invalid')),
    validation_errors_json TEXT NOT NULL DEFAULT '[]',
    version INTEGER NOT NULL,
    notes TEXT,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(name, beam_type, version)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_formulas_single_active
    ON formulas(beam_type) WHERE status = 'active';

CREATE TABLE IF NOT EXISTS calculation_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_ts TEXT NOT NULL,
    user_id INTEGER,
    username TEXT NOT NULL,
    beam_type TEXT NOT NULL,
    inputs_json TEXT NOT NULL,
    outputs_json TEXT NOT NULL,
    formula_name TEXT NOT NULL,
    formula_version INTEGER NOT NULL,
    dataset_versions_json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS app_settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// Lifecycle state shared by dataset and formula versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Active,
    Inactive,
    Invalid,
}

impl RecordStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Invalid => "invalid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Passed,
    Failed,
}

impl ValidationStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown {kind} '{value}'")]
pub struct UnknownValue {
    kind: &'static str,
    value: String,
}

impl FromStr for RecordStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "invalid" => Ok(Self::Invalid),
            _ => Err(UnknownValue {
                kind: "record status",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for ValidationStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "passed" => Ok(Self::Passed),
            "failed" => Ok(Self::Failed),
            _ => Err(UnknownValue {
                kind: "validation status",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The relational store backing every registry.
///
/// A single SQLite connection guarded by a mutex. Registries borrow the store and run each
/// mutating operation inside one immediate transaction, so invariants such as "one active row
/// per type" are never observable in an intermediate state.
pub struct Store {
    connection: Mutex<Connection>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Opens (creating if needed) a file-backed store and brings its schema up to date.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                path: parent.to_string_lossy().to_string(),
                source: e,
            })?;
        }
        let connection = Connection::open(path)?;
        let journal_mode: String =
            connection.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        connection.pragma_update(None, "synchronous", "NORMAL")?;
        debug!(journal_mode = %journal_mode, "Applied connection pragmas.");
        debug!(path = %path.display(), "Opened database.");
        Self::from_connection(connection)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> Result<Self, StoreError> {
        connection.pragma_update(None, "foreign_keys", true)?;
        connection.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self {
            connection: Mutex::new(connection),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Creates missing tables and records the schema version. Safe to call repeatedly.
    pub fn migrate(&self) -> Result<(), StoreError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction()?;
        tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
        let version: Option<i64> = tx
            .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| {
                row.get(0)
            })
            .optional()?;
        match version {
            None => {
                tx.execute_batch(SCHEMA)?;
                tx.execute(
                    "INSERT INTO store_meta (version) VALUES (?1)",
                    params![SCHEMA_VERSION],
                )?;
                debug!(version = SCHEMA_VERSION, "Initialised database schema.");
            }
            Some(found) if found == SCHEMA_VERSION => {}
            Some(found) => {
                return Err(StoreError::SchemaVersion {
                    found,
                    expected: SCHEMA_VERSION,
                });
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.connection.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn datasets(&self) -> DatasetRegistry<'_> {
        DatasetRegistry::new(self)
    }

    pub fn formulas(&self) -> FormulaRegistry<'_> {
        FormulaRegistry::new(self)
    }

    pub fn runs(&self) -> RunLog<'_> {
        RunLog::new(self)
    }

    pub fn settings(&self) -> SettingsStore<'_> {
        SettingsStore::new(self)
    }
}

pub(crate) fn to_json<T: Serialize + ?Sized>(
    value: &T,
    context: &'static str,
) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Json { context, source })
}

/// Reads a TEXT column holding JSON.
pub(crate) fn json_column<T: DeserializeOwned>(row: &Row<'_>, column: &str) -> rusqlite::Result<T> {
    let raw: String = row.get(column)?;
    serde_json::from_str(&raw).map_err(|e| conversion_failure(row, column, e))
}

/// Reads a TEXT column and parses it with `FromStr`.
pub(crate) fn parsed_column<T>(row: &Row<'_>, column: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(column)?;
    raw.parse().map_err(|e| conversion_failure(row, column, e))
}

fn conversion_failure<E>(row: &Row<'_>, column: &str, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    let index = row.as_ref().column_index(column).unwrap_or_default();
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}
