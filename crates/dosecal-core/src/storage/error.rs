use crate::core::tables::TableError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to prepare database location '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Unsupported database schema version {found} (expected {expected})")]
    SchemaVersion { found: i64, expected: i64 },

    #[error("Database connection lock was poisoned")]
    Poisoned,

    #[error("Failed to encode {context} as JSON: {source}")]
    Json {
        context: &'static str,
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Dataset {0} not found")]
    DatasetNotFound(i64),

    #[error("Dataset {0} did not pass validation and cannot be activated")]
    DatasetNotValidated(i64),

    #[error("Formula {0} not found")]
    FormulaNotFound(i64),

    #[error("Formula {0} is invalid and cannot be activated")]
    FormulaInvalid(i64),

    #[error("Stored payload for dataset {id} could not be read: {source}")]
    Payload { id: i64, source: TableError },

    #[error("Dataset payload could not be encoded: {0}")]
    Encode(#[source] TableError),
}

impl From<rusqlite::Error> for RegistryError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(StoreError::Sqlite(err))
    }
}
