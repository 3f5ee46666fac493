use dosecal::core::tables::TableError;
use dosecal::engine::{CalculationError, ConfigError};
use dosecal::storage::{RegistryError, StoreError};
use dosecal::workflows::bootstrap::BootstrapError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Calculation(#[from] CalculationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error("Invalid calculation inputs: {0}")]
    Inputs(#[from] ConfigError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Data management error: {0}")]
    Data(String),

    #[error("Failed to parse file '{path}': {source}", path = path.display())]
    FileParsing {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn table_file(path: impl Into<PathBuf>, source: TableError) -> Self {
        Self::FileParsing {
            path: path.into(),
            source: source.into(),
        }
    }
}
