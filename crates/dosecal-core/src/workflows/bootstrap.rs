use crate::core::tables::{DatasetType, Table, TableError};
use crate::engine::environment::DEFAULT_LOCATION;
use crate::storage::datasets::checksum;
use crate::storage::{DatasetRegistration, RegistryError, Store, StoreError};
use std::path::Path;
use thiserror::Error;
use tracing::{info, instrument, warn};

const SYSTEM_USER: &str = "system";

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Failed to read seed dataset: {0}")]
    Seed(#[from] TableError),
}

/// What a bootstrap run changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BootstrapReport {
    pub settings_added: usize,
    pub datasets_imported: Vec<(DatasetType, DatasetRegistration)>,
    pub formulas_created: Vec<i64>,
}

impl BootstrapReport {
    pub fn is_noop(&self) -> bool {
        self.settings_added == 0
            && self.datasets_imported.is_empty()
            && self.formulas_created.is_empty()
    }
}

/// Prepares a store for use.
///
/// Brings the schema up to date, inserts missing default settings, imports and activates
/// `<dataset_type>.csv` from `seed_dir` for every dataset type that has no versions yet, and
/// installs the default formula of each beam type that has no active formula. Running it
/// again on a prepared store changes nothing.
#[instrument(skip_all, name = "bootstrap_workflow")]
pub fn initialize(store: &Store, seed_dir: Option<&Path>) -> Result<BootstrapReport, BootstrapError> {
    store.migrate()?;
    let mut report = BootstrapReport {
        settings_added: store.settings().ensure_defaults()?,
        ..BootstrapReport::default()
    };

    if let Some(seed_dir) = seed_dir {
        report.datasets_imported = seed_datasets(store, seed_dir)?;
        if let Some(registration) = refresh_environment_seed(store, seed_dir)? {
            report
                .datasets_imported
                .push((DatasetType::EnvironmentalData, registration));
        }
    }

    report.formulas_created = store.formulas().seed_defaults()?;

    info!(
        settings = report.settings_added,
        datasets = report.datasets_imported.len(),
        formulas = report.formulas_created.len(),
        "Bootstrap complete."
    );
    Ok(report)
}

fn seed_datasets(
    store: &Store,
    seed_dir: &Path,
) -> Result<Vec<(DatasetType, DatasetRegistration)>, BootstrapError> {
    let datasets = store.datasets();
    let mut imported = Vec::new();
    for dataset_type in DatasetType::ALL {
        if !datasets.list(Some(dataset_type))?.is_empty() {
            continue;
        }
        let path = seed_dir.join(format!("{}.csv", dataset_type.as_str()));
        if !path.is_file() {
            continue;
        }
        let table = Table::from_path(&path)?;
        let registration =
            datasets.register(dataset_type, &table, SYSTEM_USER, Some("Seed dataset"), true)?;
        if !registration.is_valid() {
            warn!(
                dataset_type = %dataset_type,
                path = %path.display(),
                errors = ?registration.errors,
                "Seed dataset failed validation and was stored as invalid."
            );
        }
        imported.push((dataset_type, registration));
    }
    Ok(imported)
}

/// Re-imports the environmental seed when the active environmental dataset was installed by
/// the system and lacks the default location.
///
/// Datasets uploaded by users are never replaced.
fn refresh_environment_seed(
    store: &Store,
    seed_dir: &Path,
) -> Result<Option<DatasetRegistration>, BootstrapError> {
    let path = seed_dir.join(format!("{}.csv", DatasetType::EnvironmentalData.as_str()));
    if !path.is_file() {
        return Ok(None);
    }
    let datasets = store.datasets();
    let Some((record, table)) = datasets.get_active(DatasetType::EnvironmentalData)? else {
        return Ok(None);
    };
    let wanted = DEFAULT_LOCATION.to_lowercase();
    let has_default = table
        .records()
        .filter_map(|record| record.text("location"))
        .any(|location| location.to_lowercase() == wanted);
    if has_default || record.uploaded_by != SYSTEM_USER {
        return Ok(None);
    }

    let seed = Table::from_path(&path)?;
    // A seed that itself lacks the default location would otherwise be re-imported forever.
    if checksum(&seed.to_csv_bytes()?) == record.checksum {
        return Ok(None);
    }
    let registration = datasets.register(
        DatasetType::EnvironmentalData,
        &seed,
        SYSTEM_USER,
        Some("Seed dataset refresh"),
        true,
    )?;
    info!(version = registration.version, "Refreshed environmental seed dataset.");
    Ok(Some(registration))
}
