use crate::cli::{DatasetArgs, DatasetCommands};
use crate::config::AppConfig;
use crate::error::{CliError, Result};
use dosecal::core::tables::{DatasetType, Table};
use dosecal::storage::{DatasetRecord, Store};
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

pub fn run(args: DatasetArgs, config: &AppConfig) -> Result<()> {
    let store = Store::open(&config.database)?;
    match args.command {
        DatasetCommands::List { dataset_type } => {
            let dataset_type = dataset_type.as_deref().map(parse_dataset_type).transpose()?;
            handle_list(&store, dataset_type)
        }
        DatasetCommands::Import {
            dataset_type,
            file,
            notes,
            activate,
            user,
        } => {
            let user = config.user_or_default(user);
            handle_import(
                &store,
                parse_dataset_type(&dataset_type)?,
                &file,
                notes.as_deref(),
                activate,
                &user,
            )
        }
        DatasetCommands::Activate { id } => handle_activate(&store, id),
        DatasetCommands::Show { dataset_type } => {
            handle_show(&store, parse_dataset_type(&dataset_type)?)
        }
    }
}

fn parse_dataset_type(value: &str) -> Result<DatasetType> {
    value.parse().map_err(|e| {
        CliError::Argument(format!(
            "{}. Expected one of: {}",
            e,
            DatasetType::ALL.map(DatasetType::as_str).join(", ")
        ))
    })
}

fn format_record(record: &DatasetRecord) -> String {
    format!(
        "{:>5}  {:<20} v{:<4} {:<9} {:<7} {:<12} {}{}",
        record.id,
        record.dataset_type.as_str(),
        record.version,
        record.status.as_str(),
        record.validation_status.as_str(),
        record.uploaded_by,
        record.uploaded_at.format("%Y-%m-%d %H:%M"),
        record
            .notes
            .as_deref()
            .map(|notes| format!("  {}", notes))
            .unwrap_or_default()
    )
}

fn handle_list(store: &Store, dataset_type: Option<DatasetType>) -> Result<()> {
    let records = store.datasets().list(dataset_type)?;
    if records.is_empty() {
        println!("No datasets stored.");
        return Ok(());
    }
    println!(
        "{:>5}  {:<20} {:<5} {:<9} {:<7} {:<12} {}",
        "ID", "TYPE", "VER", "STATUS", "CHECK", "UPLOADER", "UPLOADED"
    );
    for record in &records {
        println!("{}", format_record(record));
    }
    Ok(())
}

fn handle_import(
    store: &Store,
    dataset_type: DatasetType,
    file: &Path,
    notes: Option<&str>,
    activate: bool,
    user: &str,
) -> Result<()> {
    info!("Reading {} dataset from {:?}", dataset_type, file);
    let table = Table::from_path(file).map_err(|e| CliError::table_file(file, e))?;
    let registration = store
        .datasets()
        .register(dataset_type, &table, user, notes, activate)?;

    if !registration.is_valid() {
        println!(
            "✗ {} v{} (id {}) failed validation:",
            dataset_type, registration.version, registration.id
        );
        for error in &registration.errors {
            println!("    - {}", error);
        }
        return Err(CliError::Data(format!(
            "Dataset was stored as invalid version {} and cannot be activated.",
            registration.version
        )));
    }

    let state = if activate { "active" } else { "inactive" };
    println!(
        "✓ Imported {} v{} (id {}, {} rows, {}).",
        dataset_type,
        registration.version,
        registration.id,
        table.len(),
        state
    );
    Ok(())
}

fn handle_activate(store: &Store, id: i64) -> Result<()> {
    let record = store.datasets().activate(id)?;
    println!(
        "✓ {} v{} (id {}) is now active.",
        record.dataset_type, record.version, record.id
    );
    Ok(())
}

fn handle_show(store: &Store, dataset_type: DatasetType) -> Result<()> {
    let Some((record, table)) = store.datasets().get_active(dataset_type)? else {
        warn!("No active {} dataset.", dataset_type);
        return Err(CliError::Data(format!(
            "No active {} dataset. Import one with 'dosecal dataset import --activate'.",
            dataset_type
        )));
    };
    info!(
        "Showing {} v{} (checksum {})",
        dataset_type, record.version, record.checksum
    );
    let bytes = table
        .to_csv_bytes()
        .map_err(|e| CliError::Other(e.into()))?;
    std::io::stdout().write_all(&bytes)?;
    Ok(())
}
