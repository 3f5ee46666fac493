use crate::cli::InitArgs;
use crate::config::AppConfig;
use crate::error::{CliError, Result};
use crate::utils::progress::Spinner;
use dosecal::storage::Store;
use dosecal::workflows::bootstrap;
use tracing::info;

pub fn run(args: InitArgs, config: &AppConfig) -> Result<()> {
    if let Some(seed_dir) = &args.seed_dir {
        if !seed_dir.is_dir() {
            return Err(CliError::Argument(format!(
                "Seed directory '{}' does not exist.",
                seed_dir.display()
            )));
        }
    }

    info!("Opening database at {:?}", &config.database);
    let store = Store::open(&config.database)?;

    let spinner = Spinner::start("Initializing database...");
    let report = match bootstrap::initialize(&store, args.seed_dir.as_deref()) {
        Ok(report) => {
            spinner.succeed("Database ready.");
            report
        }
        Err(e) => {
            spinner.fail("Initialization failed.");
            return Err(e.into());
        }
    };

    println!("Database: {}", config.database.display());
    if report.is_noop() {
        println!("Nothing to do, the database is already initialized.");
        return Ok(());
    }
    if report.settings_added > 0 {
        println!("  Added {} default setting(s).", report.settings_added);
    }
    for (dataset_type, registration) in &report.datasets_imported {
        let status = if registration.is_valid() {
            "active"
        } else {
            "INVALID"
        };
        println!(
            "  Imported {} v{} (id {}, {}).",
            dataset_type, registration.version, registration.id, status
        );
        for error in &registration.errors {
            println!("    - {}", error);
        }
    }
    if !report.formulas_created.is_empty() {
        println!(
            "  Installed {} default formula(s).",
            report.formulas_created.len()
        );
    }
    Ok(())
}
