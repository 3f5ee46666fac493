use crate::cli::{SettingsArgs, SettingsCommands};
use crate::config::AppConfig;
use crate::error::{CliError, Result};
use dosecal::engine::environment::list_environment_locations;
use dosecal::storage::settings::{
    ENV_DATASET_LOCATION, ENV_MANUAL_PRESSURE_KPA, ENV_MANUAL_TEMPERATURE_C, ENV_SOURCE,
};
use dosecal::storage::{EnvironmentSource, Store};
use tracing::info;

pub fn run(args: SettingsArgs, config: &AppConfig) -> Result<()> {
    let store = Store::open(&config.database)?;
    match args.command {
        SettingsCommands::List => {
            let settings = store.settings().list()?;
            if settings.is_empty() {
                println!("No settings stored. Run 'dosecal init' to install the defaults.");
            }
            for (key, value) in &settings {
                println!("{} = {}", key, value);
            }
            Ok(())
        }
        SettingsCommands::Set { key, value } => {
            let value = validate_setting(&key, &value)?;
            store.settings().set(&key, &value)?;
            info!("Stored setting '{}'.", key);
            println!("✓ {} = {}", key, value);
            Ok(())
        }
        SettingsCommands::Environment => show_environment(&store),
    }
}

/// Checks the environment keys the calculator reads and returns the value to store.
///
/// Keys outside the environment group are stored verbatim.
fn validate_setting(key: &str, value: &str) -> Result<String> {
    let value = value.trim();
    match key {
        ENV_SOURCE => value
            .parse::<EnvironmentSource>()
            .map(|source| source.as_str().to_string())
            .map_err(|e| CliError::Argument(e.to_string())),
        ENV_MANUAL_TEMPERATURE_C => parse_number(value)
            .filter(|t| *t > -273.15)
            .map(|_| value.to_string())
            .ok_or_else(|| invalid_number(key, value, "a temperature above absolute zero")),
        ENV_MANUAL_PRESSURE_KPA => parse_number(value)
            .filter(|p| *p > 0.0)
            .map(|_| value.to_string())
            .ok_or_else(|| invalid_number(key, value, "a positive pressure")),
        ENV_DATASET_LOCATION => Ok(value.to_string()),
        _ if key.trim().is_empty() => {
            Err(CliError::Argument("Setting key cannot be empty.".to_string()))
        }
        _ => Ok(value.to_string()),
    }
}

fn parse_number(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn invalid_number(key: &str, value: &str, expected: &str) -> CliError {
    CliError::Argument(format!(
        "Invalid value for {}: '{}'. Expected {}.",
        key, value, expected
    ))
}

fn show_environment(store: &Store) -> Result<()> {
    let settings = store.settings().environment_settings()?;
    println!("Environment source: {}", settings.source);
    match settings.source {
        EnvironmentSource::Manual => println!(
            "  Manual conditions: {} °C, {} kPa",
            settings.manual_temperature_c, settings.manual_pressure_kpa
        ),
        EnvironmentSource::Dataset | EnvironmentSource::Auto => {
            let location = if settings.dataset_location.is_empty() {
                "(first row)"
            } else {
                settings.dataset_location.as_str()
            };
            println!("  Location: {}", location);
        }
    }

    let locations = list_environment_locations(&store.datasets())?;
    if locations.is_empty() {
        println!("No active environmental dataset.");
    } else {
        println!("Locations in the active environmental dataset:");
        for location in &locations {
            println!("  - {}", location);
        }
    }
    Ok(())
}
