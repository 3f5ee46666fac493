use crate::cli::CalculateArgs;
use crate::config::{AppConfig, PartialMeasurement};
use crate::environment::{self, needs_environment};
use crate::error::Result;
use dosecal::engine::{CalculationResult, Calculator};
use dosecal::storage::Store;
use tracing::{debug, info};

pub async fn run(args: CalculateArgs, config: &AppConfig) -> Result<()> {
    let partial = PartialMeasurement::from_file(&args.input)?;
    info!("Merging measurement file and CLI arguments...");
    let inputs = partial.merge_with_cli(&args, config)?;
    debug!("Final calculation inputs: {:?}", &inputs);

    let store = Store::open(&config.database)?;
    let settings = store.settings().environment_settings()?;
    let datasets = store.datasets();
    let provider = environment::resolve(&datasets, &settings, needs_environment(&inputs)).await;

    info!("Invoking the dose calculation...");
    let result =
        tokio::task::block_in_place(|| Calculator::new(&store, &provider).calculate(&inputs))?;

    let run_id = if args.record {
        let username = config.user_or_default(args.user.clone());
        let run = result.to_new_run(&inputs, &username, None)?;
        let id = store.runs().record(&run)?;
        info!("Recorded calculation as run {}.", id);
        Some(id)
    } else {
        None
    };

    if args.json {
        println!("{}", result.to_json()?);
    } else {
        print_summary(&result);
        if let Some(id) = run_id {
            println!("✓ Recorded as run {}.", id);
        }
    }
    Ok(())
}

fn print_summary(result: &CalculationResult) {
    println!(
        "Formula: {} v{} ({} beam, {})",
        result.formula_name, result.formula_version, result.beam_type, result.geometry
    );
    println!("  {}", result.formula_expression);
    if let Some(environment) = &result.environment {
        println!(
            "Environment: {:.1} °C, {:.2} kPa{}",
            environment.temperature_c,
            environment.pressure_kpa,
            environment
                .location
                .as_deref()
                .map(|location| format!(" ({})", location))
                .unwrap_or_default()
        );
    }
    println!("Intermediate values:");
    for (name, value) in &result.intermediate {
        println!("  {:<12} {:.6e}", name, value);
    }
    if !result.dataset_versions.is_empty() {
        let versions: Vec<String> = result
            .dataset_versions
            .iter()
            .map(|(dataset_type, version)| format!("{} v{}", dataset_type, version))
            .collect();
        println!("Datasets: {}", versions.join(", "));
    }
    println!(
        "Dose per measurement: {:.6} Gy",
        result.outputs.dose_per_measurement_gy
    );
    println!(
        "Dose per 100 MU:      {:.6} Gy",
        result.outputs.dose_per_100mu_gy
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use crate::error::CliError;
    use clap::Parser;
    use dosecal::core::tables::{DatasetType, Table};
    use dosecal::engine::CalculationError;
    use dosecal::workflows::bootstrap;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    const MEASUREMENT: &str = r#"
        beam-type = "photon"
        chamber-type = "FC65-G"
        reading = 10.0
        monitor-units = 100
        calibration-constant = 5.233e7

        [pressure-temperature]
        factor = 1.0

        [ion-recombination]
        factor = 1.0

        [beam-quality]
        factor = 0.985

        [depth-dose]
        factor = 1.0
    "#;

    const BEAM_QUALITY: &str = "chamber_type,beam_quality,value\nFC65-G,0.60,0.990\n";

    fn calculate_args(path: &Path, extra: &[&str]) -> CalculateArgs {
        let mut argv = vec![
            "dosecal".to_string(),
            "calculate".to_string(),
            "-i".to_string(),
            path.to_str().unwrap().to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        match Cli::parse_from(argv).command {
            Commands::Calculate(args) => args,
            other => panic!("Expected 'calculate' subcommand, got {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn recorded_calculation_is_appended_to_the_run_log() {
        let dir = tempdir().unwrap();
        let config = AppConfig::with_database(dir.path().join("dosecal.db"));
        let store = Store::open(&config.database).unwrap();
        bootstrap::initialize(&store, None).unwrap();
        let beam_quality = Table::from_csv_bytes(BEAM_QUALITY.as_bytes()).unwrap();
        store
            .datasets()
            .register(DatasetType::BeamQualityTable, &beam_quality, "qa", None, true)
            .unwrap();
        drop(store);
        let input = dir.path().join("measurement.toml");
        fs::write(&input, MEASUREMENT).unwrap();

        run(calculate_args(&input, &["--record", "--user", "qa"]), &config)
            .await
            .unwrap();

        let store = Store::open(&config.database).unwrap();
        let runs = store.runs().list(10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].username, "qa");
        let dose = runs[0].outputs["dose_per_measurement_gy"].as_f64().unwrap();
        assert!((dose - 10.0e-9 * 5.233e7 * 0.985).abs() < 1e-12);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn calculation_without_formula_fails_and_records_nothing() {
        let dir = tempdir().unwrap();
        let config = AppConfig::with_database(dir.path().join("dosecal.db"));
        let input = dir.path().join("measurement.toml");
        fs::write(&input, MEASUREMENT).unwrap();

        let result = run(calculate_args(&input, &["--record"]), &config).await;
        assert!(matches!(
            result,
            Err(CliError::Calculation(CalculationError::Configuration(_)))
        ));
        let store = Store::open(&config.database).unwrap();
        assert!(store.runs().list(10).unwrap().is_empty());
    }
}
