use crate::cli::{RunsArgs, RunsCommands};
use crate::config::AppConfig;
use crate::error::{CliError, Result};
use dosecal::storage::{RunRecord, Store};

pub fn run(args: RunsArgs, config: &AppConfig) -> Result<()> {
    let store = Store::open(&config.database)?;
    match args.command {
        RunsCommands::List { limit } => {
            let runs = store.runs().list(limit.unwrap_or(config.history_limit))?;
            if runs.is_empty() {
                println!("No calculations recorded.");
                return Ok(());
            }
            for run in &runs {
                println!("{}", summarize(run));
            }
            Ok(())
        }
        RunsCommands::Show { id } => {
            let run = store
                .runs()
                .get(id)?
                .ok_or_else(|| CliError::Data(format!("Run {} was not found.", id)))?;
            let json = serde_json::to_string_pretty(&run).map_err(|e| CliError::Other(e.into()))?;
            println!("{}", json);
            Ok(())
        }
    }
}

fn summarize(run: &RunRecord) -> String {
    let dose = run
        .outputs
        .get("dose_per_100mu_gy")
        .and_then(|value| value.as_f64())
        .map(|dose| format!("{:.4} Gy/100MU", dose))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:>5}  {}  {:<8} {:<12} {} v{}  {}",
        run.id,
        run.timestamp.format("%Y-%m-%d %H:%M:%S"),
        run.beam_type.as_str(),
        run.username,
        run.formula_name,
        run.formula_version,
        dose
    )
}
