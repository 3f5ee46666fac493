mod cli;
mod commands;
mod config;
mod environment;
mod error;
mod logging;
mod utils;
mod weather;

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::error::{CliError, Result};
use clap::Parser;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run_app().await {
        eprintln!("\n❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn run_app() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.clone())?;

    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default().into_hooks();
    eyre_hook.install().map_err(|e| CliError::Other(e.into()))?;
    std::panic::set_hook(Box::new(move |pi| {
        error!("{}", panic_hook.panic_report(pi));
    }));

    let command_result = async {
        info!("🚀 dosecal CLI v{} starting up.", env!("CARGO_PKG_VERSION"));
        debug!("Full CLI arguments parsed: {:?}", &cli);

        let config = AppConfig::load(cli.config.as_deref(), cli.database.as_deref())?;

        match cli.command {
            Commands::Init(args) => {
                info!("Dispatching to 'init' command.");
                commands::init::run(args, &config)
            }
            Commands::Dataset(args) => {
                info!("Dispatching to 'dataset' command.");
                commands::dataset::run(args, &config)
            }
            Commands::Formula(args) => {
                info!("Dispatching to 'formula' command.");
                commands::formula::run(args, &config)
            }
            Commands::Calculate(args) => {
                info!("Dispatching to 'calculate' command.");
                commands::calculate::run(args, &config).await
            }
            Commands::Runs(args) => {
                info!("Dispatching to 'runs' command.");
                commands::runs::run(args, &config)
            }
            Commands::Settings(args) => {
                info!("Dispatching to 'settings' command.");
                commands::settings::run(args, &config)
            }
        }
    }
    .await;

    match &command_result {
        Ok(_) => {
            info!("✅ Command completed successfully.");
            println!("✅ Command completed successfully.");
        }
        Err(e) => {
            error!("❌ Command failed: {}", e);
            eprintln!("❌ Command failed: {}", e);
        }
    }

    command_result
}
