use crate::error::{CliError, Result};
use std::fs::File;
use std::path::PathBuf;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt,
    prelude::*,
};

/// Crates whose events follow the verbosity flags. Everything else, such as
/// the HTTP client stack behind the weather lookup, stays at `WARN`.
const OWN_TARGETS: [&str; 2] = ["dosecal", "dosecal_cli"];

fn level_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::OFF;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn target_filter(verbosity: u8, quiet: bool) -> Targets {
    let level = level_filter(verbosity, quiet);
    OWN_TARGETS
        .iter()
        .fold(Targets::new(), |targets, target| targets.with_target(*target, level))
        .with_default(level.min(LevelFilter::WARN))
}

pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<PathBuf>) -> Result<()> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    // The file layer records the module of each event; stderr stays compact.
    let file_layer = log_file
        .map(|path| {
            File::create(&path).map(|file| {
                fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_target(true)
            })
        })
        .transpose()
        .map_err(CliError::Io)?;

    tracing_subscriber::registry()
        .with(target_filter(verbosity, quiet))
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(())
}
