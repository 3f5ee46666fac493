use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan, Ted Yu",
    version,
    about = "dosecal CLI - Absorbed-dose calculation for ionization-chamber dosimetry with versioned formulas and reference datasets.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Path to the application configuration file (dosecal.toml).
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Path to the SQLite database, overriding the configuration file.
    #[arg(long, global = true, value_name = "PATH")]
    pub database: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or upgrade the database and install default settings, seed datasets and formulas.
    Init(InitArgs),
    /// Manage versioned reference datasets.
    Dataset(DatasetArgs),
    /// Manage versioned dose formulas.
    Formula(FormulaArgs),
    /// Calculate absorbed dose from a measurement file.
    Calculate(CalculateArgs),
    /// Inspect the calculation audit log.
    Runs(RunsArgs),
    /// Inspect and change application settings.
    Settings(SettingsArgs),
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory containing `<dataset_type>.csv` seed files.
    #[arg(long, value_name = "DIR")]
    pub seed_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DatasetArgs {
    #[command(subcommand)]
    pub command: DatasetCommands,
}

#[derive(Subcommand, Debug)]
pub enum DatasetCommands {
    /// List stored dataset versions, newest first.
    List {
        /// Only show versions of this dataset type (e.g., 'beam_quality_table').
        #[arg(long = "type", value_name = "TYPE")]
        dataset_type: Option<String>,
    },
    /// Validate a CSV file and store it as a new dataset version.
    Import {
        /// Dataset type of the file.
        #[arg(long = "type", value_name = "TYPE")]
        dataset_type: String,

        /// Path to the CSV file.
        #[arg(short, long, value_name = "PATH")]
        file: PathBuf,

        /// Free-text notes stored with the version.
        #[arg(long)]
        notes: Option<String>,

        /// Make the new version active if it passes validation.
        #[arg(long)]
        activate: bool,

        /// Name recorded as the uploader. Defaults to the configured username.
        #[arg(long, value_name = "NAME")]
        user: Option<String>,
    },
    /// Make a validated dataset version the active one of its type.
    Activate {
        /// Identifier of the dataset version.
        id: i64,
    },
    /// Print the active dataset of a type as CSV.
    Show {
        #[arg(long = "type", value_name = "TYPE")]
        dataset_type: String,
    },
}

#[derive(Args, Debug)]
pub struct FormulaArgs {
    #[command(subcommand)]
    pub command: FormulaCommands,
}

#[derive(Subcommand, Debug)]
pub enum FormulaCommands {
    /// List stored formula versions.
    List {
        /// Only show formulas of this beam type ('photon' or 'electron').
        #[arg(long = "beam", value_name = "BEAM")]
        beam_type: Option<String>,
    },
    /// Validate and store a new formula version. New versions start inactive.
    Create {
        #[arg(long)]
        name: String,

        #[arg(long = "beam", value_name = "BEAM")]
        beam_type: String,

        /// The arithmetic expression, e.g. 'M_Q * N_Dw_60Co * k_Q'.
        #[arg(short, long)]
        expression: String,

        /// Declared variable name. Can be used multiple times.
        #[arg(long = "var", value_name = "NAME", num_args(1..))]
        variables: Vec<String>,

        /// Unit annotation. Can be used multiple times. Example: --unit output=Gy
        #[arg(long = "unit", value_name = "KEY=VALUE")]
        units: Vec<String>,

        #[arg(long)]
        notes: Option<String>,

        /// Name recorded as the author. Defaults to the configured username.
        #[arg(long, value_name = "NAME")]
        user: Option<String>,
    },
    /// Make a valid formula version the active one of its beam type.
    Activate {
        /// Identifier of the formula version.
        id: i64,
    },
    /// Check an expression against the allow-list without storing it.
    Check {
        #[arg(short, long)]
        expression: String,

        #[arg(long = "var", value_name = "NAME", num_args(0..))]
        variables: Vec<String>,
    },
}

/// Arguments for the `calculate` subcommand.
#[derive(Args, Debug)]
pub struct CalculateArgs {
    /// Path to the measurement file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Set a specific measurement value, overriding the measurement file.
    /// Can be used multiple times. Example: -S reading=10.2
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,

    /// Append the result to the calculation audit log.
    #[arg(long)]
    pub record: bool,

    /// Name recorded with the run. Defaults to the configured username.
    #[arg(long, value_name = "NAME")]
    pub user: Option<String>,

    /// Print the full result as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct RunsArgs {
    #[command(subcommand)]
    pub command: RunsCommands,
}

#[derive(Subcommand, Debug)]
pub enum RunsCommands {
    /// List recorded runs, newest first.
    List {
        #[arg(short = 'n', long, value_name = "NUM")]
        limit: Option<usize>,
    },
    /// Print one recorded run as JSON.
    Show { id: i64 },
}

#[derive(Args, Debug)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub command: SettingsCommands,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommands {
    /// List every stored setting.
    List,
    /// Store a setting value.
    Set { key: String, value: String },
    /// Show the resolved environment source and the locations of the active environmental dataset.
    Environment,
}
