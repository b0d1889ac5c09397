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
    author = "ecotox developers",
    version,
    about = "ecotox CLI - run and validate contaminant fate-and-effects scenarios for box-and-layer marine ecosystem models.",
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

    /// Set the number of threads for the parallel mass audit.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Integrate a scenario and audit mass conservation along the way.
    Run(RunArgs),
    /// Validate a scenario or a contaminant parameter file without running it.
    Check(CheckArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the scenario file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub scenario: PathBuf,

    /// Write every conservation audit row to a CSV file.
    #[arg(short = 'o', long, value_name = "PATH")]
    pub audit_csv: Option<PathBuf>,

    // --- Engine Overrides ---
    /// Override the mortality model ('threshold-logistic' or 'in-vitro').
    #[arg(short, long, value_name = "MODEL")]
    pub mortality_model: Option<String>,

    /// Override the relative conservation tolerance.
    #[arg(short = 't', long, value_name = "FLOAT")]
    pub tolerance: Option<f64>,

    /// Override the seed of the proportion draws.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    // --- Time Overrides ---
    /// Override the number of ticks to integrate.
    #[arg(short = 'n', long, value_name = "INT")]
    pub ticks: Option<usize>,

    /// Set a specific engine value, overriding the scenario file.
    /// Can be used multiple times. Example: -S engine.audit-interval=10
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `check` subcommand.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// File to validate.
    #[arg(required = true, value_name = "PATH")]
    pub path: PathBuf,

    /// Treat the file as a bare contaminant parameter file instead of a scenario.
    #[arg(long)]
    pub registry: bool,
}
