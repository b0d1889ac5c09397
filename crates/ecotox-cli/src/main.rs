mod cli;
mod commands;
mod config;
mod error;
mod logging;
mod utils;

use crate::cli::{Cli, Commands};
use crate::error::{CliError, Result};
use clap::Parser;
use tracing::{debug, error, info};

fn main() {
    if let Err(e) = run_app() {
        eprintln!("\n❌ Error: {e}");
        std::process::exit(1);
    }
}

fn run_app() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.as_deref())?;
    info!("ecotox v{}", env!("CARGO_PKG_VERSION"));
    debug!(?cli, "Parsed arguments");

    if let Some(threads) = cli.threads {
        configure_thread_pool(threads)?;
    }

    let (name, outcome) = match cli.command {
        Commands::Run(args) => ("run", commands::run::run(args)),
        Commands::Check(args) => ("check", commands::check::run(args)),
    };
    match &outcome {
        Ok(()) => info!(command = name, "Finished"),
        Err(e) => error!(command = name, "Failed: {e}"),
    }
    outcome
}

/// Sizes the global pool used by the parallel mass audit.
fn configure_thread_pool(threads: usize) -> Result<()> {
    debug!(threads, "Building global rayon pool");
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to build thread pool: {e}")))
}
