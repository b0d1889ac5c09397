use crate::cli::RunArgs;
use crate::config::builder::build_config;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use ecotox::engine::progress::ProgressReporter;
use ecotox::workflows::simulate::{self, Scenario, SimulationReport};
use tracing::{info, warn};

pub fn run(args: RunArgs) -> Result<()> {
    info!("Loading scenario from {:?}", &args.scenario);
    let mut scenario = Scenario::load(&args.scenario)?;
    info!("Merging engine configuration from scenario and CLI arguments...");
    let config = build_config(&args, &mut scenario)?;
    let prepared = scenario.prepare()?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Running {} tick(s) of {} sub-step(s)...",
        prepared.time.ticks, prepared.time.substeps_per_tick
    );
    let report = simulate::run(&prepared, &config, &reporter)?;
    print_summary(&report);

    if let Some(path) = &args.audit_csv {
        if report.audits.is_empty() {
            warn!("No audit was due during the run; writing an empty audit file.");
        }
        simulate::write_audits_csv(path, &report.audits)?;
        println!("Audit rows written to: {}", path.display());
    }
    Ok(())
}

fn print_summary(report: &SimulationReport) {
    println!("Completed {} sub-step(s).", report.substeps);
    let Some(last) = report.audits.last().map(|a| a.substep) else {
        println!("No conservation audit was due.");
        return;
    };
    for row in report.audits.iter().filter(|a| a.substep == last) {
        println!(
            "  {:<16} free pool {:>12.4}  body burden {:>12.4}  input {:>12.4}  ratio {:.6}",
            row.contaminant, row.free_pool, row.body_burden, row.input, row.ratio
        );
    }
    println!("Worst mass ratio over the run: {:.6}", report.worst_ratio());
}
