use crate::cli::CheckArgs;
use crate::config::builder::engine_config;
use crate::error::Result;
use ecotox::core::contaminant::registry::ContaminantRegistry;
use ecotox::workflows::simulate::Scenario;
use tracing::info;

pub fn run(args: CheckArgs) -> Result<()> {
    let registry = if args.registry {
        info!("Validating contaminant parameters in {:?}", &args.path);
        ContaminantRegistry::load(&args.path)?
    } else {
        info!("Validating scenario {:?}", &args.path);
        let scenario = Scenario::load(&args.path)?;
        engine_config(&scenario.engine)?;
        let prepared = scenario.prepare()?;
        println!(
            "Grid: {} cell(s), up to {} layer(s).",
            prepared.grid.num_cells(),
            prepared.grid.max_layers()
        );
        prepared.registry
    };

    let active = registry.species().iter().filter(|s| s.is_active()).count();
    println!(
        "{} species ({} active), {} contaminant(s), {} tracer(s).",
        registry.species().len(),
        active,
        registry.contaminants().len(),
        registry.tracer_count()
    );
    println!("✓ {} is valid.", args.path.display());
    Ok(())
}
