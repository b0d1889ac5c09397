use super::defaults::DefaultsConfig;
use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use ecotox::engine::config::EngineConfig;
use ecotox::workflows::simulate::{EngineSection, Scenario};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Applies CLI overrides to `scenario` and builds the engine configuration.
///
/// Precedence is command-line flag, then `--set`, then the scenario file, then
/// [`DefaultsConfig`].
pub fn build_config(args: &RunArgs, scenario: &mut Scenario) -> Result<EngineConfig> {
    apply_set_values(&mut scenario.engine, &args.set_values)?;

    let engine = &mut scenario.engine;
    if let Some(model) = &args.mortality_model {
        engine.mortality_model = Some(parse_value("--mortality-model", model)?);
    }
    if let Some(tolerance) = args.tolerance {
        engine.conservation_tolerance = Some(tolerance);
    }
    if let Some(seed) = args.seed {
        engine.seed = Some(seed);
    }
    if let Some(ticks) = args.ticks {
        scenario.time.ticks = ticks;
    }

    engine_config(&scenario.engine)
}

/// Fills whatever `engine` leaves out of the required settings from [`DefaultsConfig`].
pub fn engine_config(engine: &EngineSection) -> Result<EngineConfig> {
    let defaults = DefaultsConfig::default();
    let config = engine
        .to_builder()
        .mortality_model(engine.mortality_model.unwrap_or(defaults.mortality_model))
        .conservation_tolerance(
            engine
                .conservation_tolerance
                .unwrap_or(defaults.conservation_tolerance),
        )
        .audit_interval(engine.audit_interval.unwrap_or(defaults.audit_interval))
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;
    debug!("Final engine configuration: {:?}", config);
    Ok(config)
}

#[derive(Deserialize)]
struct Wrapped<T> {
    value: T,
}

/// Parses a raw override through TOML, so `2`, `true`, `1e-6` and bare words such as
/// `in-vitro` all read the way they would in the scenario file.
fn parse_value<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T> {
    let invalid = || CliError::Config(format!("Invalid value for {}: {}", key, raw));
    if let Ok(wrapped) = toml::from_str::<Wrapped<T>>(&format!("value = {raw}")) {
        return Ok(wrapped.value);
    }
    let quoted = toml::Value::String(raw.to_string()).to_string();
    toml::from_str::<Wrapped<T>>(&format!("value = {quoted}"))
        .map(|w| w.value)
        .map_err(|_| invalid())
}

fn apply_set_values(engine: &mut EngineSection, set_values: &[String]) -> Result<()> {
    for kv_pair in set_values {
        let Some((key, value)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        };
        let (key, value) = (key.trim(), value.trim());

        match key {
            "engine.mortality-model" => engine.mortality_model = Some(parse_value(key, value)?),
            "engine.conservation-tolerance" => {
                engine.conservation_tolerance = Some(parse_value(key, value)?)
            }
            "engine.audit-interval" => engine.audit_interval = Some(parse_value(key, value)?),
            "engine.interaction-mode" => engine.interaction_mode = Some(parse_value(key, value)?),
            "engine.amplify-only" => engine.amplify_only = Some(parse_value(key, value)?),
            "engine.track-proportion" => engine.track_proportion = Some(parse_value(key, value)?),
            "engine.proportion-min-bound" => {
                engine.proportion_min_bound = Some(parse_value(key, value)?)
            }
            "engine.smothering-mortality" => {
                engine.smothering_mortality = Some(parse_value(key, value)?)
            }
            "engine.exposure-time-correction" => {
                engine.exposure_time_correction = Some(parse_value(key, value)?)
            }
            "engine.transfer-slack" => engine.transfer_slack = Some(parse_value(key, value)?),
            "engine.seed" => engine.seed = Some(parse_value(key, value)?),
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
    }
    Ok(())
}
