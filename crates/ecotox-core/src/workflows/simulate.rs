//! A self-contained scenario runner standing in for the external food-web solver.
//!
//! A [`Scenario`] file describes the grid, the species and contaminants, initial tracer
//! levels, constant cohort biomass, predation and loss events and a forcing schedule. The
//! runner calls [`step::run_substep`] every sub-step, adds forcing, integrates the rates of
//! change with an explicit Euler step and audits mass conservation.

use super::step::{self, LossEvent, PredationEvent, SubstepInputs};
use crate::core::contaminant::params::RegistryParams;
use crate::core::contaminant::registry::{ContaminantRegistry, RegistryError};
use crate::core::models::field::{CohortField, LayerField, TracerField};
use crate::core::models::grid::{CellGeometry, GridError, SpatialGrid};
use crate::core::models::habitat::Habitat;
use crate::core::models::ids::{CellId, ContaminantId, SpeciesId, TracerId};
use crate::core::models::species::CohortTracers;
use crate::engine::config::{
    ConfigError, EngineConfig, EngineConfigBuilder, InteractionMode, MortalityModel,
    TemperatureCorrection,
};
use crate::engine::conservation::{self, ContaminantAudit, MassLedger};
use crate::engine::context::{CohortEffects, EngineState, SimulationContext};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, instrument};

const DEFAULT_TEMPERATURE: f64 = 10.0;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("CSV error for '{path}': {source}")]
    Csv { path: String, source: csv::Error },
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Grid error: {0}")]
    Grid(#[from] GridError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Unknown {kind} '{name}'")]
    UnknownName { kind: &'static str, name: String },
    #[error("Invalid {what}: {reason}")]
    Invalid { what: &'static str, reason: String },
}

/// Engine settings as written in a scenario file; anything left out falls back to the
/// builder defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct EngineSection {
    pub mortality_model: Option<MortalityModel>,
    pub conservation_tolerance: Option<f64>,
    pub audit_interval: Option<u64>,
    pub interaction_mode: Option<InteractionMode>,
    pub amplify_only: Option<bool>,
    pub track_proportion: Option<bool>,
    pub proportion_min_bound: Option<f64>,
    pub smothering_mortality: Option<f64>,
    pub temperature_correction: Option<TemperatureCorrection>,
    pub exposure_time_correction: Option<bool>,
    pub transfer_slack: Option<f64>,
    pub seed: Option<u64>,
}

impl EngineSection {
    /// A builder carrying every value present in the section.
    pub fn to_builder(&self) -> EngineConfigBuilder {
        let mut builder = EngineConfigBuilder::new()
            .temperature_correction(self.temperature_correction);
        if let Some(v) = self.mortality_model {
            builder = builder.mortality_model(v);
        }
        if let Some(v) = self.conservation_tolerance {
            builder = builder.conservation_tolerance(v);
        }
        if let Some(v) = self.audit_interval {
            builder = builder.audit_interval(v);
        }
        if let Some(v) = self.interaction_mode {
            builder = builder.interaction_mode(v);
        }
        if let Some(v) = self.amplify_only {
            builder = builder.amplify_only(v);
        }
        if let Some(v) = self.track_proportion {
            builder = builder.track_proportion(v);
        }
        if let Some(v) = self.proportion_min_bound {
            builder = builder.proportion_min_bound(v);
        }
        if let Some(v) = self.smothering_mortality {
            builder = builder.smothering_mortality(v);
        }
        if let Some(v) = self.exposure_time_correction {
            builder = builder.exposure_time_correction(v);
        }
        if let Some(v) = self.transfer_slack {
            builder = builder.transfer_slack(v);
        }
        if let Some(v) = self.seed {
            builder = builder.seed(v);
        }
        builder
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TimeSection {
    /// Sub-step length, in days.
    pub dt: f64,
    #[serde(default = "default_substeps")]
    pub substeps_per_tick: usize,
    pub ticks: usize,
}

fn default_substeps() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct GridSection {
    pub cells: Vec<CellGeometry>,
}

/// Starting level of a free pool (no `species`) or of a cohort's body burden.
///
/// Leaving out `cell` or `layer` applies the level everywhere the compartment exists.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct InitialLevel {
    pub contaminant: String,
    pub habitat: Option<Habitat>,
    pub species: Option<String>,
    #[serde(default)]
    pub cohort: usize,
    pub cell: Option<CellId>,
    pub layer: Option<usize>,
    pub level: f64,
}

/// Constant cohort biomass; `cohort` defaults to every cohort of the species.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BiomassEntry {
    pub species: String,
    pub cohort: Option<usize>,
    pub tracers: CohortTracers,
}

/// Constant external input into a free pool, in concentration per day, active over
/// `[start, end)`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ForcingEntry {
    pub contaminant: String,
    pub habitat: Habitat,
    pub cell: CellId,
    pub layer: usize,
    pub rate: f64,
    #[serde(default)]
    pub start: f64,
    #[serde(default = "default_end")]
    pub end: f64,
}

fn default_end() -> f64 {
    f64::INFINITY
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PredationEntry {
    pub predator: String,
    #[serde(default)]
    pub predator_cohort: usize,
    pub prey: String,
    #[serde(default)]
    pub prey_cohort: usize,
    pub amount_consumed: f64,
    pub habitat: Habitat,
    pub cell: CellId,
    pub layer: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LossEntry {
    pub species: String,
    #[serde(default)]
    pub cohort: usize,
    pub amount_lost: f64,
    pub habitat: Habitat,
    pub cell: CellId,
    pub layer: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub engine: EngineSection,
    pub time: TimeSection,
    pub grid: GridSection,
    pub registry: RegistryParams,
    #[serde(default)]
    pub initial: Vec<InitialLevel>,
    #[serde(default)]
    pub biomass: Vec<BiomassEntry>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub forcing: Vec<ForcingEntry>,
    #[serde(default)]
    pub predation: Vec<PredationEntry>,
    #[serde(default)]
    pub losses: Vec<LossEntry>,
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Forcing {
    pub contaminant: ContaminantId,
    pub tracer: TracerId,
    pub cell: CellId,
    pub layer: usize,
    /// Pool measure, turning the concentration rate into mass.
    pub measure: f64,
    pub rate: f64,
    pub start: f64,
    pub end: f64,
}

impl Forcing {
    pub fn is_active(&self, time: f64) -> bool {
        time >= self.start && time < self.end
    }
}

/// A scenario with every name resolved and every field laid out.
#[derive(Debug, Clone)]
pub struct PreparedScenario {
    pub registry: ContaminantRegistry,
    pub grid: SpatialGrid,
    pub time: TimeSection,
    pub initial: TracerField,
    pub temperature: LayerField,
    pub biomass: CohortField<CohortTracers>,
    pub forcing: Vec<Forcing>,
    pub predation: Vec<PredationEvent>,
    pub losses: Vec<LossEvent>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let content = std::fs::read_to_string(path).map_err(|e| ScenarioError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ScenarioError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })
    }

    pub fn prepare(&self) -> Result<PreparedScenario, ScenarioError> {
        if !(self.time.dt > 0.0 && self.time.dt.is_finite()) || self.time.substeps_per_tick == 0 {
            return Err(ScenarioError::Invalid {
                what: "time section",
                reason: format!(
                    "dt must be positive and substeps-per-tick at least 1 (dt = {}, substeps = {})",
                    self.time.dt, self.time.substeps_per_tick
                ),
            });
        }
        let registry = ContaminantRegistry::build(self.registry.clone())?;
        let grid = SpatialGrid::new(self.grid.cells.clone())?;
        let (cells, layers) = (grid.num_cells(), grid.max_layers());
        let resolver = Resolver {
            registry: &registry,
            grid: &grid,
        };

        let mut initial = TracerField::zeros(cells, layers, registry.tracer_count());
        for entry in &self.initial {
            resolver.apply_initial(entry, &mut initial)?;
        }

        let mut biomass = CohortField::new(
            registry.layout().clone(),
            cells,
            layers,
            CohortTracers::default(),
        );
        for entry in &self.biomass {
            let species = resolver.species(&entry.species)?;
            let cohorts = match entry.cohort {
                Some(k) => {
                    resolver.check_cohort(species, k)?;
                    k..k + 1
                }
                None => 0..registry.layout().cohorts(species),
            };
            for cohort in cohorts {
                for cell in grid.cell_ids() {
                    for layer in 0..grid.num_layers(cell) {
                        biomass[(species, cohort, cell, layer)] = entry.tracers;
                    }
                }
            }
        }

        let forcing = self
            .forcing
            .iter()
            .map(|entry| resolver.forcing(entry))
            .collect::<Result<Vec<_>, _>>()?;
        let predation = self
            .predation
            .iter()
            .map(|entry| {
                let predator = resolver.species(&entry.predator)?;
                let prey = resolver.species(&entry.prey)?;
                resolver.check_cohort(predator, entry.predator_cohort)?;
                resolver.check_cohort(prey, entry.prey_cohort)?;
                Ok(PredationEvent {
                    predator,
                    predator_cohort: entry.predator_cohort,
                    prey,
                    prey_cohort: entry.prey_cohort,
                    amount_consumed: entry.amount_consumed,
                    habitat: entry.habitat,
                    cell: entry.cell,
                    layer: entry.layer,
                })
            })
            .collect::<Result<Vec<_>, ScenarioError>>()?;
        let losses = self
            .losses
            .iter()
            .map(|entry| {
                let species = resolver.species(&entry.species)?;
                resolver.check_cohort(species, entry.cohort)?;
                Ok(LossEvent {
                    species,
                    cohort: entry.cohort,
                    amount_lost: entry.amount_lost,
                    habitat: entry.habitat,
                    cell: entry.cell,
                    layer: entry.layer,
                })
            })
            .collect::<Result<Vec<_>, ScenarioError>>()?;

        debug!(
            cells,
            layers,
            tracers = registry.tracer_count(),
            forcing = forcing.len(),
            "Prepared scenario"
        );
        Ok(PreparedScenario {
            temperature: LayerField::filled(cells, layers, self.temperature),
            registry,
            grid,
            time: self.time,
            initial,
            biomass,
            forcing,
            predation,
            losses,
        })
    }
}

struct Resolver<'r> {
    registry: &'r ContaminantRegistry,
    grid: &'r SpatialGrid,
}

impl Resolver<'_> {
    fn species(&self, name: &str) -> Result<SpeciesId, ScenarioError> {
        self.registry
            .species_id(name)
            .ok_or_else(|| ScenarioError::UnknownName {
                kind: "species",
                name: name.to_string(),
            })
    }

    fn contaminant(&self, name: &str) -> Result<ContaminantId, ScenarioError> {
        self.registry
            .contaminant_id(name)
            .ok_or_else(|| ScenarioError::UnknownName {
                kind: "contaminant",
                name: name.to_string(),
            })
    }

    fn check_cohort(&self, species: SpeciesId, cohort: usize) -> Result<(), ScenarioError> {
        if self.registry.layout().slot(species, cohort).is_some() {
            Ok(())
        } else {
            Err(ScenarioError::Invalid {
                what: "cohort",
                reason: format!("{species} has no cohort {cohort}"),
            })
        }
    }

    fn free_pool(&self, contaminant: ContaminantId, habitat: Habitat) -> Result<TracerId, ScenarioError> {
        self.registry
            .free_pool_tracer(contaminant, habitat)
            .ok_or_else(|| ScenarioError::Invalid {
                what: "free pool",
                reason: format!("{contaminant} has no {habitat} pool"),
            })
    }

    /// (cell, layer) positions an entry applies to, restricted to where `habitat` exists.
    fn positions(
        &self,
        cell: Option<CellId>,
        layer: Option<usize>,
        habitat: Habitat,
    ) -> Result<Vec<(CellId, usize)>, ScenarioError> {
        let cells: Vec<CellId> = match cell {
            Some(c) if c.index() < self.grid.num_cells() => vec![c],
            Some(c) => {
                return Err(ScenarioError::Invalid {
                    what: "cell",
                    reason: format!("{c} is outside the grid"),
                });
            }
            None => self.grid.cell_ids().collect(),
        };
        let mut positions = Vec::new();
        for c in cells {
            let num_layers = self.grid.num_layers(c);
            match layer {
                Some(l) if habitat.is_present(l, num_layers) => positions.push((c, l)),
                Some(l) => {
                    return Err(ScenarioError::Invalid {
                        what: "layer",
                        reason: format!("{habitat} does not exist in layer {l} of {c}"),
                    });
                }
                None => positions.extend(
                    (0..num_layers)
                        .filter(|&l| habitat.is_present(l, num_layers))
                        .map(|l| (c, l)),
                ),
            }
        }
        Ok(positions)
    }

    fn apply_initial(&self, entry: &InitialLevel, tracers: &mut TracerField) -> Result<(), ScenarioError> {
        if !(entry.level.is_finite() && entry.level >= 0.0) {
            return Err(ScenarioError::Invalid {
                what: "initial level",
                reason: format!("{} for '{}'", entry.level, entry.contaminant),
            });
        }
        let contaminant = self.contaminant(&entry.contaminant)?;
        let (tracer, habitat) = match &entry.species {
            Some(name) => {
                let species = self.species(name)?;
                self.check_cohort(species, entry.cohort)?;
                let habitat = self
                    .registry
                    .species_by_id(species)
                    .and_then(|s| s.home_habitat())
                    .ok_or_else(|| ScenarioError::Invalid {
                        what: "initial level",
                        reason: format!("species '{name}' is not active in any habitat"),
                    })?;
                let tracer = self
                    .registry
                    .body_burden_tracer(contaminant, species, entry.cohort)
                    .ok_or_else(|| ScenarioError::Invalid {
                        what: "initial level",
                        reason: format!("no body-burden tracer for '{name}'"),
                    })?;
                (tracer, habitat)
            }
            None => {
                let habitat = entry.habitat.ok_or_else(|| ScenarioError::Invalid {
                    what: "initial level",
                    reason: "a free-pool level needs a habitat".to_string(),
                })?;
                (self.free_pool(contaminant, habitat)?, habitat)
            }
        };
        for (cell, layer) in self.positions(entry.cell, entry.layer, habitat)? {
            tracers[(cell, layer, tracer)] = entry.level;
        }
        Ok(())
    }

    fn forcing(&self, entry: &ForcingEntry) -> Result<Forcing, ScenarioError> {
        if !(entry.rate.is_finite() && entry.rate >= 0.0) {
            return Err(ScenarioError::Invalid {
                what: "forcing rate",
                reason: format!("{} for '{}'", entry.rate, entry.contaminant),
            });
        }
        let contaminant = self.contaminant(&entry.contaminant)?;
        let tracer = self.free_pool(contaminant, entry.habitat)?;
        self.positions(Some(entry.cell), Some(entry.layer), entry.habitat)?;
        Ok(Forcing {
            contaminant,
            tracer,
            cell: entry.cell,
            layer: entry.layer,
            measure: self.grid.measure(entry.cell, entry.layer, entry.habitat),
            rate: entry.rate,
            start: entry.start,
            end: entry.end,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub audits: Vec<ContaminantAudit>,
    pub tracers: TracerField,
    pub effects: CohortField<CohortEffects>,
    /// Mass declared to the ledger per contaminant, initial mass included.
    pub input: Vec<f64>,
    pub substeps: u64,
}

impl SimulationReport {
    pub fn worst_ratio(&self) -> f64 {
        self.audits.iter().map(|a| a.ratio).fold(0.0, f64::max)
    }
}

#[instrument(skip_all, name = "scenario_workflow")]
pub fn run(
    scenario: &PreparedScenario,
    config: &EngineConfig,
    reporter: &ProgressReporter,
) -> Result<SimulationReport, EngineError> {
    // === Phase 0: Context and initial mass ===
    let setup = reporter.phase("Setup");
    let context = SimulationContext::new(&scenario.registry, &scenario.grid, config, reporter);
    context.check_tracer_field("initial tracers", &scenario.initial)?;
    let mut state = EngineState::new(&context);
    let mut tracers = scenario.initial.clone();
    let mut roc = TracerField::zeros(
        scenario.grid.num_cells(),
        scenario.grid.max_layers(),
        scenario.registry.tracer_count(),
    );

    let mut ledger = MassLedger::new(scenario.registry.contaminants().len());
    let initial_mass = conservation::domain_mass(&context, &tracers)?;
    for (contaminant, mass) in scenario.registry.contaminants().iter().zip(&initial_mass) {
        ledger.record_input(contaminant.id, mass.total())?;
    }
    drop(setup);

    // === Phase 1: Time integration ===
    let time = scenario.time;
    let total = (time.ticks * time.substeps_per_tick) as u64;
    info!(substeps = total, dt = time.dt, "Starting scenario integration.");
    let integration = reporter.phase("Integration");
    reporter.report(Progress::TaskStart { total_steps: total });

    let mut audits = Vec::new();
    for tick in 0..time.ticks {
        for substep in 0..time.substeps_per_tick {
            let now = (tick * time.substeps_per_tick + substep) as f64 * time.dt;
            roc.fill(0.0);
            let inputs = SubstepInputs {
                time: now,
                dt: time.dt,
                first_substep_of_tick: substep == 0,
                temperature: &scenario.temperature,
                biomass: &scenario.biomass,
                predation: &scenario.predation,
                losses: &scenario.losses,
            };
            step::run_substep(&context, &mut state, &inputs, &tracers, &mut roc)?;
            apply_forcing(&scenario.forcing, now, time.dt, &mut roc, &mut ledger)?;
            tracers
                .add_scaled(&roc, time.dt)
                .map_err(|source| EngineError::Dimension {
                    what: "rate of change",
                    source,
                })?;

            let close = step::close_substep(&context, &mut state, &ledger, &tracers, now + time.dt, None)?;
            if let Some(audit) = close.audit {
                reporter.mass_ratio(audit.worst_ratio());
                audits.extend(audit.rows);
            }
            reporter.report(Progress::TaskIncrement);
        }
    }
    reporter.report(Progress::TaskFinish);
    drop(integration);

    // === Phase 2: Report ===
    let input: Vec<f64> = scenario
        .registry
        .contaminants()
        .iter()
        .map(|c| ledger.input(c.id))
        .collect();
    info!(
        substeps = state.substeps(),
        audits = audits.len(),
        "Scenario integration complete."
    );
    Ok(SimulationReport {
        audits,
        effects: state.effects_field().clone(),
        tracers,
        input,
        substeps: state.substeps(),
    })
}

fn apply_forcing(
    forcing: &[Forcing],
    time: f64,
    dt: f64,
    roc: &mut TracerField,
    ledger: &mut MassLedger,
) -> Result<(), EngineError> {
    for f in forcing.iter().filter(|f| f.is_active(time)) {
        roc.add(f.cell, f.layer, f.tracer, f.rate);
        ledger.record_input(f.contaminant, f.rate * dt * f.measure)?;
    }
    Ok(())
}

/// Writes audit rows as CSV, one row per (audit, contaminant).
pub fn write_audits_csv(path: &Path, audits: &[ContaminantAudit]) -> Result<(), ScenarioError> {
    let csv_error = |e: csv::Error| ScenarioError::Csv {
        path: path.to_string_lossy().to_string(),
        source: e,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
    for row in audits {
        writer.serialize(row).map_err(csv_error)?;
    }
    writer.flush().map_err(|e| ScenarioError::Io {
        path: path.to_string_lossy().to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    const SCENARIO: &str = r#"
        temperature = 12.0

        [engine]
        mortality-model = "in-vitro"
        conservation-tolerance = 1e-6
        audit-interval = 2

        [time]
        dt = 0.5
        substeps-per-tick = 2
        ticks = 3

        [[grid.cells]]
        area = 2.0
        layer-thickness = [1.0, 3.0]
        sediment-thickness = 0.5
        neighbors = [1]

        [[grid.cells]]
        area = 1.0
        layer-thickness = [2.0]
        neighbors = [0]

        [[registry.species]]
        name = "Herring"
        kind = "fish"
        age-structure = "biomass-pool"
        habitats = ["water-column"]

        [[registry.species]]
        name = "Cod"
        kind = "fish"
        age-structure = "biomass-pool"
        cohorts = 2
        habitats = ["water-column"]

        [[registry.contaminants]]
        name = "Oil"
        half-life = 20.0
        dissolved-release = 0.3
        free-pool = { water-column = 0 }

        [registry.contaminants.species.Herring]
        uptake-rate = 0.1
        uptake-kinetics = "linear-saturating"
        lc50 = 500.0
        lc100 = 2000.0
        max-chronic = 1000.0
        slope = 1.0
        time-to-lc50 = 4.0

        [registry.contaminants.species.Cod]
        uptake-rate = 0.05
        uptake-kinetics = "linear-saturating"
        lc50 = 800.0
        lc100 = 3000.0
        max-chronic = 1500.0
        slope = 1.0
        time-to-lc50 = 4.0

        [[initial]]
        contaminant = "Oil"
        habitat = "water-column"
        level = 10.0

        [[biomass]]
        species = "Herring"
        tracers = { pool = 5.0 }

        [[biomass]]
        species = "Cod"
        tracers = { pool = 2.0 }

        [[forcing]]
        contaminant = "Oil"
        habitat = "water-column"
        cell = 1
        layer = 0
        rate = 1.5
        end = 1.0

        [[predation]]
        predator = "Cod"
        predator-cohort = 1
        prey = "Herring"
        amount-consumed = 0.5
        habitat = "water-column"
        cell = 0
        layer = 1

        [[losses]]
        species = "Herring"
        amount-lost = 0.25
        habitat = "water-column"
        cell = 1
        layer = 0
    "#;

    fn scenario() -> Scenario {
        toml::from_str(SCENARIO).unwrap()
    }

    fn config(scenario: &Scenario) -> EngineConfig {
        scenario.engine.to_builder().build().unwrap()
    }

    #[test]
    fn load_reads_scenario_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scenario.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{SCENARIO}").unwrap();
        let loaded = Scenario::load(&path).unwrap();
        assert_eq!(loaded, scenario());
        assert_eq!(loaded.time.substeps_per_tick, 2);
        assert_eq!(loaded.engine.mortality_model, Some(MortalityModel::InVitro));
    }

    #[test]
    fn load_reports_path_on_bad_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[time\n").unwrap();
        let err = Scenario::load(&path).unwrap_err();
        assert!(matches!(err, ScenarioError::Toml { ref path, .. } if path.ends_with("broken.toml")));
        let missing = Scenario::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(missing, ScenarioError::Io { .. }));
    }

    #[test]
    fn prepare_places_initial_levels_where_the_habitat_exists() {
        let prepared = scenario().prepare().unwrap();
        let pool = TracerId(0);
        assert_eq!(prepared.initial[(CellId(0), 0, pool)], 10.0);
        assert_eq!(prepared.initial[(CellId(0), 1, pool)], 10.0);
        assert_eq!(prepared.initial[(CellId(1), 0, pool)], 10.0);
        // Cell 1 has a single layer; the padding slot stays empty.
        assert_eq!(prepared.initial[(CellId(1), 1, pool)], 0.0);
        assert_eq!(prepared.biomass[(SpeciesId(1), 1, CellId(1), 0)].pool, 2.0);
        assert_eq!(prepared.forcing.len(), 1);
        assert_eq!(prepared.forcing[0].measure, 2.0);
        assert_eq!(prepared.predation[0].predator, SpeciesId(1));
        assert_eq!(prepared.losses[0].species, SpeciesId(0));
        assert_eq!(prepared.temperature.get(CellId(0), 1), Some(12.0));
    }

    #[test]
    fn prepare_rejects_unknown_names_and_bad_positions() {
        let mut bad = scenario();
        bad.predation[0].prey = "Whale".to_string();
        assert!(matches!(
            bad.prepare().unwrap_err(),
            ScenarioError::UnknownName { kind: "species", .. }
        ));

        let mut bad = scenario();
        bad.forcing[0].layer = 1;
        assert!(matches!(bad.prepare().unwrap_err(), ScenarioError::Invalid { what: "layer", .. }));

        let mut bad = scenario();
        bad.losses[0].cohort = 3;
        assert!(matches!(bad.prepare().unwrap_err(), ScenarioError::Invalid { what: "cohort", .. }));

        let mut bad = scenario();
        bad.time.dt = 0.0;
        assert!(bad.prepare().is_err());
    }

    #[test]
    fn run_conserves_mass_and_counts_forcing_as_input() {
        let scenario = scenario();
        let prepared = scenario.prepare().unwrap();
        let config = config(&scenario);
        let reporter = ProgressReporter::new();
        let report = run(&prepared, &config, &reporter).unwrap();

        assert_eq!(report.substeps, 6);
        assert_eq!(report.audits.len(), 3);
        // Initial mass: cell 0 holds 2*1 + 2*3 volume, cell 1 holds 2.
        let forced = 1.5 * 0.5 * 2.0 * 2.0;
        assert!((report.input[0] - (100.0 + forced)).abs() < 1e-9);
        assert!(report.worst_ratio() <= 1.0 + 1e-6);
        assert!(report.audits.iter().all(|a| a.total.is_finite()));
    }

    #[test]
    fn run_reports_progress_in_phases() {
        use std::sync::Mutex;
        let scenario = scenario();
        let prepared = scenario.prepare().unwrap();
        let config = config(&scenario);
        let increments = Mutex::new(0u64);
        let phases = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| match event {
            Progress::TaskIncrement => *increments.lock().unwrap() += 1,
            Progress::PhaseStart { name } => phases.lock().unwrap().push(name),
            _ => {}
        }));
        run(&prepared, &config, &reporter).unwrap();
        assert_eq!(*increments.lock().unwrap(), 6);
        assert_eq!(*phases.lock().unwrap(), vec!["Setup", "Integration"]);
    }

    #[test]
    fn audits_round_trip_through_csv() {
        let scenario = scenario();
        let prepared = scenario.prepare().unwrap();
        let report = run(&prepared, &config(&scenario), &ProgressReporter::new()).unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.csv");
        write_audits_csv(&path, &report.audits).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next(),
            Some("substep,time,contaminant,free_pool,body_burden,total,input,ratio")
        );
        assert_eq!(lines.count(), report.audits.len());
    }
}
