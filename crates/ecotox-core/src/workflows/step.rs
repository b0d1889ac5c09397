//! The per-sub-step contaminant sweep an external food-web solver calls.
//!
//! Units are visited in a fixed order (cells, then layers, then the habitats present). Within
//! each unit the components run as decay, uptake, reconciliation, transfer and effects, and
//! the resulting fluxes are added into the rate-of-change field. Body-burden fluxes of a
//! (cell, layer) are committed once all of its habitats have been visited.

use crate::core::contaminant::registry::Contaminant;
use crate::core::models::field::{CohortField, LayerField, ShapeMismatch, TracerField};
use crate::core::models::habitat::Habitat;
use crate::core::models::ids::{CellId, ContaminantId, SpeciesId};
use crate::core::models::species::CohortTracers;
use crate::engine::conservation::{self, MassAudit, MassLedger};
use crate::engine::context::{CohortEffects, EngineState, ExposureState, SimulationContext};
use crate::engine::decay::{body_burden_decay, free_pool_decay};
use crate::engine::effects::{CohortExposure, EffectInputs, EffectsEngine};
use crate::engine::error::{EngineError, Location, ensure_finite};
use crate::engine::flux::{FluxLedger, pool_net_flux, reconcile};
use crate::engine::interaction::effective_burdens;
use crate::engine::movement::{MovementSummary, couple_movement};
use crate::engine::transfer::{draw_proportion, predation_transfer, release_transfer};
use crate::engine::uptake::{cohort_uptake, record_exposure};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, instrument, trace};

/// Biomass eaten by a predator cohort from a prey cohort, as a rate over the sub-step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PredationEvent {
    pub predator: SpeciesId,
    pub predator_cohort: usize,
    pub prey: SpeciesId,
    pub prey_cohort: usize,
    pub amount_consumed: f64,
    pub habitat: Habitat,
    pub cell: CellId,
    pub layer: usize,
}

/// Biomass a cohort lost to non-predation causes during the sub-step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LossEvent {
    pub species: SpeciesId,
    pub cohort: usize,
    pub amount_lost: f64,
    pub habitat: Habitat,
    pub cell: CellId,
    pub layer: usize,
}

/// Everything the food-web model hands over for one sub-step.
#[derive(Debug, Clone, Copy)]
pub struct SubstepInputs<'i> {
    pub time: f64,
    pub dt: f64,
    pub first_substep_of_tick: bool,
    pub temperature: &'i LayerField,
    pub biomass: &'i CohortField<CohortTracers>,
    pub predation: &'i [PredationEvent],
    pub losses: &'i [LossEvent],
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SubstepSummary {
    pub units: usize,
    /// Pools whose uptake demand had to be scaled down.
    pub reconciled_pools: usize,
    pub transfers: usize,
}

/// Headcounts around the external transport step, for the movement coupler.
#[derive(Debug, Clone, Copy)]
pub struct Transport<'t> {
    pub before: &'t CohortField<f64>,
    pub after: &'t CohortField<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct SubstepClose {
    pub movement: MovementSummary,
    pub audit: Option<MassAudit>,
}

type UnitKey = (CellId, usize, Habitat);

/// Runs decay, uptake, reconciliation, transfer and effects over every unit and adds the
/// resulting fluxes into `roc`.
///
/// `tracers` holds the current free-pool and body-burden levels and is not modified. Effect
/// multipliers are left in `state` (see [`EngineState::effects`]).
#[instrument(skip_all, name = "contaminant_substep", fields(time = inputs.time))]
pub fn run_substep(
    context: &SimulationContext,
    state: &mut EngineState,
    inputs: &SubstepInputs,
    tracers: &TracerField,
    roc: &mut TracerField,
) -> Result<SubstepSummary, EngineError> {
    validate_inputs(context, inputs, tracers, roc)?;

    let registry = context.registry;
    let grid = context.grid;
    let species_dt: Vec<f64> = registry
        .species()
        .iter()
        .map(|s| s.cadence.effective_dt(inputs.dt, inputs.first_substep_of_tick))
        .collect();
    let predation: HashMap<UnitKey, Vec<&PredationEvent>> = inputs
        .predation
        .iter()
        .into_group_map_by(|e| (e.cell, e.layer, e.habitat));
    let losses: HashMap<UnitKey, Vec<&LossEvent>> = inputs
        .losses
        .iter()
        .into_group_map_by(|e| (e.cell, e.layer, e.habitat));

    let mut sweep = Sweep {
        context,
        inputs,
        tracers,
        species_dt: &species_dt,
        ledger: FluxLedger::new(
            registry.contaminants().len(),
            registry.layout().num_slots(),
        ),
        summary: SubstepSummary::default(),
    };

    for cell in grid.cell_ids() {
        for layer in 0..grid.num_layers(cell) {
            sweep.ledger.reset();
            for habitat in grid.habitats_at(cell, layer) {
                let key = (cell, layer, habitat);
                let unit_predation = predation.get(&key).map_or(&[][..], Vec::as_slice);
                let unit_losses = losses.get(&key).map_or(&[][..], Vec::as_slice);
                sweep.run_unit(state, roc, key, unit_predation, unit_losses)?;
            }
            sweep.commit_body_fluxes(roc, cell, layer)?;
        }
    }

    let substep = state.advance_substep();
    trace!(substep, units = sweep.summary.units, "Contaminant sub-step complete");
    Ok(sweep.summary)
}

/// Serialized pass after the in-cell sweep: movement coupling, then the conservation audit
/// when one is due. `tracers` must already include this sub-step's fluxes.
#[instrument(skip_all, name = "contaminant_substep_close")]
pub fn close_substep(
    context: &SimulationContext,
    state: &mut EngineState,
    ledger: &MassLedger,
    tracers: &TracerField,
    time: f64,
    transport: Option<Transport>,
) -> Result<SubstepClose, EngineError> {
    let movement = match transport {
        Some(t) => couple_movement(context, state, t.before, t.after)?,
        None => MovementSummary::default(),
    };
    let substep = state.substeps();
    let audit = if substep % context.config.audit_interval == 0 {
        Some(conservation::audit(context, ledger, tracers, substep, time)?)
    } else {
        None
    };
    Ok(SubstepClose { movement, audit })
}

struct Sweep<'s, 'a> {
    context: &'s SimulationContext<'a>,
    inputs: &'s SubstepInputs<'s>,
    tracers: &'s TracerField,
    species_dt: &'s [f64],
    ledger: FluxLedger,
    summary: SubstepSummary,
}

struct Demand {
    slot: usize,
    species: SpeciesId,
    cohort: usize,
    /// Uptake rate in the pool's concentration units.
    pool_rate: f64,
    /// Home-compartment measure over pool measure.
    mass_ratio: f64,
}

impl Sweep<'_, '_> {
    #[inline]
    fn body_burden(&self, contaminant: ContaminantId, species: SpeciesId, cohort: usize, cell: CellId, layer: usize) -> f64 {
        self.context
            .registry
            .body_burden_tracer(contaminant, species, cohort)
            .and_then(|t| self.tracers.get(cell, layer, t))
            .unwrap_or(0.0)
    }

    #[inline]
    fn pool_level(&self, contaminant: &Contaminant, habitat: Habitat, cell: CellId, layer: usize) -> f64 {
        contaminant
            .free_pool_tracer(habitat)
            .and_then(|t| self.tracers.get(cell, layer, t))
            .map_or(0.0, |v| v.max(0.0))
    }

    fn run_unit(
        &mut self,
        state: &mut EngineState,
        roc: &mut TracerField,
        (cell, layer, habitat): UnitKey,
        predation: &[&PredationEvent],
        losses: &[&LossEvent],
    ) -> Result<(), EngineError> {
        let registry = self.context.registry;
        let grid = self.context.grid;
        let measure = grid.measure(cell, layer, habitat);
        self.summary.units += 1;

        for contaminant in registry.contaminants() {
            let c = contaminant.id;

            // === Decay of the body burdens that live here ===
            for (species_id, cohort) in registry.layout().iter() {
                let species = &registry.species()[species_id.index()];
                let sdt = self.species_dt[species_id.index()];
                if species.home_habitat() != Some(habitat) || !contaminant.tracks(species_id) || sdt <= 0.0 {
                    continue;
                }
                let burden = self.body_burden(c, species_id, cohort, cell, layer);
                let decayed = body_burden_decay(contaminant, species_id, burden, sdt);
                if let Some(slot) = registry.layout().slot(species_id, cohort) {
                    self.ledger.cohort_mut(c, slot).decayed += decayed;
                }
            }

            // === Exchange with the free pool, where this habitat has one ===
            let pool = contaminant.free_pool_tracer(habitat);
            let (pool_decay, reconciled) = match pool {
                Some(_) => self.exchange_with_pool(state, contaminant, (cell, layer, habitat), measure),
                None => (0.0, 0.0),
            };

            // === Predation and loss transfers attributed to this habitat ===
            for event in predation {
                self.apply_predation(state, contaminant, event)?;
            }
            for event in losses {
                self.apply_loss(contaminant, event, measure)?;
            }

            if let Some(pool) = pool {
                let net = pool_net_flux(self.ledger.pool_gain(c, habitat), pool_decay, reconciled);
                let net = ensure_finite("free-pool flux", net, || {
                    Location::unit(cell, layer).contaminant(c)
                })?;
                roc.add(cell, layer, pool, net);
            }
        }

        // === Effects for cohorts whose home habitat is this one ===
        self.evaluate_effects(state, cell, layer, habitat)
    }

    /// Pool decay and reconciled uptake of one contaminant in one unit, as rates in pool
    /// units. Uptake is booked into the flux ledger and the exposure history.
    fn exchange_with_pool(
        &mut self,
        state: &mut EngineState,
        contaminant: &Contaminant,
        (cell, layer, habitat): UnitKey,
        measure: f64,
    ) -> (f64, f64) {
        let registry = self.context.registry;
        let c = contaminant.id;
        let dt = self.inputs.dt;
        let env = self.pool_level(contaminant, habitat, cell, layer);
        let pool_decay = free_pool_decay(contaminant, env, dt);

        // === Uptake demand of every cohort active in this habitat ===
        let mut demands = Vec::new();
        if measure > 0.0 {
            for (species_id, cohort) in registry.layout().iter() {
                let species = &registry.species()[species_id.index()];
                let sdt = self.species_dt[species_id.index()];
                let (Some(coefficients), Some(slot)) = (
                    contaminant.coefficients(species_id),
                    registry.layout().slot(species_id, cohort),
                ) else {
                    continue;
                };
                if !species.lives_in(habitat) || sdt <= 0.0 {
                    continue;
                }
                let home_measure = self.context.home_measure(species, cell, layer);
                if home_measure <= 0.0 {
                    continue;
                }
                let body = self.body_burden(c, species_id, cohort, cell, layer);
                let rate = cohort_uptake(coefficients, env, body, sdt);
                if rate > 0.0 {
                    let mass_ratio = home_measure / measure;
                    demands.push(Demand {
                        slot,
                        species: species_id,
                        cohort,
                        pool_rate: rate * mass_ratio,
                        mass_ratio,
                    });
                }
            }
        }

        // === Reconciliation against the available pool ===
        let mut pool_rates: Vec<f64> = demands.iter().map(|d| d.pool_rate).collect();
        let requested: f64 = pool_rates.iter().sum();
        let reconciled = reconcile(env, pool_decay, &mut pool_rates, dt);
        if reconciled < requested {
            self.summary.reconciled_pools += 1;
            trace!(%cell, layer, %habitat, requested, reconciled, "Uptake demand reconciled");
        }
        for (demand, pool_rate) in demands.iter().zip(&pool_rates) {
            let body_rate = pool_rate / demand.mass_ratio;
            self.ledger.cohort_mut(c, demand.slot).uptake += body_rate;
            if let Some(exposure) = state.exposure[c.index()].get_mut(demand.species, demand.cohort, cell, layer) {
                record_exposure(
                    exposure,
                    body_rate,
                    self.inputs.time,
                    self.context.config.track_proportion,
                );
            }
        }
        (pool_decay, reconciled)
    }

    fn apply_predation(
        &mut self,
        state: &mut EngineState,
        contaminant: &Contaminant,
        event: &PredationEvent,
    ) -> Result<(), EngineError> {
        let registry = self.context.registry;
        let config = self.context.config;
        let (cell, layer) = (event.cell, event.layer);
        let c = contaminant.id;
        let location = || {
            Location::unit(cell, layer)
                .contaminant(c)
                .cohort(event.prey, event.prey_cohort)
        };

        let prey = &registry.species()[event.prey.index()];
        let predator = &registry.species()[event.predator.index()];
        let prey_burden = self.body_burden(c, event.prey, event.prey_cohort, cell, layer);
        let prey_biomass = prey.biomass(&self.inputs.biomass[(event.prey, event.prey_cohort, cell, layer)]);
        let transfer = predation_transfer(
            prey_burden,
            event.amount_consumed,
            prey_biomass,
            self.inputs.dt,
            config.transfer_slack,
            location,
        )?;
        if transfer == 0.0 {
            return Ok(());
        }
        let prey_measure = self.context.home_measure(prey, cell, layer);
        let predator_measure = self.context.home_measure(predator, cell, layer);
        if prey_measure <= 0.0 || predator_measure <= 0.0 {
            debug!(contaminant = %contaminant.name, %cell, layer, "Skipping transfer between compartments without volume");
            return Ok(());
        }
        let gain = transfer * prey_measure / predator_measure;

        let (Some(prey_slot), Some(predator_slot)) = (
            registry.layout().slot(event.prey, event.prey_cohort),
            registry.layout().slot(event.predator, event.predator_cohort),
        ) else {
            return Ok(());
        };
        self.ledger
            .cohort_mut(c, prey_slot)
            .add_transfer(event.habitat, -transfer);
        self.ledger
            .cohort_mut(c, predator_slot)
            .add_transfer(event.habitat, gain);
        self.summary.transfers += 1;

        let predator_biomass = predator.biomass(
            &self.inputs.biomass[(event.predator, event.predator_cohort, cell, layer)],
        );
        let EngineState { exposure, rng, .. } = state;
        if let Some(entry) =
            exposure[c.index()].get_mut(event.predator, event.predator_cohort, cell, layer)
        {
            entry.mark_onset(self.inputs.time);
            if config.track_proportion {
                entry.proportion = draw_proportion(
                    rng,
                    entry.proportion,
                    gain,
                    predator_biomass,
                    config.proportion_min_bound,
                );
            }
        }
        Ok(())
    }

    fn apply_loss(
        &mut self,
        contaminant: &Contaminant,
        event: &LossEvent,
        measure: f64,
    ) -> Result<(), EngineError> {
        let registry = self.context.registry;
        let (cell, layer) = (event.cell, event.layer);
        let c = contaminant.id;
        let location = || {
            Location::unit(cell, layer)
                .contaminant(c)
                .cohort(event.species, event.cohort)
        };
        let species = &registry.species()[event.species.index()];
        let burden = self.body_burden(c, event.species, event.cohort, cell, layer);
        let biomass = species.biomass(&self.inputs.biomass[(event.species, event.cohort, cell, layer)]);
        let rate = release_transfer(
            burden,
            event.amount_lost,
            biomass,
            contaminant.dissolved_release,
            self.inputs.dt,
            self.context.config.transfer_slack,
            location,
        )?;
        if rate == 0.0 {
            return Ok(());
        }
        let home_measure = self.context.home_measure(species, cell, layer);
        if contaminant.free_pool_tracer(event.habitat).is_none() || measure <= 0.0 || home_measure <= 0.0 {
            debug!(contaminant = %contaminant.name, %cell, layer, habitat = %event.habitat, "No free pool to release into");
            return Ok(());
        }
        let Some(slot) = registry.layout().slot(event.species, event.cohort) else {
            return Ok(());
        };
        self.ledger
            .cohort_mut(c, slot)
            .add_transfer(event.habitat, -rate);
        self.ledger
            .add_pool_gain(c, event.habitat, rate * home_measure / measure);
        self.summary.transfers += 1;
        Ok(())
    }

    fn evaluate_effects(
        &mut self,
        state: &mut EngineState,
        cell: CellId,
        layer: usize,
        habitat: Habitat,
    ) -> Result<(), EngineError> {
        let registry = self.context.registry;
        let config = self.context.config;
        let engine = EffectsEngine::new(config, registry);
        let temperature = self.inputs.temperature.get(cell, layer).unwrap_or(0.0);

        for (species_id, cohort) in registry.layout().iter() {
            let species = &registry.species()[species_id.index()];
            if species.home_habitat() != Some(habitat) {
                continue;
            }
            let sdt = self.species_dt[species_id.index()];
            if sdt <= 0.0 {
                // Not due this sub-step: keep the last multipliers, nobody dies.
                if let Some(effects) = state.effects.get_mut(species_id, cohort, cell, layer) {
                    effects.mortality = 0.0;
                }
                continue;
            }

            let burdens: Vec<f64> = registry
                .contaminants()
                .iter()
                .map(|ct| self.body_burden(ct.id, species_id, cohort, cell, layer))
                .collect();
            let effective = effective_burdens(
                registry,
                config.interaction_mode,
                config.amplify_only,
                species_id,
                &burdens,
            );
            let exposures: Vec<CohortExposure> = registry
                .contaminants()
                .iter()
                .zip(&effective)
                .map(|(ct, &burden)| CohortExposure {
                    ambient: self.pool_level(ct, habitat, cell, layer),
                    burden,
                })
                .collect();
            let mut histories: Vec<ExposureState> = state
                .exposure
                .iter()
                .map(|field| field[(species_id, cohort, cell, layer)])
                .collect();

            let inputs = EffectInputs {
                exposures: &exposures,
                temperature,
                time: self.inputs.time,
                dt: sdt,
            };
            let mut effects: CohortEffects = engine.evaluate(
                species_id,
                cohort,
                &inputs,
                &mut histories,
                Location::unit(cell, layer),
            )?;

            for (field, history) in state.exposure.iter_mut().zip(histories) {
                field[(species_id, cohort, cell, layer)] = history;
            }
            effects.reproduction = state.record_reproduction(species_id, cohort, effects.reproduction);
            state.effects[(species_id, cohort, cell, layer)] = effects;
        }
        Ok(())
    }

    fn commit_body_fluxes(&mut self, roc: &mut TracerField, cell: CellId, layer: usize) -> Result<(), EngineError> {
        let registry = self.context.registry;
        for contaminant in registry.contaminants() {
            for (species_id, cohort) in registry.layout().iter() {
                let (Some(slot), Some(tracer)) = (
                    registry.layout().slot(species_id, cohort),
                    registry.body_burden_tracer(contaminant.id, species_id, cohort),
                ) else {
                    continue;
                };
                let net = self.ledger.cohort(contaminant.id, slot).net();
                if net == 0.0 {
                    continue;
                }
                let net = ensure_finite("body-burden flux", net, || {
                    Location::unit(cell, layer)
                        .contaminant(contaminant.id)
                        .cohort(species_id, cohort)
                })?;
                roc.add(cell, layer, tracer, net);
            }
        }
        Ok(())
    }
}

fn validate_inputs(
    context: &SimulationContext,
    inputs: &SubstepInputs,
    tracers: &TracerField,
    roc: &TracerField,
) -> Result<(), EngineError> {
    context.check_tracer_field("tracers", tracers)?;
    context.check_tracer_field("rate of change", roc)?;
    context.check_cohort_field("cohort biomass", inputs.biomass)?;
    let grid = context.grid;
    let expected = (grid.num_cells(), grid.max_layers());
    if inputs.temperature.shape() != expected {
        let found = inputs.temperature.shape();
        return Err(EngineError::Dimension {
            what: "temperature",
            source: ShapeMismatch {
                expected: (expected.0, expected.1, 1),
                found: (found.0, found.1, 1),
            },
        });
    }
    if !(inputs.dt.is_finite() && inputs.dt >= 0.0) {
        return Err(EngineError::InvalidEvent {
            kind: "sub-step",
            reason: format!("length {}", inputs.dt),
            location: Location::default(),
        });
    }

    let layout = context.registry.layout();
    let place = |kind: &'static str, cell: CellId, layer: usize, habitat: Habitat| {
        let location = Location::unit(cell, layer);
        if layer >= grid.num_layers(cell) {
            return Err(EngineError::InvalidEvent {
                kind,
                reason: "outside the grid".to_string(),
                location,
            });
        }
        if !habitat.is_present(layer, grid.num_layers(cell)) {
            return Err(EngineError::InvalidEvent {
                kind,
                reason: format!("habitat {habitat} does not exist here"),
                location,
            });
        }
        Ok(())
    };
    for event in inputs.predation {
        place("predation", event.cell, event.layer, event.habitat)?;
        for (species, cohort) in [
            (event.predator, event.predator_cohort),
            (event.prey, event.prey_cohort),
        ] {
            if layout.slot(species, cohort).is_none() {
                return Err(EngineError::InvalidEvent {
                    kind: "predation",
                    reason: format!("unknown cohort {cohort} of {species}"),
                    location: Location::unit(event.cell, event.layer),
                });
            }
        }
        if !(event.amount_consumed.is_finite() && event.amount_consumed >= 0.0) {
            return Err(EngineError::InvalidEvent {
                kind: "predation",
                reason: format!("consumed amount {}", event.amount_consumed),
                location: Location::unit(event.cell, event.layer),
            });
        }
    }
    for event in inputs.losses {
        place("loss", event.cell, event.layer, event.habitat)?;
        if layout.slot(event.species, event.cohort).is_none() {
            return Err(EngineError::InvalidEvent {
                kind: "loss",
                reason: format!("unknown cohort {} of {}", event.cohort, event.species),
                location: Location::unit(event.cell, event.layer),
            });
        }
        if !(event.amount_lost.is_finite() && event.amount_lost >= 0.0) {
            return Err(EngineError::InvalidEvent {
                kind: "loss",
                reason: format!("lost amount {}", event.amount_lost),
                location: Location::unit(event.cell, event.layer),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::contaminant::params::{ContaminantParams, FreePoolTracers};
    use crate::core::contaminant::registry::ContaminantRegistry;
    use crate::core::kinetics::uptake::UptakeKinetics;
    use crate::core::models::grid::{CellGeometry, SpatialGrid};
    use crate::core::models::ids::TracerId;
    use crate::core::models::species::{Species, UpdateCadence};
    use crate::engine::config::{EngineConfig, MortalityModel};
    use crate::engine::fixtures;
    use crate::engine::progress::ProgressReporter;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    struct Harness {
        registry: ContaminantRegistry,
        grid: SpatialGrid,
        config: EngineConfig,
        temperature: LayerField,
        biomass: CohortField<CohortTracers>,
    }

    impl Harness {
        fn new(registry: ContaminantRegistry, grid: SpatialGrid, config: EngineConfig) -> Self {
            let temperature = LayerField::filled(grid.num_cells(), grid.max_layers(), 10.0);
            let biomass = CohortField::new(
                registry.layout().clone(),
                grid.num_cells(),
                grid.max_layers(),
                CohortTracers {
                    pool: 1.0,
                    ..Default::default()
                },
            );
            Self {
                registry,
                grid,
                config,
                temperature,
                biomass,
            }
        }

        fn tracers(&self) -> TracerField {
            let (cells, layers, tracers) = (
                self.grid.num_cells(),
                self.grid.max_layers(),
                self.registry.tracer_count(),
            );
            TracerField::zeros(cells, layers, tracers)
        }

        fn body(&self, species: usize) -> TracerId {
            self.registry
                .body_burden_tracer(ContaminantId(0), SpeciesId(species), 0)
                .unwrap()
        }

        fn inputs<'i>(
            &'i self,
            predation: &'i [PredationEvent],
            losses: &'i [LossEvent],
        ) -> SubstepInputs<'i> {
            SubstepInputs {
                time: 0.0,
                dt: 1.0,
                first_substep_of_tick: true,
                temperature: &self.temperature,
                biomass: &self.biomass,
                predation,
                losses,
            }
        }
    }

    fn pelagic(names: &[&str], kinetics: UptakeKinetics, rate: f64) -> (Vec<Species>, ContaminantParams) {
        let species = names
            .iter()
            .map(|n| fixtures::species(n, 1, vec![Habitat::WaterColumn]))
            .collect();
        let tracked: Vec<_> = names
            .iter()
            .map(|n| (*n, fixtures::coefficients(kinetics, rate)))
            .collect();
        let contaminant = fixtures::contaminant("Oil", fixtures::water_pool(0), &tracked);
        (species, contaminant)
    }

    fn threshold_config() -> EngineConfig {
        fixtures::config(MortalityModel::ThresholdLogistic).build().unwrap()
    }

    #[test]
    fn linear_uptake_moves_mass_from_pool_into_body() {
        let (species, contaminant) = pelagic(&["Herring"], UptakeKinetics::LinearSaturating, 0.1);
        let harness = Harness::new(
            fixtures::registry(species, vec![contaminant]),
            fixtures::row_grid(1, 1),
            threshold_config(),
        );
        let reporter = ProgressReporter::new();
        let context = SimulationContext::new(&harness.registry, &harness.grid, &harness.config, &reporter);
        let mut state = EngineState::new(&context);
        let mut tracers = harness.tracers();
        tracers[(CellId(0), 0, TracerId(0))] = 50.0;
        tracers[(CellId(0), 0, harness.body(0))] = 20.0;
        let mut roc = harness.tracers();

        let summary = run_substep(&context, &mut state, &harness.inputs(&[], &[]), &tracers, &mut roc).unwrap();

        assert_eq!(summary.units, 1);
        assert_eq!(summary.reconciled_pools, 0);
        assert!(f64_approx_equal(roc[(CellId(0), 0, TracerId(0))], -3.0));
        assert!(f64_approx_equal(roc[(CellId(0), 0, harness.body(0))], 3.0));
        let exposure = state.exposure(ContaminantId(0), SpeciesId(0), 0, CellId(0), 0).unwrap();
        assert_eq!(exposure.onset, Some(0.0));
        assert_eq!(state.substeps(), 1);
    }

    #[test]
    fn competing_uptake_is_prorated_after_decay() {
        let (species, mut contaminant) =
            pelagic(&["Herring", "Sprat"], UptakeKinetics::LinearSaturating, 0.5);
        // One day at this half-life removes 2 of 10.
        contaminant.half_life = 0.5f64.ln() / 0.8f64.ln();
        let harness = Harness::new(
            fixtures::registry(species, vec![contaminant]),
            fixtures::row_grid(1, 1),
            threshold_config(),
        );
        let reporter = ProgressReporter::new();
        let context = SimulationContext::new(&harness.registry, &harness.grid, &harness.config, &reporter);
        let mut state = EngineState::new(&context);
        let mut tracers = harness.tracers();
        tracers[(CellId(0), 0, TracerId(0))] = 10.0;
        let mut roc = harness.tracers();

        let summary = run_substep(&context, &mut state, &harness.inputs(&[], &[]), &tracers, &mut roc).unwrap();

        assert_eq!(summary.reconciled_pools, 1);
        assert!(f64_approx_equal(roc[(CellId(0), 0, harness.body(0))], 4.0));
        assert!(f64_approx_equal(roc[(CellId(0), 0, harness.body(1))], 4.0));
        assert!(f64_approx_equal(roc[(CellId(0), 0, TracerId(0))], -10.0));
    }

    #[test]
    fn predation_carries_burden_from_prey_to_predator() {
        let (species, contaminant) = pelagic(&["Cod", "Herring"], UptakeKinetics::LinearSaturating, 0.0);
        let config = fixtures::config(MortalityModel::ThresholdLogistic)
            .track_proportion(true)
            .build()
            .unwrap();
        let harness = Harness::new(
            fixtures::registry(species, vec![contaminant]),
            fixtures::row_grid(1, 1),
            config,
        );
        let reporter = ProgressReporter::new();
        let context = SimulationContext::new(&harness.registry, &harness.grid, &harness.config, &reporter);
        let mut state = EngineState::new(&context);
        let mut tracers = harness.tracers();
        tracers[(CellId(0), 0, harness.body(1))] = 4.0;
        let mut roc = harness.tracers();
        let predation = [PredationEvent {
            predator: SpeciesId(0),
            predator_cohort: 0,
            prey: SpeciesId(1),
            prey_cohort: 0,
            amount_consumed: 0.5,
            habitat: Habitat::WaterColumn,
            cell: CellId(0),
            layer: 0,
        }];

        let summary =
            run_substep(&context, &mut state, &harness.inputs(&predation, &[]), &tracers, &mut roc).unwrap();

        assert_eq!(summary.transfers, 1);
        assert!(f64_approx_equal(roc[(CellId(0), 0, harness.body(1))], -2.0));
        assert!(f64_approx_equal(roc[(CellId(0), 0, harness.body(0))], 2.0));
        let p = state
            .exposure(ContaminantId(0), SpeciesId(0), 0, CellId(0), 0)
            .unwrap()
            .proportion;
        assert!(p > 0.0 && p <= 1.0);
    }

    fn herring_eaten_by_cod(habitat: Habitat, amount_consumed: f64) -> PredationEvent {
        PredationEvent {
            predator: SpeciesId(0),
            predator_cohort: 0,
            prey: SpeciesId(1),
            prey_cohort: 0,
            amount_consumed,
            habitat,
            cell: CellId(0),
            layer: 0,
        }
    }

    #[test]
    fn predation_in_a_habitat_without_free_pool_still_transfers() {
        // Oil only has a water-column pool; the meal happens on the sea floor.
        let (species, contaminant) = pelagic(&["Cod", "Herring"], UptakeKinetics::LinearSaturating, 0.0);
        let harness = Harness::new(
            fixtures::registry(species, vec![contaminant]),
            fixtures::row_grid(1, 1),
            threshold_config(),
        );
        let reporter = ProgressReporter::new();
        let context = SimulationContext::new(&harness.registry, &harness.grid, &harness.config, &reporter);
        let mut state = EngineState::new(&context);
        let mut tracers = harness.tracers();
        tracers[(CellId(0), 0, harness.body(1))] = 4.0;
        let mut roc = harness.tracers();
        let predation = [herring_eaten_by_cod(Habitat::Sediment, 0.5)];

        let summary =
            run_substep(&context, &mut state, &harness.inputs(&predation, &[]), &tracers, &mut roc).unwrap();

        assert_eq!(summary.transfers, 1);
        assert!((roc[(CellId(0), 0, harness.body(1))] + 2.0).abs() < 1e-6);
        assert!((roc[(CellId(0), 0, harness.body(0))] - 2.0).abs() < 1e-6);
        assert_eq!(roc[(CellId(0), 0, TracerId(0))], 0.0);
    }

    #[test]
    fn predation_starts_the_exposure_clock_of_the_predator() {
        let (species, contaminant) = pelagic(&["Cod", "Herring"], UptakeKinetics::LinearSaturating, 0.0);
        let harness = Harness::new(
            fixtures::registry(species, vec![contaminant]),
            fixtures::row_grid(1, 1),
            threshold_config(),
        );
        let reporter = ProgressReporter::new();
        let context = SimulationContext::new(&harness.registry, &harness.grid, &harness.config, &reporter);
        let mut state = EngineState::new(&context);
        let mut tracers = harness.tracers();
        tracers[(CellId(0), 0, harness.body(1))] = 4.0;
        let mut roc = harness.tracers();
        let predation = [herring_eaten_by_cod(Habitat::WaterColumn, 0.5)];
        let mut inputs = harness.inputs(&predation, &[]);
        inputs.time = 3.0;

        run_substep(&context, &mut state, &inputs, &tracers, &mut roc).unwrap();

        let cod = state.exposure(ContaminantId(0), SpeciesId(0), 0, CellId(0), 0).unwrap();
        assert_eq!(cod.onset, Some(3.0));
        assert_eq!(cod.elapsed(5.0), 2.0);
        let herring = state.exposure(ContaminantId(0), SpeciesId(1), 0, CellId(0), 0).unwrap();
        assert_eq!(herring.onset, None);
    }

    #[test]
    fn consumption_bound_follows_the_substep_length() {
        let (species, contaminant) = pelagic(&["Cod", "Herring"], UptakeKinetics::LinearSaturating, 0.0);
        let harness = Harness::new(
            fixtures::registry(species, vec![contaminant]),
            fixtures::row_grid(1, 1),
            threshold_config(),
        );
        let reporter = ProgressReporter::new();
        let context = SimulationContext::new(&harness.registry, &harness.grid, &harness.config, &reporter);
        let mut state = EngineState::new(&context);
        let mut tracers = harness.tracers();
        tracers[(CellId(0), 0, harness.body(1))] = 4.0;

        // Twice the prey biomass per day, for a tenth of a day: 20% is eaten.
        let predation = [herring_eaten_by_cod(Habitat::WaterColumn, 2.0)];
        let mut short = harness.inputs(&predation, &[]);
        short.dt = 0.1;
        let mut roc = harness.tracers();
        run_substep(&context, &mut state, &short, &tracers, &mut roc).unwrap();
        let prey_rate = roc[(CellId(0), 0, harness.body(1))];
        assert!((prey_rate + 8.0).abs() < 1e-6);
        assert!((prey_rate * short.dt + 0.8).abs() < 1e-6);
        assert!((roc[(CellId(0), 0, harness.body(0))] - 8.0).abs() < 1e-6);

        // 15% of the biomass per day over ten days eats more prey than there is.
        let predation = [herring_eaten_by_cod(Habitat::WaterColumn, 0.15)];
        let mut long = harness.inputs(&predation, &[]);
        long.dt = 10.0;
        let mut roc = harness.tracers();
        let err = run_substep(&context, &mut state, &long, &tracers, &mut roc).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ProportionViolation { quantity: "consumption", .. }
        ));
    }

    #[test]
    fn loss_without_a_pool_to_release_into_keeps_the_burden() {
        let (species, mut contaminant) = pelagic(&["Herring"], UptakeKinetics::LinearSaturating, 0.0);
        contaminant.dissolved_release = 0.5;
        let harness = Harness::new(
            fixtures::registry(species, vec![contaminant]),
            fixtures::row_grid(1, 1),
            threshold_config(),
        );
        let reporter = ProgressReporter::new();
        let context = SimulationContext::new(&harness.registry, &harness.grid, &harness.config, &reporter);
        let mut state = EngineState::new(&context);
        let mut tracers = harness.tracers();
        tracers[(CellId(0), 0, harness.body(0))] = 8.0;
        let mut roc = harness.tracers();
        let losses = [LossEvent {
            species: SpeciesId(0),
            cohort: 0,
            amount_lost: 0.25,
            habitat: Habitat::Sediment,
            cell: CellId(0),
            layer: 0,
        }];

        let summary =
            run_substep(&context, &mut state, &harness.inputs(&[], &losses), &tracers, &mut roc).unwrap();

        assert_eq!(summary.transfers, 0);
        assert!(roc[(CellId(0), 0, harness.body(0))].abs() < 1e-6);
        assert_eq!(roc[(CellId(0), 0, TracerId(0))], 0.0);
    }

    #[test]
    fn loss_releases_a_fraction_of_the_burden_into_the_pool() {
        let (species, mut contaminant) = pelagic(&["Herring"], UptakeKinetics::LinearSaturating, 0.0);
        contaminant.dissolved_release = 0.5;
        let harness = Harness::new(
            fixtures::registry(species, vec![contaminant]),
            fixtures::row_grid(1, 1),
            threshold_config(),
        );
        let reporter = ProgressReporter::new();
        let context = SimulationContext::new(&harness.registry, &harness.grid, &harness.config, &reporter);
        let mut state = EngineState::new(&context);
        let mut tracers = harness.tracers();
        tracers[(CellId(0), 0, harness.body(0))] = 8.0;
        let mut roc = harness.tracers();
        let losses = [LossEvent {
            species: SpeciesId(0),
            cohort: 0,
            amount_lost: 0.25,
            habitat: Habitat::WaterColumn,
            cell: CellId(0),
            layer: 0,
        }];

        run_substep(&context, &mut state, &harness.inputs(&[], &losses), &tracers, &mut roc).unwrap();

        assert!(f64_approx_equal(roc[(CellId(0), 0, harness.body(0))], -1.0));
        assert!(f64_approx_equal(roc[(CellId(0), 0, TracerId(0))], 1.0));
    }

    #[test]
    fn uptake_across_compartments_of_different_volume_conserves_mass() {
        let species = vec![fixtures::species(
            "Plaice",
            1,
            vec![Habitat::Sediment, Habitat::WaterColumn],
        )];
        let contaminant = fixtures::contaminant(
            "Oil",
            FreePoolTracers {
                water_column: Some(TracerId(0)),
                sediment: Some(TracerId(1)),
                ..Default::default()
            },
            &[(
                "Plaice",
                fixtures::coefficients(UptakeKinetics::FlatLinear, 0.1),
            )],
        );
        let grid = SpatialGrid::new(vec![CellGeometry {
            area: 1.0,
            layer_thickness: vec![2.0],
            sediment_thickness: 1.0,
            neighbors: Vec::new(),
        }])
        .unwrap();
        let harness = Harness::new(fixtures::registry(species, vec![contaminant]), grid, threshold_config());
        let reporter = ProgressReporter::new();
        let context = SimulationContext::new(&harness.registry, &harness.grid, &harness.config, &reporter);
        let mut state = EngineState::new(&context);
        let mut tracers = harness.tracers();
        tracers[(CellId(0), 0, TracerId(0))] = 10.0;
        let mut roc = harness.tracers();

        run_substep(&context, &mut state, &harness.inputs(&[], &[]), &tracers, &mut roc).unwrap();

        let water = roc[(CellId(0), 0, TracerId(0))];
        let body = roc[(CellId(0), 0, harness.body(0))];
        assert!(f64_approx_equal(body, 1.0));
        assert!(f64_approx_equal(water, -0.5));
        assert!(f64_approx_equal(water * 2.0 + body * 1.0, 0.0));
    }

    #[test]
    fn species_off_cadence_keep_multipliers_but_suffer_no_mortality() {
        let mut species = fixtures::species("Seal", 1, vec![Habitat::WaterColumn]);
        species.cadence = UpdateCadence::OncePerTick;
        let contaminant = fixtures::contaminant(
            "Oil",
            fixtures::water_pool(0),
            &[("Seal", fixtures::coefficients(UptakeKinetics::LinearSaturating, 0.1))],
        );
        let harness = Harness::new(
            fixtures::registry(vec![species], vec![contaminant]),
            fixtures::row_grid(1, 1),
            threshold_config(),
        );
        let reporter = ProgressReporter::new();
        let context = SimulationContext::new(&harness.registry, &harness.grid, &harness.config, &reporter);
        let mut state = EngineState::new(&context);
        state.effects[(SpeciesId(0), 0, CellId(0), 0)] = CohortEffects {
            growth: 0.5,
            mortality: 0.3,
            ..CohortEffects::NEUTRAL
        };
        let mut tracers = harness.tracers();
        tracers[(CellId(0), 0, TracerId(0))] = 50.0;
        let mut roc = harness.tracers();
        let mut inputs = harness.inputs(&[], &[]);
        inputs.first_substep_of_tick = false;

        run_substep(&context, &mut state, &inputs, &tracers, &mut roc).unwrap();

        assert!(roc.values().iter().all(|&v| v == 0.0));
        let effects = state.effects(SpeciesId(0), 0, CellId(0), 0).unwrap();
        assert!(f64_approx_equal(effects.growth, 0.5));
        assert_eq!(effects.mortality, 0.0);
    }

    #[test]
    fn events_outside_the_grid_are_rejected() {
        let (species, contaminant) = pelagic(&["Herring"], UptakeKinetics::LinearSaturating, 0.1);
        let harness = Harness::new(
            fixtures::registry(species, vec![contaminant]),
            fixtures::row_grid(1, 2),
            threshold_config(),
        );
        let reporter = ProgressReporter::new();
        let context = SimulationContext::new(&harness.registry, &harness.grid, &harness.config, &reporter);
        let mut state = EngineState::new(&context);
        let tracers = harness.tracers();
        let mut roc = harness.tracers();

        let outside = [LossEvent {
            species: SpeciesId(0),
            cohort: 0,
            amount_lost: 0.1,
            habitat: Habitat::WaterColumn,
            cell: CellId(0),
            layer: 5,
        }];
        let err = run_substep(&context, &mut state, &harness.inputs(&[], &outside), &tracers, &mut roc)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidEvent { kind: "loss", .. }));

        // Sediment only exists under the bottom layer.
        let misplaced = [LossEvent {
            habitat: Habitat::Sediment,
            layer: 0,
            ..outside[0]
        }];
        let err = run_substep(&context, &mut state, &harness.inputs(&[], &misplaced), &tracers, &mut roc)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidEvent { .. }));
        assert_eq!(state.substeps(), 0);
    }

    #[test]
    fn close_substep_audits_on_the_configured_interval() {
        let (species, contaminant) = pelagic(&["Herring"], UptakeKinetics::LinearSaturating, 0.1);
        let config = fixtures::config(MortalityModel::ThresholdLogistic)
            .audit_interval(2)
            .build()
            .unwrap();
        let harness = Harness::new(
            fixtures::registry(species, vec![contaminant]),
            fixtures::row_grid(1, 1),
            config,
        );
        let reporter = ProgressReporter::new();
        let context = SimulationContext::new(&harness.registry, &harness.grid, &harness.config, &reporter);
        let mut state = EngineState::new(&context);
        let mut ledger = MassLedger::new(1);
        let mut tracers = harness.tracers();
        tracers[(CellId(0), 0, TracerId(0))] = 50.0;
        ledger.record_input(ContaminantId(0), 50.0).unwrap();

        let mut audits = Vec::new();
        for _ in 0..2 {
            let mut roc = harness.tracers();
            run_substep(&context, &mut state, &harness.inputs(&[], &[]), &tracers, &mut roc).unwrap();
            tracers.add_scaled(&roc, 1.0).unwrap();
            let close = close_substep(&context, &mut state, &ledger, &tracers, 0.0, None).unwrap();
            audits.push(close.audit);
        }

        assert!(audits[0].is_none());
        let audit = audits[1].as_ref().unwrap();
        assert!(f64_approx_equal(audit.rows[0].ratio, 1.0));
        assert!(audit.rows[0].body_burden > 0.0);
    }
}
