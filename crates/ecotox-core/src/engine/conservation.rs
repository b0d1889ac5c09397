use super::context::SimulationContext;
use super::error::EngineError;
use crate::core::models::field::TracerField;
use crate::core::models::ids::{CellId, ContaminantId};
use serde::Serialize;
use tracing::{debug, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Absolute mass that still counts as "nothing" when no input was ever recorded.
pub const ZERO_INPUT_EPSILON: f64 = 1e-9;

/// Cumulative forced input of every contaminant.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MassLedger {
    inputs: Vec<f64>,
}

impl MassLedger {
    pub fn new(num_contaminants: usize) -> Self {
        Self {
            inputs: vec![0.0; num_contaminants],
        }
    }

    /// Declares `mass` as introduced into the domain; negative or non-finite input is rejected.
    pub fn record_input(&mut self, contaminant: ContaminantId, mass: f64) -> Result<(), EngineError> {
        if !(mass.is_finite() && mass >= 0.0) {
            return Err(EngineError::Internal(format!(
                "forced input for {contaminant} must be finite and non-negative, got {mass}"
            )));
        }
        let slot = self.inputs.get_mut(contaminant.index()).ok_or_else(|| {
            EngineError::Internal(format!("forced input recorded for unknown {contaminant}"))
        })?;
        *slot += mass;
        Ok(())
    }

    pub fn input(&self, contaminant: ContaminantId) -> f64 {
        self.inputs.get(contaminant.index()).copied().unwrap_or(0.0)
    }
}

/// Domain mass of one contaminant, split by where it sits.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DomainMass {
    pub free_pool: f64,
    pub body_burden: f64,
}

impl DomainMass {
    pub fn total(&self) -> f64 {
        self.free_pool + self.body_burden
    }
}

/// One row of an audit report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ContaminantAudit {
    pub substep: u64,
    pub time: f64,
    pub contaminant: String,
    pub free_pool: f64,
    pub body_burden: f64,
    pub total: f64,
    pub input: f64,
    /// `total / input`, or 0 with no input.
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MassAudit {
    pub rows: Vec<ContaminantAudit>,
}

impl MassAudit {
    pub fn worst_ratio(&self) -> f64 {
        self.rows.iter().map(|r| r.ratio).fold(0.0, f64::max)
    }
}

/// Free-pool and body-burden mass of every contaminant over the whole domain.
pub fn domain_mass(
    context: &SimulationContext,
    tracers: &TracerField,
) -> Result<Vec<DomainMass>, EngineError> {
    context.check_tracer_field("tracers", tracers)?;
    let count = context.registry.contaminants().len();
    let cells: Vec<CellId> = context.grid.cell_ids().collect();

    #[cfg(not(feature = "parallel"))]
    let iterator = cells.iter();

    #[cfg(feature = "parallel")]
    let iterator = cells.par_iter();

    let per_cell: Vec<Vec<DomainMass>> = iterator
        .map(|&cell| cell_mass(context, tracers, cell))
        .collect();

    let mut totals = vec![DomainMass::default(); count];
    for part in per_cell {
        for (total, mass) in totals.iter_mut().zip(part) {
            total.free_pool += mass.free_pool;
            total.body_burden += mass.body_burden;
        }
    }
    Ok(totals)
}

fn cell_mass(context: &SimulationContext, tracers: &TracerField, cell: CellId) -> Vec<DomainMass> {
    let registry = context.registry;
    let grid = context.grid;
    let mut masses = vec![DomainMass::default(); registry.contaminants().len()];
    for layer in 0..grid.num_layers(cell) {
        for (contaminant, mass) in registry.contaminants().iter().zip(masses.iter_mut()) {
            for habitat in grid.habitats_at(cell, layer) {
                if let Some(tracer) = contaminant.free_pool_tracer(habitat) {
                    let level = tracers.get(cell, layer, tracer).unwrap_or(0.0);
                    mass.free_pool += level * grid.measure(cell, layer, habitat);
                }
            }
            for (species_id, cohort) in registry.layout().iter() {
                let Some(species) = registry.species_by_id(species_id) else {
                    continue;
                };
                let Some(tracer) = registry.body_burden_tracer(contaminant.id, species_id, cohort)
                else {
                    continue;
                };
                let level = tracers.get(cell, layer, tracer).unwrap_or(0.0);
                mass.body_burden += level * context.home_measure(species, cell, layer);
            }
        }
    }
    masses
}

/// Checks domain mass against forced input; fails on the first contaminant over budget.
#[instrument(skip_all, name = "conservation_audit", fields(substep = substep))]
pub fn audit(
    context: &SimulationContext,
    ledger: &MassLedger,
    tracers: &TracerField,
    substep: u64,
    time: f64,
) -> Result<MassAudit, EngineError> {
    let tolerance = context.config.conservation_tolerance;
    let masses = domain_mass(context, tracers)?;
    let mut report = MassAudit::default();
    for (contaminant, mass) in context.registry.contaminants().iter().zip(masses) {
        let input = ledger.input(contaminant.id);
        let total = mass.total();
        let exceeded = if input > 0.0 {
            total > input * (1.0 + tolerance)
        } else {
            total > ZERO_INPUT_EPSILON
        };
        if exceeded || !total.is_finite() {
            return Err(EngineError::MassBudgetExceeded {
                contaminant: contaminant.id,
                name: contaminant.name.clone(),
                total,
                input,
                tolerance,
            });
        }
        let ratio = if input > 0.0 { total / input } else { 0.0 };
        debug!(contaminant = %contaminant.name, total, input, ratio, "Mass audit");
        report.rows.push(ContaminantAudit {
            substep,
            time,
            contaminant: contaminant.name.clone(),
            free_pool: mass.free_pool,
            body_burden: mass.body_burden,
            total,
            input,
            ratio,
        });
    }
    Ok(report)
}
