use super::config::EngineConfig;
use super::error::EngineError;
use super::progress::ProgressReporter;
use crate::core::contaminant::registry::ContaminantRegistry;
use crate::core::models::field::{CohortField, ShapeMismatch, TracerField};
use crate::core::models::ids::{CellId, ContaminantId, SpeciesId};
use crate::core::models::species::Species;
use crate::core::models::grid::SpatialGrid;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Read-only collaborators every engine component needs.
#[derive(Clone, Copy)]
pub struct SimulationContext<'a> {
    pub registry: &'a ContaminantRegistry,
    pub grid: &'a SpatialGrid,
    pub config: &'a EngineConfig,
    pub reporter: &'a ProgressReporter<'a>,
}

impl<'a> SimulationContext<'a> {
    pub fn new(
        registry: &'a ContaminantRegistry,
        grid: &'a SpatialGrid,
        config: &'a EngineConfig,
        reporter: &'a ProgressReporter<'a>,
    ) -> Self {
        Self {
            registry,
            grid,
            config,
            reporter,
        }
    }

    /// Shape every tracer and rate-of-change field must have.
    pub fn tracer_shape(&self) -> (usize, usize, usize) {
        (
            self.grid.num_cells(),
            self.grid.max_layers(),
            self.registry.tracer_count(),
        )
    }

    pub fn check_tracer_field(&self, what: &'static str, field: &TracerField) -> Result<(), EngineError> {
        let expected = self.tracer_shape();
        if field.shape() == expected {
            Ok(())
        } else {
            Err(EngineError::Dimension {
                what,
                source: ShapeMismatch {
                    expected,
                    found: field.shape(),
                },
            })
        }
    }

    pub fn check_cohort_field<T>(&self, what: &'static str, field: &CohortField<T>) -> Result<(), EngineError> {
        let expected = (
            self.registry.layout().num_slots(),
            self.grid.num_cells(),
            self.grid.max_layers(),
        );
        let found = (
            field.layout().num_slots(),
            field.num_cells(),
            field.num_layers(),
        );
        if field.layout() == self.registry.layout() && found == expected {
            Ok(())
        } else {
            Err(EngineError::Dimension {
                what,
                source: ShapeMismatch { expected, found },
            })
        }
    }

    /// Measure of the compartment a species' body burden is expressed in.
    #[inline]
    pub fn home_measure(&self, species: &Species, cell: CellId, layer: usize) -> f64 {
        species
            .home_habitat()
            .map_or(0.0, |h| self.grid.measure(cell, layer, h))
    }
}

/// Persistent exposure history of one cohort to one contaminant in one cell and layer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExposureState {
    /// Chronic lethal point, in `[0, 1]`; never decreases.
    pub lethal_point: f64,
    pub max_dose: f64,
    pub onset: Option<f64>,
    /// Fraction of the cohort that carries the contaminant, in `[0, 1]`.
    pub proportion: f64,
}

impl ExposureState {
    pub fn elapsed(&self, time: f64) -> f64 {
        self.onset.map_or(0.0, |t0| (time - t0).max(0.0))
    }

    /// Starts the exposure clock at `time` unless it is already running.
    pub fn mark_onset(&mut self, time: f64) {
        self.onset.get_or_insert(time);
    }
}

/// Multipliers and mortality handed back to the food-web model for one cohort.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CohortEffects {
    pub growth: f64,
    pub reproduction: f64,
    pub movement: f64,
    pub avoidance: f64,
    /// Fraction of the cohort killed during the sub-step.
    pub mortality: f64,
}

impl CohortEffects {
    pub const NEUTRAL: Self = Self {
        growth: 1.0,
        reproduction: 1.0,
        movement: 1.0,
        avoidance: 1.0,
        mortality: 0.0,
    };
}

impl Default for CohortEffects {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Mutable engine state that outlives a single sub-step.
#[derive(Debug, Clone)]
pub struct EngineState {
    pub(crate) exposure: Vec<CohortField<ExposureState>>,
    pub(crate) effects: CohortField<CohortEffects>,
    reproduction_history: Vec<f64>,
    pub(crate) rng: StdRng,
    substeps: u64,
}

impl EngineState {
    pub fn new(context: &SimulationContext) -> Self {
        let layout = context.registry.layout().clone();
        let (cells, layers) = (context.grid.num_cells(), context.grid.max_layers());
        let exposure = context
            .registry
            .contaminants()
            .iter()
            .map(|_| CohortField::new(layout.clone(), cells, layers, ExposureState::default()))
            .collect();
        Self {
            exposure,
            effects: CohortField::new(layout.clone(), cells, layers, CohortEffects::NEUTRAL),
            reproduction_history: vec![1.0; layout.num_slots()],
            rng: StdRng::seed_from_u64(context.config.seed),
            substeps: 0,
        }
    }

    pub fn exposure(
        &self,
        contaminant: ContaminantId,
        species: SpeciesId,
        cohort: usize,
        cell: CellId,
        layer: usize,
    ) -> Option<&ExposureState> {
        self.exposure
            .get(contaminant.index())?
            .get(species, cohort, cell, layer)
    }

    pub fn exposure_mut(
        &mut self,
        contaminant: ContaminantId,
        species: SpeciesId,
        cohort: usize,
        cell: CellId,
        layer: usize,
    ) -> Option<&mut ExposureState> {
        self.exposure
            .get_mut(contaminant.index())?
            .get_mut(species, cohort, cell, layer)
    }

    pub fn effects(
        &self,
        species: SpeciesId,
        cohort: usize,
        cell: CellId,
        layer: usize,
    ) -> Option<&CohortEffects> {
        self.effects.get(species, cohort, cell, layer)
    }

    pub fn effects_field(&self) -> &CohortField<CohortEffects> {
        &self.effects
    }

    /// Historic minimum of the reproduction multiplier of a cohort.
    pub fn reproduction_history(&self, species: SpeciesId, cohort: usize) -> f64 {
        self.effects
            .layout()
            .slot(species, cohort)
            .map_or(1.0, |slot| self.reproduction_history[slot])
    }

    /// Folds `value` into the running minimum and returns the new minimum.
    pub(crate) fn record_reproduction(&mut self, species: SpeciesId, cohort: usize, value: f64) -> f64 {
        match self.effects.layout().slot(species, cohort) {
            Some(slot) => {
                let entry = &mut self.reproduction_history[slot];
                *entry = entry.min(value);
                *entry
            }
            None => value,
        }
    }

    /// Starts a new reproduction window, e.g. at the beginning of a spawning season.
    pub fn reset_reproduction_history(&mut self) {
        self.reproduction_history.fill(1.0);
    }

    pub fn substeps(&self) -> u64 {
        self.substeps
    }

    pub(crate) fn advance_substep(&mut self) -> u64 {
        self.substeps += 1;
        self.substeps
    }
}
