use super::config::{EngineConfig, MortalityModel};
use super::context::{CohortEffects, ExposureState};
use super::error::{EngineError, Location, ensure_finite};
use crate::core::contaminant::registry::{ContaminantRegistry, SpeciesCoefficients};
use crate::core::kinetics::dose_response::{
    DoseCurve, GrowthEffect, acute_survival, avoidance_factor, exposure_time_factor,
    hill_suppression, lethal_rate, logistic_suppression, q10_factor,
};
use crate::core::models::ids::SpeciesId;
use crate::core::models::species::{GroupKind, Species};

/// Survivor products may exceed 1 by rounding only.
const SURVIVOR_ROUNDING: f64 = 1e-12;

/// What one cohort is exposed to for one contaminant.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CohortExposure {
    /// Free-pool concentration in the species' home habitat.
    pub ambient: f64,
    /// Tissue concentration after interaction amplification.
    pub burden: f64,
}

/// Per-cohort inputs of one evaluation; `exposures` is indexed by contaminant.
#[derive(Debug, Clone, Copy)]
pub struct EffectInputs<'e> {
    pub exposures: &'e [CohortExposure],
    pub temperature: f64,
    pub time: f64,
    pub dt: f64,
}

pub struct EffectsEngine<'a> {
    config: &'a EngineConfig,
    registry: &'a ContaminantRegistry,
}

impl<'a> EffectsEngine<'a> {
    pub fn new(config: &'a EngineConfig, registry: &'a ContaminantRegistry) -> Self {
        Self { config, registry }
    }

    /// Computes the effect multipliers and the mortality increment of one cohort.
    ///
    /// `states` holds the cohort's exposure history, one entry per contaminant, and is
    /// updated in place (the chronic lethal point only ever advances). The returned
    /// reproduction multiplier is the instantaneous one; folding it into the historic
    /// minimum is left to the caller.
    pub fn evaluate(
        &self,
        species_id: SpeciesId,
        cohort: usize,
        inputs: &EffectInputs,
        states: &mut [ExposureState],
        location: Location,
    ) -> Result<CohortEffects, EngineError> {
        let species = self.registry.species_by_id(species_id).ok_or_else(|| {
            EngineError::Internal(format!("effects requested for unknown {species_id}"))
        })?;
        let count = self.registry.contaminants().len();
        if inputs.exposures.len() != count || states.len() != count {
            return Err(EngineError::Internal(format!(
                "expected {count} exposure entries, got {} inputs and {} states",
                inputs.exposures.len(),
                states.len()
            )));
        }

        let mature = species.is_mature(cohort);
        let mut effects = CohortEffects::NEUTRAL;
        let mut lethal_rate_sum = 0.0;
        let mut survivors = 1.0;
        let mut chronic = 0.0;

        for ((contaminant, exposure), state) in self
            .registry
            .contaminants()
            .iter()
            .zip(inputs.exposures)
            .zip(states.iter_mut())
        {
            let Some(coefficients) = contaminant.coefficients(species_id) else {
                continue;
            };
            let p = if self.config.track_proportion {
                state.proportion.clamp(0.0, 1.0)
            } else {
                1.0
            };
            let weigh = |m: f64| 1.0 - p * (1.0 - m);
            let burden = exposure.burden.max(0.0);

            effects.growth *= weigh(growth_multiplier(species.kind, coefficients, burden));
            if mature {
                effects.reproduction = effects
                    .reproduction
                    .min(weigh(reproduction_multiplier(coefficients, burden)));
            }
            effects.movement *= weigh(movement_multiplier(coefficients, burden));
            if let Some(avoidance) = &coefficients.avoidance {
                effects.avoidance *= avoidance_factor(exposure.ambient, avoidance);
            }

            match self.config.mortality_model {
                MortalityModel::ThresholdLogistic if p > 0.0 => {
                    lethal_rate_sum += p * self.threshold_mortality_rate(
                        species,
                        coefficients,
                        exposure,
                        state,
                        inputs,
                    );
                }
                MortalityModel::ThresholdLogistic => {}
                MortalityModel::InVitro => {
                    survivors *= weigh(acute_survival(
                        exposure.ambient,
                        coefficients.lc50,
                        coefficients.lc100,
                        coefficients.slope,
                        coefficients.time_to_lc50,
                        inputs.dt,
                    ));
                    chronic +=
                        p * advance_lethal_point(&contaminant.dose_curve, coefficients, burden, state);
                }
            }
        }

        effects.mortality = match self.config.mortality_model {
            MortalityModel::ThresholdLogistic => (lethal_rate_sum * inputs.dt).clamp(0.0, 1.0),
            MortalityModel::InVitro => {
                if !survivors.is_finite() || survivors > 1.0 + SURVIVOR_ROUNDING {
                    return Err(EngineError::SurvivorProduct {
                        value: survivors,
                        location: location.cohort(species_id, cohort),
                    });
                }
                ((1.0 - survivors) + chronic).clamp(0.0, 1.0)
            }
        };
        effects.growth = effects.growth.max(0.0);
        effects.reproduction = effects.reproduction.clamp(0.0, 1.0);
        effects.movement = effects.movement.clamp(0.0, 1.0);
        effects.avoidance = effects.avoidance.clamp(0.0, 1.0);

        let at = || location.cohort(species_id, cohort);
        ensure_finite("growth multiplier", effects.growth, at)?;
        ensure_finite("reproduction multiplier", effects.reproduction, at)?;
        ensure_finite("movement multiplier", effects.movement, at)?;
        ensure_finite("avoidance multiplier", effects.avoidance, at)?;
        ensure_finite("mortality", effects.mortality, at)?;
        Ok(effects)
    }

    fn threshold_mortality_rate(
        &self,
        species: &Species,
        coefficients: &SpeciesCoefficients,
        exposure: &CohortExposure,
        state: &ExposureState,
        inputs: &EffectInputs,
    ) -> f64 {
        if species.kind.is_smothered() {
            return if exposure.ambient >= coefficients.lc50 {
                self.config.smothering_mortality
            } else {
                0.0
            };
        }
        let mut lc50 = coefficients.lc50;
        if let Some(correction) = &self.config.temperature_correction {
            lc50 /= q10_factor(inputs.temperature, correction.reference, correction.q10);
        }
        if self.config.exposure_time_correction {
            lc50 /= exposure_time_factor(state.elapsed(inputs.time), coefficients.time_to_lc50);
        }
        lethal_rate(
            exposure.burden.max(0.0),
            lc50,
            coefficients.slope,
            coefficients.time_to_lc50,
        )
    }
}

pub fn growth_multiplier(kind: GroupKind, coefficients: &SpeciesCoefficients, burden: f64) -> f64 {
    match coefficients.growth_effect {
        GrowthEffect::None => 1.0,
        GrowthEffect::Threshold {
            threshold,
            magnitude,
        } => {
            if kind.is_producer_or_microfauna() {
                hill_suppression(burden, threshold, coefficients.slope)
            } else if burden > threshold {
                (1.0 - magnitude).clamp(0.0, 1.0)
            } else {
                1.0
            }
        }
        GrowthEffect::Logistic { l, a, b } => logistic_suppression(burden, l, a, b),
    }
}

pub fn reproduction_multiplier(coefficients: &SpeciesCoefficients, burden: f64) -> f64 {
    if burden <= coefficients.max_chronic {
        return 1.0;
    }
    let excess = burden / coefficients.max_chronic - 1.0;
    (1.0 - coefficients.reproduction_coefficient * excess).clamp(0.0, 1.0)
}

pub fn movement_multiplier(coefficients: &SpeciesCoefficients, burden: f64) -> f64 {
    if burden <= coefficients.max_chronic {
        return 1.0;
    }
    (1.0 - coefficients.movement_coefficient).clamp(0.0, 1.0)
}

/// Advances the chronic lethal point of one exposure history and returns the increment.
///
/// Only a dose above every dose seen before moves the point, so the point is monotone.
pub fn advance_lethal_point(
    curve: &DoseCurve,
    coefficients: &SpeciesCoefficients,
    burden: f64,
    state: &mut ExposureState,
) -> f64 {
    if burden <= coefficients.max_chronic {
        return 0.0;
    }
    let ci = burden / coefficients.lc100;
    if ci <= state.max_dose {
        return 0.0;
    }
    state.max_dose = ci;
    let next = state.lethal_point.max(curve.evaluate(ci)).min(1.0);
    let increment = next - state.lethal_point;
    state.lethal_point = next;
    increment
}
