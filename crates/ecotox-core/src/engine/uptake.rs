use super::context::ExposureState;
use crate::core::contaminant::registry::SpeciesCoefficients;
use crate::core::kinetics::uptake::uptake;

/// Uptake rate of one cohort from an ambient pool, in body-burden units.
#[inline]
pub fn cohort_uptake(coefficients: &SpeciesCoefficients, env: f64, body: f64, dt: f64) -> f64 {
    uptake(
        coefficients.uptake_kinetics,
        coefficients.uptake_rate,
        env,
        body,
        dt,
    )
}

/// Marks exposure onset on the first nonzero uptake and, when proportions are tracked,
/// flags the whole cohort as contaminated.
pub fn record_exposure(state: &mut ExposureState, rate: f64, time: f64, track_proportion: bool) {
    if rate <= 0.0 {
        return;
    }
    state.mark_onset(time);
    if track_proportion {
        state.proportion = 1.0;
    }
}
