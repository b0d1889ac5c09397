use super::error::{EngineError, Location, ensure_finite};
use crate::core::kinetics::SMALL;
use rand::Rng;
use tracing::warn;

/// `amount / biomass`, guarded against zero biomass.
///
/// Ratios above 1 within `slack` are clamped with a warning; beyond it they are fatal.
pub fn implied_proportion(
    quantity: &'static str,
    amount: f64,
    biomass: f64,
    slack: f64,
    location: impl FnOnce() -> Location,
) -> Result<f64, EngineError> {
    let ratio = amount / biomass.max(SMALL);
    if !ratio.is_finite() {
        return Err(EngineError::NonFinite {
            quantity,
            value: ratio,
            location: location(),
        });
    }
    if ratio <= 1.0 {
        return Ok(ratio.max(0.0));
    }
    let location = location();
    if ratio > 1.0 + slack {
        return Err(EngineError::ProportionViolation {
            quantity,
            ratio,
            location,
        });
    }
    warn!(%location, quantity, ratio, "Implied proportion slightly above 1; clamping");
    Ok(1.0)
}

/// Rate at which a predation event carries body burden from prey to predator, in prey
/// burden units.
///
/// `consumed` is a consumption rate. The bound applies to what is eaten over the sub-step,
/// `consumed * dt / prey_biomass`, so the prey never loses more than its burden in one step.
pub fn predation_transfer(
    prey_burden: f64,
    consumed: f64,
    prey_biomass: f64,
    dt: f64,
    slack: f64,
    location: impl Fn() -> Location,
) -> Result<f64, EngineError> {
    if consumed == 0.0 || prey_burden == 0.0 || dt <= 0.0 {
        return Ok(0.0);
    }
    let eaten = implied_proportion("consumption", consumed * dt, prey_biomass, slack, &location)?;
    ensure_finite("predation transfer", prey_burden * eaten / dt, &location)
}

/// Rate at which a loss event releases body burden into the habitat's free pool.
pub fn release_transfer(
    burden: f64,
    lost: f64,
    biomass: f64,
    release_coefficient: f64,
    dt: f64,
    slack: f64,
    location: impl Fn() -> Location,
) -> Result<f64, EngineError> {
    if lost == 0.0 || burden == 0.0 || release_coefficient == 0.0 || dt <= 0.0 {
        return Ok(0.0);
    }
    let ratio = implied_proportion("loss", lost, biomass, slack, &location)?;
    ensure_finite(
        "environmental release",
        burden * ratio * release_coefficient / dt,
        &location,
    )
}

/// New contaminated proportion of a predator after it ingested `transfer`.
///
/// The increment is drawn uniformly between `min_bound` and `transfer / predator_biomass`
/// (both capped at 1); the result never exceeds 1.
pub fn draw_proportion<R: Rng + ?Sized>(
    rng: &mut R,
    current: f64,
    transfer: f64,
    predator_biomass: f64,
    min_bound: f64,
) -> f64 {
    let hi = (transfer / predator_biomass.max(SMALL)).min(1.0);
    if !(hi > 0.0) {
        return current.clamp(0.0, 1.0);
    }
    let lo = min_bound.min(hi);
    let draw = if hi > lo { rng.gen_range(lo..=hi) } else { hi };
    (current + draw).clamp(0.0, 1.0)
}
