use crate::core::contaminant::registry::Contaminant;
use crate::core::kinetics::decay::decayed;
use crate::core::models::ids::SpeciesId;

/// Decay rate of a free pool at concentration `env`, using the contaminant's global half-life.
#[inline]
pub fn free_pool_decay(contaminant: &Contaminant, env: f64, dt: f64) -> f64 {
    decayed(env, dt, contaminant.half_life)
}

/// Decay rate of a body burden; the species' tissue half-life wins when one is configured.
#[inline]
pub fn body_burden_decay(contaminant: &Contaminant, species: SpeciesId, burden: f64, dt: f64) -> f64 {
    decayed(burden, dt, contaminant.body_half_life(species))
}
