use super::config::InteractionMode;
use crate::core::contaminant::registry::ContaminantRegistry;
use crate::core::models::ids::{ContaminantId, SpeciesId};

/// Combines interaction terms `t_i` into a multiplier on effective tissue concentration.
pub fn amplify(mode: InteractionMode, amplify_only: bool, terms: &[f64]) -> f64 {
    let factor = match mode {
        InteractionMode::None => 1.0,
        InteractionMode::Additive => 1.0 + terms.iter().sum::<f64>(),
        InteractionMode::Multiplicative => terms.iter().map(|t| 1.0 + t).product(),
        InteractionMode::MostLimiting => terms
            .iter()
            .map(|t| 1.0 + t)
            .fold(1.0_f64, f64::max),
    };
    let floor = if amplify_only { 1.0 } else { 0.0 };
    factor.max(floor)
}

/// Interaction terms acting on `target` inside `species`.
///
/// Each other contaminant contributes `coef[target][i] * burden[i] / lc50[i]`; contaminants
/// that do not track the species contribute nothing.
pub fn interaction_terms(
    registry: &ContaminantRegistry,
    target: ContaminantId,
    species: SpeciesId,
    burdens: &[f64],
) -> Vec<f64> {
    let Some(contaminant) = registry.contaminant(target) else {
        return Vec::new();
    };
    registry
        .contaminants()
        .iter()
        .filter(|other| other.id != target)
        .filter_map(|other| {
            let lc50 = other.coefficients(species)?.lc50;
            let burden = burdens.get(other.id.index()).copied().unwrap_or(0.0);
            Some(contaminant.interaction_with(other.id) * burden / lc50)
        })
        .collect()
}

/// Burdens of every contaminant after applying the interaction multiplier.
pub fn effective_burdens(
    registry: &ContaminantRegistry,
    mode: InteractionMode,
    amplify_only: bool,
    species: SpeciesId,
    burdens: &[f64],
) -> Vec<f64> {
    if mode == InteractionMode::None {
        return burdens.to_vec();
    }
    burdens
        .iter()
        .enumerate()
        .map(|(c, &burden)| {
            let terms = interaction_terms(registry, ContaminantId(c), species, burdens);
            burden * amplify(mode, amplify_only, &terms)
        })
        .collect()
}
