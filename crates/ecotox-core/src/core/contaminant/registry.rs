use super::params::{ContaminantParams, RegistryParams, SpeciesCoefficientParams};
use crate::core::kinetics::dose_response::{Avoidance, DoseCurve, GrowthEffect};
use crate::core::kinetics::uptake::UptakeKinetics;
use crate::core::models::field::CohortLayout;
use crate::core::models::habitat::{Habitat, PerHabitat};
use crate::core::models::ids::{ContaminantId, SpeciesId, TracerId};
use crate::core::models::species::Species;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RegistryError {
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
    #[error("Species '{0}' is defined more than once")]
    DuplicateSpecies(String),
    #[error("Contaminant '{0}' is defined more than once")]
    DuplicateContaminant(String),
    #[error("Contaminant '{contaminant}' references unknown species '{species}'")]
    UnknownSpecies {
        contaminant: String,
        species: String,
    },
    #[error("Contaminant '{contaminant}' is missing '{parameter}' for active species '{species}'")]
    MissingCoefficient {
        contaminant: String,
        species: String,
        parameter: &'static str,
    },
    #[error(
        "Contaminant '{contaminant}' has no free-pool tracer for habitat '{habitat}' used by species '{species}'"
    )]
    MissingFreePool {
        contaminant: String,
        species: String,
        habitat: Habitat,
    },
    #[error("Invalid value {value} for '{parameter}' of {owner}")]
    InvalidParameter {
        owner: String,
        parameter: &'static str,
        value: f64,
    },
    #[error(
        "Interaction vector of contaminant '{contaminant}' has {found} entries, expected {expected}"
    )]
    InteractionLength {
        contaminant: String,
        expected: usize,
        found: usize,
    },
    #[error("{tracer} is assigned to more than one free pool")]
    DuplicateTracer { tracer: TracerId },
}

/// Validated sensitivity of one species to one contaminant.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesCoefficients {
    pub uptake_rate: f64,
    pub uptake_kinetics: UptakeKinetics,
    pub lc50: f64,
    /// Concentration at which nothing survives (LC100-equivalent).
    pub lc100: f64,
    pub max_chronic: f64,
    pub slope: f64,
    pub time_to_lc50: f64,
    /// Tissue half-life, with the per-species override already applied.
    pub half_life: f64,
    pub growth_effect: GrowthEffect,
    pub reproduction_coefficient: f64,
    pub movement_coefficient: f64,
    pub avoidance: Option<Avoidance>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contaminant {
    pub id: ContaminantId,
    pub name: String,
    pub half_life: f64,
    pub dissolved_release: f64,
    pub dose_curve: DoseCurve,
    interaction: Vec<f64>,
    free_pool: PerHabitat<Option<TracerId>>,
    coefficients: Vec<Option<SpeciesCoefficients>>,
}

impl Contaminant {
    #[inline]
    pub fn free_pool_tracer(&self, habitat: Habitat) -> Option<TracerId> {
        self.free_pool[habitat]
    }

    /// Coefficients for `species`, or `None` when the contaminant does not track it.
    #[inline]
    pub fn coefficients(&self, species: SpeciesId) -> Option<&SpeciesCoefficients> {
        self.coefficients.get(species.index())?.as_ref()
    }

    pub fn tracks(&self, species: SpeciesId) -> bool {
        self.coefficients(species).is_some()
    }

    pub fn body_half_life(&self, species: SpeciesId) -> f64 {
        self.coefficients(species)
            .map_or(self.half_life, |c| c.half_life)
    }

    /// Interaction coefficient toward `other`; the self entry always reads as zero.
    #[inline]
    pub fn interaction_with(&self, other: ContaminantId) -> f64 {
        if other == self.id {
            return 0.0;
        }
        self.interaction.get(other.index()).copied().unwrap_or(0.0)
    }
}

/// Immutable lookup of every species and contaminant parameter plus the tracer identity map.
///
/// Body-burden tracers are allocated contiguously after the highest free-pool tracer:
/// `base + contaminant * num_slots + slot`, where `slot` comes from the [`CohortLayout`].
#[derive(Debug, Clone)]
pub struct ContaminantRegistry {
    species: Vec<Species>,
    contaminants: Vec<Contaminant>,
    layout: CohortLayout,
    species_index: HashMap<String, SpeciesId>,
    body_burden_base: usize,
}

impl ContaminantRegistry {
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        Self::build(RegistryParams::load(path)?)
    }

    pub fn build(params: RegistryParams) -> Result<Self, RegistryError> {
        let RegistryParams {
            species,
            contaminants: contaminant_params,
        } = params;

        let mut species_index = HashMap::with_capacity(species.len());
        for (i, sp) in species.iter().enumerate() {
            if sp.cohorts == 0 {
                return Err(RegistryError::InvalidParameter {
                    owner: format!("species '{}'", sp.name),
                    parameter: "cohorts",
                    value: 0.0,
                });
            }
            if species_index.insert(sp.name.clone(), SpeciesId(i)).is_some() {
                return Err(RegistryError::DuplicateSpecies(sp.name.clone()));
            }
        }

        let count = contaminant_params.len();
        let mut names = HashSet::with_capacity(count);
        let mut seen_tracers = HashSet::new();
        let mut max_free_pool: Option<usize> = None;
        let mut contaminants = Vec::with_capacity(count);

        for (i, cp) in contaminant_params.into_iter().enumerate() {
            if !names.insert(cp.name.clone()) {
                return Err(RegistryError::DuplicateContaminant(cp.name));
            }
            let free_pool: PerHabitat<Option<TracerId>> = cp.free_pool.into();
            for tracer in free_pool.0.iter().flatten() {
                if !seen_tracers.insert(*tracer) {
                    return Err(RegistryError::DuplicateTracer { tracer: *tracer });
                }
                max_free_pool = Some(max_free_pool.map_or(tracer.index(), |m| m.max(tracer.index())));
            }
            contaminants.push(build_contaminant(
                ContaminantId(i),
                cp,
                free_pool,
                count,
                &species,
                &species_index,
            )?);
        }

        let layout = CohortLayout::new(species.iter().map(|s| s.cohorts));
        let body_burden_base = max_free_pool.map_or(0, |m| m + 1);
        debug!(
            species = species.len(),
            contaminants = contaminants.len(),
            body_burden_base,
            "Built contaminant registry"
        );

        Ok(Self {
            species,
            contaminants,
            layout,
            species_index,
            body_burden_base,
        })
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn species_by_id(&self, id: SpeciesId) -> Option<&Species> {
        self.species.get(id.index())
    }

    pub fn species_id(&self, name: &str) -> Option<SpeciesId> {
        self.species_index.get(name).copied()
    }

    pub fn contaminants(&self) -> &[Contaminant] {
        &self.contaminants
    }

    pub fn contaminant(&self, id: ContaminantId) -> Option<&Contaminant> {
        self.contaminants.get(id.index())
    }

    pub fn contaminant_id(&self, name: &str) -> Option<ContaminantId> {
        self.contaminants
            .iter()
            .position(|c| c.name == name)
            .map(ContaminantId)
    }

    pub fn layout(&self) -> &CohortLayout {
        &self.layout
    }

    pub fn free_pool_tracer(&self, contaminant: ContaminantId, habitat: Habitat) -> Option<TracerId> {
        self.contaminant(contaminant)?.free_pool_tracer(habitat)
    }

    #[inline]
    pub fn body_burden_tracer(
        &self,
        contaminant: ContaminantId,
        species: SpeciesId,
        cohort: usize,
    ) -> Option<TracerId> {
        if contaminant.index() >= self.contaminants.len() {
            return None;
        }
        let slot = self.layout.slot(species, cohort)?;
        Some(TracerId(
            self.body_burden_base + contaminant.index() * self.layout.num_slots() + slot,
        ))
    }

    /// Number of tracers a [`TracerField`](crate::core::models::field::TracerField) needs to
    /// hold every free pool and body burden.
    pub fn tracer_count(&self) -> usize {
        self.body_burden_base + self.contaminants.len() * self.layout.num_slots()
    }
}

fn build_contaminant(
    id: ContaminantId,
    params: ContaminantParams,
    free_pool: PerHabitat<Option<TracerId>>,
    count: usize,
    species: &[Species],
    species_index: &HashMap<String, SpeciesId>,
) -> Result<Contaminant, RegistryError> {
    let owner = format!("contaminant '{}'", params.name);
    require_positive(&owner, "half-life", params.half_life)?;
    if !(params.dissolved_release.is_finite() && params.dissolved_release >= 0.0) {
        return Err(RegistryError::InvalidParameter {
            owner,
            parameter: "dissolved-release",
            value: params.dissolved_release,
        });
    }
    let curve = params.dose_curve;
    if !(curve.cx > 0.0 && curve.cx < 1.0) {
        return Err(RegistryError::InvalidParameter {
            owner,
            parameter: "dose-curve.cx",
            value: curve.cx,
        });
    }
    if !(0.0..=1.0).contains(&curve.cy) {
        return Err(RegistryError::InvalidParameter {
            owner,
            parameter: "dose-curve.cy",
            value: curve.cy,
        });
    }

    let interaction = match params.interaction.len() {
        0 => vec![0.0; count],
        n if n == count => params.interaction,
        found => {
            return Err(RegistryError::InteractionLength {
                contaminant: params.name,
                expected: count,
                found,
            });
        }
    };

    for name in params.species.keys() {
        if !species_index.contains_key(name) {
            return Err(RegistryError::UnknownSpecies {
                contaminant: params.name.clone(),
                species: name.clone(),
            });
        }
    }

    let mut coefficients = Vec::with_capacity(species.len());
    for sp in species {
        if !sp.is_active() {
            coefficients.push(None);
            continue;
        }
        for &habitat in &sp.habitats {
            if free_pool[habitat].is_none() {
                return Err(RegistryError::MissingFreePool {
                    contaminant: params.name.clone(),
                    species: sp.name.clone(),
                    habitat,
                });
            }
        }
        let raw = params.species.get(&sp.name).cloned().unwrap_or_default();
        coefficients.push(Some(resolve_coefficients(
            &params.name,
            &sp.name,
            params.half_life,
            raw,
        )?));
    }

    Ok(Contaminant {
        id,
        name: params.name,
        half_life: params.half_life,
        dissolved_release: params.dissolved_release,
        dose_curve: curve,
        interaction,
        free_pool,
        coefficients,
    })
}

fn resolve_coefficients(
    contaminant: &str,
    species: &str,
    default_half_life: f64,
    raw: SpeciesCoefficientParams,
) -> Result<SpeciesCoefficients, RegistryError> {
    let missing = |parameter: &'static str| RegistryError::MissingCoefficient {
        contaminant: contaminant.to_string(),
        species: species.to_string(),
        parameter,
    };
    let owner = format!("species '{species}' under contaminant '{contaminant}'");

    let uptake_rate = raw.uptake_rate.ok_or_else(|| missing("uptake-rate"))?;
    let uptake_kinetics = raw.uptake_kinetics.ok_or_else(|| missing("uptake-kinetics"))?;
    let lc50 = raw.lc50.ok_or_else(|| missing("lc50"))?;
    let lc100 = raw.lc100.ok_or_else(|| missing("lc100"))?;
    let max_chronic = raw.max_chronic.ok_or_else(|| missing("max-chronic"))?;
    let slope = raw.slope.ok_or_else(|| missing("slope"))?;
    let time_to_lc50 = raw.time_to_lc50.ok_or_else(|| missing("time-to-lc50"))?;

    if !(uptake_rate.is_finite() && uptake_rate >= 0.0) {
        return Err(RegistryError::InvalidParameter {
            owner,
            parameter: "uptake-rate",
            value: uptake_rate,
        });
    }
    require_positive(&owner, "lc50", lc50)?;
    require_positive(&owner, "lc100", lc100)?;
    require_positive(&owner, "max-chronic", max_chronic)?;
    require_positive(&owner, "time-to-lc50", time_to_lc50)?;
    if !slope.is_finite() {
        return Err(RegistryError::InvalidParameter {
            owner,
            parameter: "slope",
            value: slope,
        });
    }
    let half_life = match raw.half_life {
        Some(h) => {
            require_positive(&owner, "half-life", h)?;
            h
        }
        None => default_half_life,
    };

    Ok(SpeciesCoefficients {
        uptake_rate,
        uptake_kinetics,
        lc50,
        lc100,
        max_chronic,
        slope,
        time_to_lc50,
        half_life,
        growth_effect: raw.growth_effect,
        reproduction_coefficient: raw.reproduction_coefficient,
        movement_coefficient: raw.movement_coefficient,
        avoidance: raw.avoidance,
    })
}

fn require_positive(owner: &str, parameter: &'static str, value: f64) -> Result<(), RegistryError> {
    // Infinite half-lives are allowed; they mean "never decays".
    if value > 0.0 && !value.is_nan() {
        Ok(())
    } else {
        Err(RegistryError::InvalidParameter {
            owner: owner.to_string(),
            parameter,
            value,
        })
    }
}
