use super::registry::RegistryError;
use crate::core::kinetics::dose_response::{Avoidance, DoseCurve, GrowthEffect};
use crate::core::kinetics::uptake::UptakeKinetics;
use crate::core::models::habitat::{Habitat, PerHabitat};
use crate::core::models::ids::TracerId;
use crate::core::models::species::Species;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Per-species sensitivity of one contaminant, as written in the parameter file.
///
/// Every field is optional here; the registry decides which ones are required.
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SpeciesCoefficientParams {
    pub uptake_rate: Option<f64>,
    pub uptake_kinetics: Option<UptakeKinetics>,
    pub lc50: Option<f64>,
    pub lc100: Option<f64>,
    pub max_chronic: Option<f64>,
    pub slope: Option<f64>,
    pub time_to_lc50: Option<f64>,
    /// Overrides the contaminant half-life inside this species' tissue.
    pub half_life: Option<f64>,
    #[serde(default)]
    pub growth_effect: GrowthEffect,
    #[serde(default)]
    pub reproduction_coefficient: f64,
    #[serde(default)]
    pub movement_coefficient: f64,
    pub avoidance: Option<Avoidance>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FreePoolTracers {
    pub water_column: Option<TracerId>,
    pub sediment: Option<TracerId>,
    pub epibenthic: Option<TracerId>,
    pub ice: Option<TracerId>,
}

impl From<FreePoolTracers> for PerHabitat<Option<TracerId>> {
    fn from(p: FreePoolTracers) -> Self {
        let mut map = PerHabitat::splat(None);
        map[Habitat::WaterColumn] = p.water_column;
        map[Habitat::Sediment] = p.sediment;
        map[Habitat::Epibenthic] = p.epibenthic;
        map[Habitat::Ice] = p.ice;
        map
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ContaminantParams {
    pub name: String,
    pub half_life: f64,
    #[serde(default)]
    pub dissolved_release: f64,
    pub free_pool: FreePoolTracers,
    /// One coefficient per contaminant, in registry order; empty means no interaction.
    #[serde(default)]
    pub interaction: Vec<f64>,
    #[serde(default)]
    pub dose_curve: DoseCurve,
    /// Sensitivities keyed by species name.
    #[serde(default)]
    pub species: BTreeMap<String, SpeciesCoefficientParams>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RegistryParams {
    #[serde(default)]
    pub species: Vec<Species>,
    #[serde(default)]
    pub contaminants: Vec<ContaminantParams>,
}

impl RegistryParams {
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path).map_err(|e| RegistryError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| RegistryError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })
    }
}
