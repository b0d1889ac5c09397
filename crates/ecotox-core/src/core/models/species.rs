use super::habitat::Habitat;
use serde::{Deserialize, Serialize};

/// Functional group of a species, as far as contaminant effects care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupKind {
    Fish,
    Bird,
    Mammal,
    Coral,
    Sponge,
    EpibenthicFilterFeeder,
    PrimaryProducer,
    Microfauna,
    Invertebrate,
}

impl GroupKind {
    /// Groups whose dominant contaminant mortality mode is external smothering.
    pub fn is_smothered(self) -> bool {
        matches!(
            self,
            GroupKind::Bird
                | GroupKind::Mammal
                | GroupKind::Coral
                | GroupKind::Sponge
                | GroupKind::EpibenthicFilterFeeder
        )
    }

    pub fn is_producer_or_microfauna(self) -> bool {
        matches!(self, GroupKind::PrimaryProducer | GroupKind::Microfauna)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgeStructure {
    /// Biomass is (structural N + reserve N) x number density.
    AgeStructured,
    /// Biomass is the raw tracer concentration.
    BiomassPool,
}

/// How often the contaminant engine evaluates a species.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateCadence {
    #[default]
    EverySubstep,
    /// Only on the first sub-step of each larger tick.
    OncePerTick,
}

impl UpdateCadence {
    /// Length of the step the species integrates over in the current sub-step.
    #[inline]
    pub fn effective_dt(self, dt: f64, first_substep_of_tick: bool) -> f64 {
        match self {
            UpdateCadence::EverySubstep => dt,
            UpdateCadence::OncePerTick if first_substep_of_tick => dt,
            UpdateCadence::OncePerTick => 0.0,
        }
    }
}

/// Tracer values the food-web model keeps for one cohort in one cell and layer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CohortTracers {
    pub structural_n: f64,
    pub reserve_n: f64,
    pub density: f64,
    pub pool: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Species {
    pub name: String,
    pub kind: GroupKind,
    pub age_structure: AgeStructure,
    #[serde(default = "default_cohorts")]
    pub cohorts: usize,
    #[serde(default)]
    pub maturity_cohort: usize,
    #[serde(default)]
    pub cadence: UpdateCadence,
    /// Habitats the species is active in; the first one is its home habitat.
    #[serde(default)]
    pub habitats: Vec<Habitat>,
}

fn default_cohorts() -> usize {
    1
}

impl Species {
    pub fn is_active(&self) -> bool {
        !self.habitats.is_empty()
    }

    pub fn home_habitat(&self) -> Option<Habitat> {
        self.habitats.first().copied()
    }

    pub fn lives_in(&self, habitat: Habitat) -> bool {
        self.habitats.contains(&habitat)
    }

    pub fn is_mature(&self, cohort: usize) -> bool {
        cohort >= self.maturity_cohort
    }

    /// Biomass concentration of one cohort according to the species' age structure.
    #[inline]
    pub fn biomass(&self, tracers: &CohortTracers) -> f64 {
        match self.age_structure {
            AgeStructure::AgeStructured => {
                (tracers.structural_n + tracers.reserve_n) * tracers.density
            }
            AgeStructure::BiomassPool => tracers.pool,
        }
    }

    /// Individuals (or biomass, for pools) that move with the cohort.
    #[inline]
    pub fn headcount(&self, tracers: &CohortTracers) -> f64 {
        match self.age_structure {
            AgeStructure::AgeStructured => tracers.density,
            AgeStructure::BiomassPool => tracers.pool,
        }
    }
}
