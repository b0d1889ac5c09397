use crate::core::contaminant::params::{
    ContaminantParams, FreePoolTracers, RegistryParams, SpeciesCoefficientParams,
};
use crate::core::contaminant::registry::ContaminantRegistry;
use crate::core::kinetics::uptake::UptakeKinetics;
use crate::core::models::grid::{CellGeometry, SpatialGrid};
use crate::core::models::habitat::Habitat;
use crate::core::models::ids::{CellId, TracerId};
use crate::core::models::species::{AgeStructure, GroupKind, Species, UpdateCadence};
use crate::engine::config::{EngineConfigBuilder, MortalityModel};

pub(crate) fn species(name: &str, cohorts: usize, habitats: Vec<Habitat>) -> Species {
    Species {
        name: name.to_string(),
        kind: GroupKind::Fish,
        age_structure: AgeStructure::BiomassPool,
        cohorts,
        maturity_cohort: 0,
        cadence: UpdateCadence::EverySubstep,
        habitats,
    }
}

pub(crate) fn coefficients(kinetics: UptakeKinetics, rate: f64) -> SpeciesCoefficientParams {
    SpeciesCoefficientParams {
        uptake_rate: Some(rate),
        uptake_kinetics: Some(kinetics),
        lc50: Some(1e6),
        lc100: Some(4e6),
        max_chronic: Some(1e5),
        slope: Some(1.0),
        time_to_lc50: Some(10.0),
        ..Default::default()
    }
}

pub(crate) fn contaminant(
    name: &str,
    free_pool: FreePoolTracers,
    tracked: &[(&str, SpeciesCoefficientParams)],
) -> ContaminantParams {
    ContaminantParams {
        name: name.to_string(),
        half_life: f64::INFINITY,
        dissolved_release: 0.0,
        free_pool,
        interaction: Vec::new(),
        dose_curve: Default::default(),
        species: tracked
            .iter()
            .map(|(n, c)| (n.to_string(), c.clone()))
            .collect(),
    }
}

pub(crate) fn water_pool(tracer: usize) -> FreePoolTracers {
    FreePoolTracers {
        water_column: Some(TracerId(tracer)),
        ..Default::default()
    }
}

pub(crate) fn registry(
    species: Vec<Species>,
    contaminants: Vec<ContaminantParams>,
) -> ContaminantRegistry {
    ContaminantRegistry::build(RegistryParams {
        species,
        contaminants,
    })
    .unwrap()
}

/// `cells` unit-area cells in a row, each neighbouring the next and previous one.
pub(crate) fn row_grid(cells: usize, layers: usize) -> SpatialGrid {
    let geometry = (0..cells)
        .map(|i| {
            let mut neighbors = Vec::new();
            if i + 1 < cells {
                neighbors.push(CellId(i + 1));
            }
            if i > 0 {
                neighbors.push(CellId(i - 1));
            }
            CellGeometry {
                area: 1.0,
                layer_thickness: vec![1.0; layers],
                sediment_thickness: 1.0,
                neighbors,
            }
        })
        .collect();
    SpatialGrid::new(geometry).unwrap()
}

pub(crate) fn config(model: MortalityModel) -> EngineConfigBuilder {
    EngineConfigBuilder::new()
        .mortality_model(model)
        .conservation_tolerance(1e-9)
        .audit_interval(1)
}
