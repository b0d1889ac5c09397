use std::fmt;
use thiserror::Error;

use super::config::ConfigError;
use crate::core::contaminant::registry::RegistryError;
use crate::core::models::field::ShapeMismatch;
use crate::core::models::ids::{CellId, ContaminantId, SpeciesId};

/// Where in the (contaminant, species, cohort, cell, layer) space a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub contaminant: Option<ContaminantId>,
    pub species: Option<SpeciesId>,
    pub cohort: Option<usize>,
    pub cell: Option<CellId>,
    pub layer: Option<usize>,
}

impl Location {
    pub fn unit(cell: CellId, layer: usize) -> Self {
        Self {
            cell: Some(cell),
            layer: Some(layer),
            ..Default::default()
        }
    }

    pub fn contaminant(mut self, contaminant: ContaminantId) -> Self {
        self.contaminant = Some(contaminant);
        self
    }

    pub fn cohort(mut self, species: SpeciesId, cohort: usize) -> Self {
        self.species = Some(species);
        self.cohort = Some(cohort);
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::with_capacity(4);
        if let Some(c) = self.contaminant {
            parts.push(c.to_string());
        }
        match (self.species, self.cohort) {
            (Some(s), Some(k)) => parts.push(format!("{s} cohort {k}")),
            (Some(s), None) => parts.push(s.to_string()),
            _ => {}
        }
        if let Some(cell) = self.cell {
            parts.push(cell.to_string());
        }
        if let Some(layer) = self.layer {
            parts.push(format!("layer {layer}"));
        }
        if parts.is_empty() {
            f.write_str("<unspecified>")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Registry error: {source}")]
    Registry {
        #[from]
        source: RegistryError,
    },

    #[error("Configuration error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Non-finite {quantity} ({value}) at {location}")]
    NonFinite {
        quantity: &'static str,
        value: f64,
        location: Location,
    },

    #[error("Implied {quantity} proportion {ratio} exceeds 1 at {location}")]
    ProportionViolation {
        quantity: &'static str,
        ratio: f64,
        location: Location,
    },

    #[error("Survivor product {value} exceeds 1 at {location}")]
    SurvivorProduct { value: f64, location: Location },

    #[error(
        "Mass budget exceeded for contaminant '{name}': domain total {total} against forced input {input} (tolerance {tolerance})"
    )]
    MassBudgetExceeded {
        contaminant: ContaminantId,
        name: String,
        total: f64,
        input: f64,
        tolerance: f64,
    },

    #[error("Invalid {kind} event at {location}: {reason}")]
    InvalidEvent {
        kind: &'static str,
        reason: String,
        location: Location,
    },

    #[error("Dimension mismatch for {what}: {source}")]
    Dimension {
        what: &'static str,
        source: ShapeMismatch,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}

/// Fails with [`EngineError::NonFinite`] unless `value` is finite.
#[inline]
pub(crate) fn ensure_finite(
    quantity: &'static str,
    value: f64,
    location: impl FnOnce() -> Location,
) -> Result<f64, EngineError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EngineError::NonFinite {
            quantity,
            value,
            location: location(),
        })
    }
}
