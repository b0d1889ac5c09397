//! # Contaminant Module
//!
//! Static configuration of every tracked pollutant.
//!
//! - [`params`] - The serde schema of species and contaminant parameters, and its TOML loader
//! - [`registry`] - The validated, immutable [`registry::ContaminantRegistry`] the engine reads
//!   coefficients and tracer slots from

pub mod params;
pub mod registry;
