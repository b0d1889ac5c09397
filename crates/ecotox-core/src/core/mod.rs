//! # Core Module
//!
//! Stateless building blocks of the contaminant engine.
//!
//! - **Models** ([`models`]) - Identifiers, habitats, species descriptors, the spatial grid and
//!   the flattened field containers the engine stores its state in
//! - **Contaminants** ([`contaminant`]) - Parameter schema, TOML loading and the immutable
//!   [`contaminant::registry::ContaminantRegistry`]
//! - **Kinetics** ([`kinetics`]) - Closed-form uptake, decay and dose-response formulas

pub mod contaminant;
pub mod kinetics;
pub mod models;
