//! # ecotox Core Library
//!
//! A contaminant fate-and-effects engine for box-and-layer marine ecosystem models. It tracks
//! how a pollutant enters the environment, is taken up by organisms, decays, moves up the food
//! chain through predation, and in turn suppresses growth, reproduction and movement or causes
//! mortality, while preserving a global mass-conservation invariant.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models (species, grid, flattened fields),
//!   the contaminant parameter schema and registry, and the pure closed-form kinetics and
//!   dose-response formulas.
//!
//! - **[`engine`]: The Logic Core.** The stateful per-sub-step machinery: decay, uptake,
//!   flux reconciliation, transfer, effects, interaction, movement coupling and the
//!   conservation audit, together with the persistent exposure state they share.
//!
//! - **[`workflows`]: The Public API.** The ordered per-sub-step sweep that an external
//!   food-web solver calls, and a scenario runner that stands in for that solver.

pub mod core;
pub mod engine;
pub mod workflows;
