//! # Engine Module
//!
//! Stateful machinery of one contaminant sub-step: the components the step driver runs over
//! every (cell, layer, habitat) unit, plus the configuration, error and progress types they
//! share.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Mortality policy, interaction mode, tolerances and seeds
//! - **Context and State** ([`context`]) - Borrowed collaborators and persistent exposure state
//! - **Components** - [`decay`], [`uptake`], [`flux`] reconciliation, [`transfer`],
//!   [`interaction`], [`effects`] and the [`movement`] coupler
//! - **Conservation** ([`conservation`]) - Forced-input ledger and periodic mass audits
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress events
//! - **Error Handling** ([`error`]) - Fatal conditions with the location they occurred at

pub mod config;
pub mod conservation;
pub mod context;
pub mod decay;
pub mod effects;
pub mod error;
pub mod flux;
pub mod interaction;
pub mod movement;
pub mod progress;
pub mod transfer;
pub mod uptake;

#[cfg(test)]
pub(crate) mod fixtures;
