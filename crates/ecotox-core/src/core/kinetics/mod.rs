//! Closed-form numerics shared by the engine components.
//!
//! Everything in here is a pure function of its arguments, in the same spirit as a forcefield's
//! potential functions: no state, no logging, no errors. Guards against degenerate inputs
//! (zero step, zero rate, zero denominators) return neutral values.

pub mod decay;
pub mod dose_response;
pub mod uptake;

/// Added to denominators that are legitimately zero (e.g. no biomass present).
pub const SMALL: f64 = 1e-12;
