use super::SMALL;
use serde::{Deserialize, Serialize};

/// Curve-shape exponent of the Richards (generalized logistic) uptake step.
pub const RICHARDS_SHAPE: f64 = 0.5;

/// Fraction of ambient level used as the starting point of a sigmoid from an empty body burden.
///
/// A logistic curve started at exactly zero never leaves it.
pub const SIGMOID_SEED: f64 = 1e-3;

/// Uptake-kinetics option, selected per species and contaminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UptakeKinetics {
    /// `k * max(env - body, 0)`.
    LinearSaturating,
    /// `k * env`, no internal saturation.
    FlatLinear,
    /// Exact step of a Richards curve toward `env`.
    Sigmoid,
    /// Exact step of a logistic curve toward `env`.
    InVitroSigmoid,
}

/// Uptake rate over a step of length `dt` (already zero for species not due this sub-step).
#[inline]
pub fn uptake(kinetics: UptakeKinetics, k: f64, env: f64, body: f64, dt: f64) -> f64 {
    if dt <= 0.0 || k == 0.0 {
        return 0.0;
    }
    match kinetics {
        UptakeKinetics::LinearSaturating => k * (env - body).max(0.0),
        UptakeKinetics::FlatLinear => k * env.max(0.0),
        UptakeKinetics::Sigmoid => generalized_logistic_step(k, env, body, dt, RICHARDS_SHAPE),
        UptakeKinetics::InVitroSigmoid => generalized_logistic_step(k, env, body, dt, 1.0),
    }
}

/// Mean rate of `dy/dt = k y (1 - (y/K)^shape)` over `dt`, solved in closed form with `K = env`.
fn generalized_logistic_step(k: f64, env: f64, body: f64, dt: f64, shape: f64) -> f64 {
    if env <= 0.0 || body >= env {
        return 0.0;
    }
    let start = body.max(env * SIGMOID_SEED).max(SMALL);
    let ratio = (env / start).powf(shape);
    let next = env / (1.0 + (ratio - 1.0) * (-k * shape * dt).exp()).powf(1.0 / shape);
    ((next.min(env) - body) / dt).max(0.0)
}
