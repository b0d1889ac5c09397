use super::SMALL;
use serde::{Deserialize, Serialize};

/// Two-segment piecewise-linear curve mapping a normalized dose `ci` to a lethal fraction.
///
/// The curve passes through `(0, 0)`, `(cx, cy)` and `(1, 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DoseCurve {
    pub cx: f64,
    pub cy: f64,
}

impl Default for DoseCurve {
    fn default() -> Self {
        Self { cx: 0.5, cy: 0.5 }
    }
}

impl DoseCurve {
    #[inline]
    pub fn evaluate(&self, ci: f64) -> f64 {
        if ci < self.cx {
            self.cy / self.cx * ci
        } else {
            self.cy + (1.0 - self.cy) / (1.0 - self.cx) * (ci - self.cx)
        }
    }
}

/// Per-species growth response to tissue concentration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "kebab-case")]
pub enum GrowthEffect {
    #[default]
    None,
    /// Hill suppression with EC50 = `threshold` for producers and microfauna, otherwise a
    /// fixed `1 - magnitude` penalty above `threshold`.
    Threshold { threshold: f64, magnitude: f64 },
    /// `1 - l / (1 + exp(-a (c - b)))`.
    Logistic { l: f64, a: f64, b: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Avoidance {
    pub threshold: f64,
    pub steepness: f64,
}

#[inline]
pub fn hill_suppression(concentration: f64, ec50: f64, slope: f64) -> f64 {
    if concentration <= 0.0 {
        return 1.0;
    }
    1.0 / (1.0 + (concentration / ec50.max(SMALL)).powf(slope))
}

/// Growth multiplier from a logistic dose-response curve; negative `l` allows stimulation.
#[inline]
pub fn logistic_suppression(concentration: f64, l: f64, a: f64, b: f64) -> f64 {
    (1.0 - l / (1.0 + (-a * (concentration - b)).exp())).max(0.0)
}

/// Instantaneous mortality rate `ln(1 + (c / lc50)^slope) / time_to_lc50`.
#[inline]
pub fn lethal_rate(concentration: f64, lc50: f64, slope: f64, time_to_lc50: f64) -> f64 {
    if concentration <= 0.0 {
        return 0.0;
    }
    (1.0 + (concentration / lc50.max(SMALL)).powf(slope)).ln() / time_to_lc50.max(SMALL)
}

/// Probability of surviving ambient exposure `env` for `dt`.
///
/// Time to 50% mortality scales as `time_to_lc50 * (lc50 / env)^slope`; at or above `lc100`
/// nothing survives.
#[inline]
pub fn acute_survival(
    env: f64,
    lc50: f64,
    lc100: f64,
    slope: f64,
    time_to_lc50: f64,
    dt: f64,
) -> f64 {
    if env <= 0.0 || dt <= 0.0 {
        return 1.0;
    }
    if env >= lc100 {
        return 0.0;
    }
    let t50 = time_to_lc50.max(SMALL) * (lc50 / env).powf(slope);
    0.5f64.powf(dt / t50.max(SMALL))
}

/// Multiplier on LC50 that saturates from very large toward 1 as exposure lengthens.
#[inline]
pub fn exposure_time_factor(elapsed: f64, time_to_lc50: f64) -> f64 {
    (1.0 - (-elapsed.max(0.0) / time_to_lc50.max(SMALL)).exp()).max(SMALL)
}

/// Q10 scaling of toxicity with water temperature.
#[inline]
pub fn q10_factor(temperature: f64, reference: f64, q10: f64) -> f64 {
    q10.powf((temperature - reference) / 10.0)
}

#[inline]
pub fn avoidance_factor(env: f64, avoidance: &Avoidance) -> f64 {
    1.0 / (1.0 + (avoidance.steepness * (env - avoidance.threshold)).exp())
}
