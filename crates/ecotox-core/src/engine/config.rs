use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// How lethal effects are computed; one policy for the whole engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MortalityModel {
    /// Smothering threshold for external-exposure groups, logistic lethal rate otherwise.
    ThresholdLogistic,
    /// Acute survivorship from ambient exposure plus a chronic lethal point curve.
    InVitro,
}

/// How co-occurring contaminants amplify each other's effective tissue concentration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionMode {
    #[default]
    None,
    Additive,
    Multiplicative,
    MostLimiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TemperatureCorrection {
    pub reference: f64,
    pub q10: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub mortality_model: MortalityModel,
    pub conservation_tolerance: f64,
    /// Sub-steps between two conservation audits.
    pub audit_interval: u64,
    pub interaction_mode: InteractionMode,
    pub amplify_only: bool,
    pub track_proportion: bool,
    pub proportion_min_bound: f64,
    pub smothering_mortality: f64,
    pub temperature_correction: Option<TemperatureCorrection>,
    pub exposure_time_correction: bool,
    /// How far an implied transfer proportion may exceed 1 before it becomes fatal.
    pub transfer_slack: f64,
    pub seed: u64,
}

pub const DEFAULT_TRANSFER_SLACK: f64 = 1e-6;

#[derive(Default)]
pub struct EngineConfigBuilder {
    mortality_model: Option<MortalityModel>,
    conservation_tolerance: Option<f64>,
    audit_interval: Option<u64>,
    interaction_mode: Option<InteractionMode>,
    amplify_only: Option<bool>,
    track_proportion: Option<bool>,
    proportion_min_bound: Option<f64>,
    smothering_mortality: Option<f64>,
    temperature_correction: Option<TemperatureCorrection>,
    exposure_time_correction: Option<bool>,
    transfer_slack: Option<f64>,
    seed: Option<u64>,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mortality_model(mut self, model: MortalityModel) -> Self {
        self.mortality_model = Some(model);
        self
    }
    pub fn conservation_tolerance(mut self, tolerance: f64) -> Self {
        self.conservation_tolerance = Some(tolerance);
        self
    }
    pub fn audit_interval(mut self, interval: u64) -> Self {
        self.audit_interval = Some(interval);
        self
    }
    pub fn interaction_mode(mut self, mode: InteractionMode) -> Self {
        self.interaction_mode = Some(mode);
        self
    }
    pub fn amplify_only(mut self, enabled: bool) -> Self {
        self.amplify_only = Some(enabled);
        self
    }
    pub fn track_proportion(mut self, enabled: bool) -> Self {
        self.track_proportion = Some(enabled);
        self
    }
    pub fn proportion_min_bound(mut self, bound: f64) -> Self {
        self.proportion_min_bound = Some(bound);
        self
    }
    pub fn smothering_mortality(mut self, mortality: f64) -> Self {
        self.smothering_mortality = Some(mortality);
        self
    }
    pub fn temperature_correction(mut self, correction: Option<TemperatureCorrection>) -> Self {
        self.temperature_correction = correction;
        self
    }
    pub fn exposure_time_correction(mut self, enabled: bool) -> Self {
        self.exposure_time_correction = Some(enabled);
        self
    }
    pub fn transfer_slack(mut self, slack: f64) -> Self {
        self.transfer_slack = Some(slack);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        let config = EngineConfig {
            mortality_model: self
                .mortality_model
                .ok_or(ConfigError::MissingParameter("mortality_model"))?,
            conservation_tolerance: self
                .conservation_tolerance
                .ok_or(ConfigError::MissingParameter("conservation_tolerance"))?,
            audit_interval: self
                .audit_interval
                .ok_or(ConfigError::MissingParameter("audit_interval"))?,
            interaction_mode: self.interaction_mode.unwrap_or_default(),
            amplify_only: self.amplify_only.unwrap_or(false),
            track_proportion: self.track_proportion.unwrap_or(false),
            proportion_min_bound: self.proportion_min_bound.unwrap_or(0.0),
            smothering_mortality: self.smothering_mortality.unwrap_or(0.0),
            temperature_correction: self.temperature_correction,
            exposure_time_correction: self.exposure_time_correction.unwrap_or(false),
            transfer_slack: self.transfer_slack.unwrap_or(DEFAULT_TRANSFER_SLACK),
            seed: self.seed.unwrap_or(0),
        };
        config.validate()?;
        Ok(config)
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |name: &'static str, reason: &str| ConfigError::InvalidParameter {
            name,
            reason: reason.to_string(),
        };
        if !(self.conservation_tolerance.is_finite() && self.conservation_tolerance >= 0.0) {
            return Err(invalid(
                "conservation_tolerance",
                "must be finite and non-negative",
            ));
        }
        if self.audit_interval == 0 {
            return Err(invalid("audit_interval", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.proportion_min_bound) {
            return Err(invalid("proportion_min_bound", "must lie in [0, 1]"));
        }
        if !(self.smothering_mortality.is_finite() && self.smothering_mortality >= 0.0) {
            return Err(invalid(
                "smothering_mortality",
                "must be finite and non-negative",
            ));
        }
        if !(self.transfer_slack.is_finite() && self.transfer_slack >= 0.0) {
            return Err(invalid("transfer_slack", "must be finite and non-negative"));
        }
        if let Some(tc) = &self.temperature_correction {
            if !(tc.q10.is_finite() && tc.q10 > 0.0) || !tc.reference.is_finite() {
                return Err(invalid(
                    "temperature_correction",
                    "q10 must be positive and the reference temperature finite",
                ));
            }
        }
        Ok(())
    }
}
