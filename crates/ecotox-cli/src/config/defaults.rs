use ecotox::engine::config::MortalityModel;

/// Values the CLI falls back to when neither the scenario nor the command line sets them.
pub struct DefaultsConfig {
    pub mortality_model: MortalityModel,
    pub conservation_tolerance: f64,
    pub audit_interval: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            mortality_model: MortalityModel::InVitro,
            conservation_tolerance: 1e-6,
            audit_interval: 1,
        }
    }
}
