//! Turns a scenario's engine section, CLI overrides and built-in defaults into one
//! [`EngineConfig`](ecotox::engine::config::EngineConfig).

pub mod builder;
pub mod defaults;
