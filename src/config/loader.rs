//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Invalid retry policy: {0}")]
    InvalidPolicy(String),

    #[error("Invalid environment override {key}: {message}")]
    Env { key: &'static str, message: String },
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, apply environment overrides, and validate a TOML file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: AppConfig = toml::from_str(&content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Defaults plus environment overrides, validated. Used when no file is given.
pub fn load_from_env() -> Result<AppConfig, ConfigError> {
    let mut config = AppConfig::default();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply `EDGE_*` overrides read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(env) = lookup("EDGE_ENVIRONMENT") {
        config.app.environment = env;
    }
    if let Some(raw) = lookup("EDGE_DEBUG") {
        config.app.debug = match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            other => {
                return Err(ConfigError::Env {
                    key: "EDGE_DEBUG",
                    message: format!("'{other}' is not a boolean"),
                })
            }
        };
    }
    if let Some(level) = lookup("EDGE_LOG_LEVEL") {
        config.observability.log_level = level;
    }
    if let Some(addr) = lookup("EDGE_BIND_ADDRESS") {
        config.server.bind_address = addr;
    }
    Ok(())
}
