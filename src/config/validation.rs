//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, attempts ≥ 1, multiplier ≥ 1)
//! - Check probe declarations (unique names, http(s) URLs)
//! - Check rate limit budgets when limiting is enabled
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use url::Url;

use crate::config::schema::AppConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be greater than 0"));
    }
    if config.server.max_body_bytes == 0 {
        errors.push(ValidationError::new("server.max_body_bytes", "must be greater than 0"));
    }

    let retries = &config.retries;
    if retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    }
    if !(retries.backoff_multiplier >= 1.0) {
        errors.push(ValidationError::new("retries.backoff_multiplier", "must be at least 1.0"));
    }
    if !(0.0..1.0).contains(&retries.jitter) {
        errors.push(ValidationError::new("retries.jitter", "must be in [0.0, 1.0)"));
    }

    if config.health.default_timeout_ms == 0 {
        errors.push(ValidationError::new("health.default_timeout_ms", "must be greater than 0"));
    }
    let mut names = HashSet::new();
    for (i, probe) in config.health.probes.iter().enumerate() {
        let field = |name: &str| format!("health.probes[{i}].{name}");
        if probe.name.trim().is_empty() {
            errors.push(ValidationError::new(field("name"), "must not be empty"));
        } else if !names.insert(probe.name.as_str()) {
            errors.push(ValidationError::new(
                field("name"),
                format!("duplicate probe name '{}'", probe.name),
            ));
        }
        match Url::parse(&probe.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(ValidationError::new(
                field("url"),
                format!("unsupported scheme '{}'", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(field("url"), e.to_string())),
        }
        if probe.timeout_ms == Some(0) {
            errors.push(ValidationError::new(field("timeout_ms"), "must be greater than 0"));
        }
    }

    let limits = &config.rate_limit;
    if limits.enabled {
        for (field, value) in [
            ("rate_limit.requests_per_minute", limits.requests_per_minute),
            ("rate_limit.requests_per_hour", limits.requests_per_hour),
            ("rate_limit.burst_size", limits.burst_size),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(field, "must be greater than 0"));
            }
        }
        if limits.idle_eviction_secs == 0 {
            errors.push(ValidationError::new("rate_limit.idle_eviction_secs", "must be greater than 0"));
        }
        if limits.cleanup_interval_secs == 0 {
            errors.push(ValidationError::new("rate_limit.cleanup_interval_secs", "must be greater than 0"));
        }
    }

    let obs = &config.observability;
    if !LOG_LEVELS.contains(&obs.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", obs.log_level),
        ));
    }
    if !matches!(obs.log_format.to_ascii_lowercase().as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            "must be 'pretty' or 'json'",
        ));
    }
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", obs.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
