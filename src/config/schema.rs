//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server settings.
    pub server: ServerConfig,

    /// Deployment identity and exposure mode.
    pub app: AppSection,

    /// Outbound retry defaults.
    pub retries: RetryConfig,

    /// Dependency probes.
    pub health: HealthConfig,

    /// Per-client request budgets.
    pub rate_limit: RateLimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Request timeout measured from ingress, in seconds.
    pub request_timeout_secs: u64,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            request_timeout_secs: 30,
            max_body_bytes: 1_000_000,
        }
    }
}

/// Deployment identity.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AppSection {
    /// Environment name reported by the health endpoint.
    pub environment: String,

    /// Version reported by the health endpoint.
    pub version: String,

    /// Debug mode exposes error context/details to callers.
    pub debug: bool,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            debug: false,
        }
    }
}

/// Retry configuration for outbound calls.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries for idempotent calls.
    pub enabled: bool,

    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Delay before the second attempt, in milliseconds.
    pub base_delay_ms: u64,

    /// Growth factor applied to each further delay.
    pub backoff_multiplier: f64,

    /// Upper bound on a single delay, in milliseconds (0 = uncapped).
    pub max_delay_ms: u64,

    /// Random extra delay as a fraction of the computed delay (0.0 - 1.0).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            base_delay_ms: 1000,
            backoff_multiplier: 1.5,
            max_delay_ms: 0,
            jitter: 0.0,
        }
    }
}

/// Health aggregation settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    /// Timeout used for probes that do not declare one, in milliseconds.
    pub default_timeout_ms: u64,

    /// Upper bound for a whole aggregate check, in milliseconds (0 = none).
    /// Probes still running when it elapses are recorded unhealthy.
    pub aggregate_timeout_ms: u64,

    /// HTTP probes registered at startup.
    pub probes: Vec<ProbeConfig>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 5000,
            aggregate_timeout_ms: 3000,
            probes: Vec::new(),
        }
    }
}

/// One HTTP dependency probe.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProbeConfig {
    /// Probe name (key in the health document).
    pub name: String,

    /// URL fetched with GET.
    pub url: String,

    /// Whether an unhealthy result makes the whole service unhealthy.
    #[serde(default)]
    pub critical: bool,

    /// Probe timeout in milliseconds; falls back to `health.default_timeout_ms`.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Per-client rate limiting at the edge.
///
/// Every budget is a token bucket refilled continuously; a request needs one
/// token from each.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,

    /// Requests per client per minute.
    pub requests_per_minute: u32,

    /// Requests per client per hour.
    pub requests_per_hour: u32,

    /// Requests per client within one second.
    pub burst_size: u32,

    /// Paths never limited (exact match).
    pub exempt_paths: Vec<String>,

    /// Key clients by `X-Forwarded-For` / `X-Real-IP` instead of the peer
    /// address. Only safe behind a proxy that sets these headers.
    pub trust_forwarded_for: bool,

    /// Clients unseen for this long are forgotten, in seconds.
    pub idle_eviction_secs: u64,

    /// How often idle clients are swept, in seconds.
    pub cleanup_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 60,
            requests_per_hour: 1000,
            burst_size: 10,
            exempt_paths: vec!["/health".to_string(), "/health/live".to_string()],
            trust_forwarded_for: false,
            idle_eviction_secs: 3600,
            cleanup_interval_secs: 300,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
