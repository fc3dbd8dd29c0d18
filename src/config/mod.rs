//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + EDGE_* environment overrides
//!     → loader.rs (parse, deserialize, override)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → shared via Arc<ArcSwap<AppConfig>> with the server
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap; next request sees the new config
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::ConfigError;
pub use schema::{
    AppConfig, AppSection, HealthConfig, ObservabilityConfig, ProbeConfig, RateLimitConfig,
    RetryConfig, ServerConfig,
};
