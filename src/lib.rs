//! Request-boundary resilience and observability layer.
//!
//! Correlation ids, a closed error taxonomy rendered as one JSON envelope,
//! outbound retries with backoff, per-client rate limiting and multi-probe
//! health aggregation.

pub mod config;
pub mod errors;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::AppConfig;
pub use errors::{ApiError, ErrorKind};
pub use health::HealthAggregator;
pub use http::{AppState, CorrelationId, HttpServer};
pub use lifecycle::Shutdown;
pub use observability::Logger;
pub use resilience::{RetryExecutor, RetryPolicy};
