//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Boundary, retry executor, health aggregator produce:
//!     → logging.rs (structured events via the injected Logger)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → tracing subscriber (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Correlation ID is a field on every request-scoped event
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, EventSink, LogEvent, Logger, MemorySink, TracingSink};
