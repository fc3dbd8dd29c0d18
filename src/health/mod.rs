//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Collaborators (startup, config):
//!     register_probe(name, critical, timeout, probe)
//!     → aggregator.rs registry
//!
//! Operator / load balancer:
//!     GET /health (handlers.rs)
//!     → aggregator.rs check_all (concurrent, bounded)
//!     → probe.rs results
//!     → one status: healthy | degraded | unhealthy
//! ```
//!
//! # Design Decisions
//! - Criticality decides whether a failing dependency takes the service down
//! - Probes own their dependency; the aggregator only bounds and combines them
//! - No state is kept between checks

pub mod aggregator;
pub mod handlers;
pub mod probe;

pub use aggregator::{compute_status, AggregateHealth, HealthAggregator, ProbeInfo};
pub use handlers::HealthResponse;
pub use probe::{HealthProbe, HealthStatus, HttpProbe, ProbeError, ProbeResult};
