//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → every subscriber wakes
//!     → HTTP server stops accepting and drains in-flight requests
//!     → pending outbound retries are cancelled
//! ```
//!
//! # Design Decisions
//! - One broadcast coordinator; components subscribe instead of polling flags
//! - Outbound retry delays race the shutdown signal

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{spawn_signal_listener, wait_for_signal};
