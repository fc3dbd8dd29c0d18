//! Resilience subsystem for outbound calls.
//!
//! # Data Flow
//! ```text
//! Outbound call (http::client or any async closure)
//!     → retries.rs (run attempt, classify failure via RetryOutcome)
//!     → retryable and attempts left? backoff.rs computes the delay
//!     → sleep (raced against cancellation) → next attempt
//!     → success | RetryError::Exhausted | RetryError::Cancelled
//! ```
//!
//! # Design Decisions
//! - Retries only for idempotent requests (GET, HEAD, etc.) unless opted in
//! - Deterministic failures (bad input, auth, missing resource) are final
//! - Every delay can be interrupted by the caller

pub mod backoff;
pub mod retries;

pub use retries::{
    default_retry_predicate, RetryError, RetryExecutor, RetryOutcome, RetryPolicy,
};
