//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound:
//!     TCP connection
//!     → server.rs (router, layers, graceful shutdown)
//!     → request.rs (correlation id assigned or propagated)
//!     → middleware/boundary.rs (timeout, failure classification, logging)
//!     → collaborator handler (validation.rs for JSON bodies)
//!     → response.rs (envelope, correlation + timing headers)
//!
//! Outbound:
//!     collaborator → client.rs (correlation header, retries, envelope decode)
//! ```

pub mod client;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;
pub mod validation;

pub use client::{OutboundClient, OutboundError, OutboundResponse, RequestOptions};
pub use request::{CorrelationId, X_CORRELATION_ID, X_PROCESS_TIME};
pub use server::{build_router, AppState, HttpServer};
pub use validation::{BodyRejection, ValidatedJson};
