//! Error taxonomy subsystem.
//!
//! # Data Flow
//! ```text
//! Collaborator handler
//!     → returns ApiError (api_error.rs), kind from taxonomy.rs
//!     → boundary middleware wraps it as a Failure
//!     → envelope.rs classifies into an ErrorRecord and renders the envelope
//! ```
//!
//! # Design Decisions
//! - Failures are ordinary values, never unwinding control flow
//! - The kind set is closed; unknown failures collapse to Internal
//! - Records keep full detail; exposure is decided only when rendering

pub mod api_error;
pub mod envelope;
pub mod taxonomy;

pub use api_error::{ApiError, FieldError};
pub use envelope::{classify, ErrorEnvelope, ErrorRecord, Exposure, Failure, RequestMeta};
pub use taxonomy::ErrorKind;
