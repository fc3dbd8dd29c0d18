//! Classification of failures into `ErrorRecord`s and the wire envelope.
//!
//! # Data Flow
//! ```text
//! Failure (tagged ApiError | framework rejection | unclassified text)
//!     → classify() + RequestMeta (correlation id, path, timestamp)
//!     → ErrorRecord (full detail, logged as-is)
//!     → ErrorEnvelope::from_record(exposure) (what the caller sees)
//! ```

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::errors::api_error::{ApiError, FieldError};
use crate::errors::taxonomy::ErrorKind;
use crate::http::request::CorrelationId;

/// Code substituted when a tagged error is malformed.
pub const UNCLASSIFIED_CODE: &str = "UNCLASSIFIED_ERROR";

/// Message shown for hidden internal failures in restrictive mode.
pub const GENERIC_MESSAGE: &str = "An unexpected error occurred";

/// Raw input to the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// A failure a collaborator already placed in the taxonomy.
    Api(ApiError),
    /// An untagged 4xx the framework produced (405, 413...). Keeps its status.
    Rejected { status: u16, message: String },
    /// Anything else: panics, bare 5xx responses, foreign errors.
    Unclassified { source: String, message: String },
}

impl Failure {
    pub fn unclassified(source: impl Into<String>, message: impl Into<String>) -> Self {
        Failure::Unclassified {
            source: source.into(),
            message: message.into(),
        }
    }
}

/// `Method Not Allowed` → `METHOD_NOT_ALLOWED`.
fn reason_code(status: u16, reason: &str) -> String {
    if reason.is_empty() {
        return format!("HTTP_{status}");
    }
    reason
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

impl From<ApiError> for Failure {
    fn from(err: ApiError) -> Self {
        Failure::Api(err)
    }
}

/// Per-request facts the classifier stamps onto the record.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub correlation_id: CorrelationId,
    pub path: String,
    pub timestamp: f64,
}

impl RequestMeta {
    pub fn new(correlation_id: CorrelationId, path: impl Into<String>) -> Self {
        Self {
            correlation_id,
            path: path.into(),
            timestamp: unix_timestamp(),
        }
    }
}

/// How much of a record the caller may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exposure {
    /// Development: context and details are returned.
    Debug,
    /// Production: context/details stripped, internal messages generic.
    Restrictive,
}

impl Exposure {
    pub fn from_debug_flag(debug: bool) -> Self {
        if debug {
            Exposure::Debug
        } else {
            Exposure::Restrictive
        }
    }
}

/// Fully classified failure. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub code: String,
    pub http_status: u16,
    pub message: String,
    pub context: Map<String, Value>,
    pub details: Vec<FieldError>,
    pub correlation_id: String,
    pub timestamp: f64,
    pub path: String,
}

/// Turn any failure into a record. Never panics; malformed input degrades to
/// an `Internal` record with a synthetic code.
pub fn classify(failure: &Failure, meta: &RequestMeta) -> ErrorRecord {
    let mut http_status = None;
    let (kind, code, message, context, details) = match failure {
        Failure::Api(err) if err.has_valid_code() => (
            err.kind(),
            err.code().to_string(),
            err.message().to_string(),
            err.context().clone(),
            err.details().to_vec(),
        ),
        Failure::Api(err) => {
            let mut context = err.context().clone();
            context.insert("original_kind".into(), Value::from(err.kind().as_str()));
            context.insert("original_code".into(), Value::from(err.code()));
            context.insert("error".into(), Value::from(err.message()));
            (
                ErrorKind::Internal,
                UNCLASSIFIED_CODE.to_string(),
                GENERIC_MESSAGE.to_string(),
                context,
                err.details().to_vec(),
            )
        }
        Failure::Rejected { status, message } => {
            let reason = StatusCode::from_u16(*status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or_default();
            let (kind, code) = match ErrorKind::from_status(*status) {
                Some(kind) => (kind, kind.default_code().to_string()),
                None => (ErrorKind::Validation, reason_code(*status, reason)),
            };
            let mut context = Map::new();
            context.insert("http_status".into(), Value::from(*status));
            if !reason.is_empty() {
                context.insert("reason".into(), Value::from(reason));
            }
            if !message.is_empty() {
                context.insert("error".into(), Value::from(message.as_str()));
            }
            http_status = Some(*status);
            let message = if reason.is_empty() {
                format!("Request rejected with HTTP {status}")
            } else {
                reason.to_string()
            };
            (kind, code, message, context, Vec::new())
        }
        Failure::Unclassified { source, message } => {
            let mut context = Map::new();
            context.insert("source".into(), Value::from(source.as_str()));
            context.insert("error".into(), Value::from(message.as_str()));
            (
                ErrorKind::Internal,
                ErrorKind::Internal.default_code().to_string(),
                GENERIC_MESSAGE.to_string(),
                context,
                Vec::new(),
            )
        }
    };

    ErrorRecord {
        kind,
        code,
        http_status: http_status.unwrap_or_else(|| kind.status().as_u16()),
        message,
        context,
        details,
        correlation_id: meta.correlation_id.to_string(),
        timestamp: meta.timestamp,
        path: meta.path.clone(),
    }
}

/// `{"error": {...}}` as written on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub correlation_id: String,
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

impl ErrorEnvelope {
    pub fn from_record(record: &ErrorRecord, exposure: Exposure) -> Self {
        let (message, context, details) = match exposure {
            Exposure::Debug => (
                record.message.clone(),
                non_empty(record.context.clone(), Map::is_empty),
                non_empty(record.details.clone(), Vec::is_empty),
            ),
            Exposure::Restrictive => {
                let message = if record.kind.hides_message() {
                    GENERIC_MESSAGE.to_string()
                } else {
                    record.message.clone()
                };
                (message, None, None)
            }
        };

        Self {
            error: ErrorBody {
                code: record.code.clone(),
                message,
                correlation_id: record.correlation_id.clone(),
                timestamp: record.timestamp,
                path: record.path.clone(),
                context,
                details,
            },
        }
    }

    /// Rebuild a typed error from a remote envelope (client tier).
    pub fn into_api_error(self, status: u16) -> ApiError {
        let kind = ErrorKind::from_status(status).unwrap_or(ErrorKind::Internal);
        let body = self.error;
        let mut err = ApiError::new(kind, body.code, body.message);
        for (key, value) in body.context.unwrap_or_default() {
            err = err.with_context(&key, value);
        }
        if !body.correlation_id.is_empty() {
            err = err.with_context("remote_correlation_id", body.correlation_id);
        }
        for detail in body.details.unwrap_or_default() {
            err = err.with_detail(detail);
        }
        err
    }
}

fn non_empty<T>(value: T, is_empty: fn(&T) -> bool) -> Option<T> {
    if is_empty(&value) {
        None
    } else {
        Some(value)
    }
}

/// Seconds since the Unix epoch with sub-second precision.
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
