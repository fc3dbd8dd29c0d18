//! Response rendering for classified failures.
//!
//! # Responsibilities
//! - Render an `ErrorRecord` into status + JSON envelope + headers
//! - Stamp correlation and process-time headers on every response
//!
//! # Design Decisions
//! - Status always comes from the record's kind, never from the collaborator
//! - Exposure (debug vs restrictive) decided here, after logging has the full record

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::time::Duration;

use crate::errors::{ErrorEnvelope, ErrorKind, ErrorRecord, Exposure};
use crate::http::request::{CorrelationId, X_CORRELATION_ID, X_PROCESS_TIME};

/// Build the outward response for a record.
pub fn respond(record: &ErrorRecord, exposure: Exposure) -> Response {
    let status = StatusCode::from_u16(record.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let envelope = ErrorEnvelope::from_record(record, exposure);
    let mut response = (status, Json(envelope)).into_response();

    if matches!(record.kind, ErrorKind::RateLimited | ErrorKind::Unavailable) {
        if let Some(secs) = record.context.get("retry_after").and_then(|v| v.as_u64()) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
    }
    response
}

/// Add `x-correlation-id` and `x-process-time` to a response.
pub fn stamp_headers(response: &mut Response, correlation_id: &CorrelationId, elapsed: Duration) {
    let headers = response.headers_mut();
    headers.insert(X_CORRELATION_ID, correlation_id.header_value());
    if let Ok(value) = HeaderValue::from_str(&format!("{:.6}", elapsed.as_secs_f64())) {
        headers.insert(X_PROCESS_TIME, value);
    }
}
