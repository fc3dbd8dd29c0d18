//! Boundary middleware.
//!
//! Wraps every route. Turns whatever the inner stack produced into either the
//! untouched success response or the standard error envelope, then stamps the
//! correlation and timing headers.
//!
//! # Data Flow
//! ```text
//! request
//!     → ensure_correlation_id (header + extension)
//!     → inner service under the request timeout
//!     → Failure tag on the response? untagged 4xx/5xx?
//!         yes → classify → log once → respond(exposure)
//!         no  → pass through
//!     → x-correlation-id, x-process-time
//! ```

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time;
use tracing::Level;

use crate::config::AppConfig;
use crate::errors::{classify, ApiError, ErrorRecord, Exposure, Failure, RequestMeta};
use crate::http::request::{ensure_correlation_id, CorrelationId};
use crate::http::response::{respond, stamp_headers};
use crate::observability::metrics;
use crate::observability::{LogEvent, Logger};

/// How much of an untagged error body is kept for the log.
const UNTAGGED_BODY_LIMIT: usize = 16 * 1024;

/// Shared state for the boundary layer.
#[derive(Debug, Clone)]
pub struct BoundaryState {
    pub config: Arc<ArcSwap<AppConfig>>,
    pub logger: Logger,
}

impl BoundaryState {
    pub fn new(config: Arc<ArcSwap<AppConfig>>, logger: Logger) -> Self {
        Self { config, logger }
    }
}

/// `axum::middleware::from_fn_with_state` entry point.
pub async fn boundary(
    State(state): State<BoundaryState>,
    mut request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let correlation_id = ensure_correlation_id(&mut request);
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let config = state.config.load_full();
    let timeout = Duration::from_secs(config.server.request_timeout_secs);

    let response = match time::timeout(timeout, next.run(request)).await {
        Ok(response) => response,
        Err(_) => ApiError::unavailable(Some("Request timed out"), None)
            .with_context("timeout_secs", config.server.request_timeout_secs)
            .into_response(),
    };

    let (mut response, record) = match take_failure(response).await {
        (response, None) => (response, None),
        (original, Some(failure)) => {
            let meta = RequestMeta::new(correlation_id.clone(), path.as_str());
            let record = classify(&failure, &meta);
            let exposure = Exposure::from_debug_flag(config.app.debug);
            let mut response = respond(&record, exposure);
            carry_headers(original.headers(), response.headers_mut());
            (response, Some(record))
        }
    };

    let elapsed = started.elapsed();
    stamp_headers(&mut response, &correlation_id, elapsed);
    metrics::record_request(&method, response.status().as_u16(), started);

    match record {
        Some(record) => log_failure(&state.logger, &record, &method, elapsed),
        None => log_success(&state.logger, &correlation_id, &method, &path, &response, elapsed),
    }
    response
}

/// Split a response into itself and the failure it reports, if any.
///
/// Tagged responses always report one. Untagged 4xx come from the framework
/// (method not allowed, payload too large...) and report a rejection that
/// keeps their status. Untagged 5xx report an unclassified failure carrying
/// their body text.
async fn take_failure(mut response: Response) -> (Response, Option<Failure>) {
    if let Some(failure) = response.extensions_mut().remove::<Failure>() {
        return (response, Some(failure));
    }
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return (response, None);
    }

    let (parts, body) = response.into_parts();
    let text = match axum::body::to_bytes(body, UNTAGGED_BODY_LIMIT).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
        Err(_) => String::new(),
    };
    let response = Response::from_parts(parts, Body::empty());
    let failure = if status.is_client_error() {
        Failure::Rejected {
            status: status.as_u16(),
            message: text,
        }
    } else if text.is_empty() {
        Failure::unclassified(
            format!("http_{}", status.as_u16()),
            format!("HTTP {} returned without an error body", status.as_u16()),
        )
    } else {
        Failure::unclassified(format!("http_{}", status.as_u16()), text)
    };
    (response, Some(failure))
}

/// Keep headers the inner stack set (`Allow`, `X-RateLimit-*`...) on the
/// envelope response. Body framing and anything `respond` wrote win.
fn carry_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for name in from.keys() {
        if name == header::CONTENT_TYPE || name == header::CONTENT_LENGTH || to.contains_key(name) {
            continue;
        }
        for value in from.get_all(name) {
            to.append(name.clone(), value.clone());
        }
    }
}

fn log_failure(logger: &Logger, record: &ErrorRecord, method: &str, elapsed: Duration) {
    metrics::record_error(record.kind, &record.code);

    let mut event = LogEvent::new(record.kind.log_level(), "Request failed")
        .field("kind", record.kind.as_str())
        .field("code", record.code.as_str())
        .field("status", record.http_status)
        .field("message", record.message.as_str())
        .field("method", method)
        .field("path", record.path.as_str())
        .field("elapsed_ms", elapsed_ms(elapsed));
    event.correlation_id = Some(record.correlation_id.clone());
    if !record.context.is_empty() {
        event = event.field("context", Value::Object(record.context.clone()));
    }
    if !record.details.is_empty() {
        event = event.field(
            "details",
            serde_json::to_value(&record.details).unwrap_or(Value::Null),
        );
    }
    logger.emit(event);
}

fn log_success(
    logger: &Logger,
    correlation_id: &CorrelationId,
    method: &str,
    path: &str,
    response: &Response,
    elapsed: Duration,
) {
    let status = response.status();
    let level = if status.is_client_error() {
        Level::INFO
    } else {
        Level::DEBUG
    };
    logger.emit(
        LogEvent::new(level, "Request completed")
            .correlation(correlation_id)
            .field("method", method)
            .field("path", path)
            .field("status", status.as_u16())
            .field("elapsed_ms", elapsed_ms(elapsed)),
    );
}

fn elapsed_ms(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}
