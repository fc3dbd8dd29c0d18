//! Correlation context for inbound requests and outbound calls.
//!
//! # Responsibilities
//! - Generate unique correlation IDs (UUID v7: millisecond clock + random bits)
//! - Accept a caller-supplied `x-correlation-id` when it is well formed
//! - Expose the ID to handlers and to the outbound client
//!
//! # Design Decisions
//! - ID assigned as early as possible (outermost layer) for tracing
//! - IDs are immutable once assigned; handlers only read them
//! - Malformed inbound IDs are replaced, never echoed

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// Header carrying the correlation id in both directions.
pub const X_CORRELATION_ID: HeaderName = HeaderName::from_static("x-correlation-id");

/// Header carrying the ingress-to-response time in seconds.
pub const X_PROCESS_TIME: HeaderName = HeaderName::from_static("x-process-time");

const MAX_INBOUND_LEN: usize = 128;

/// Opaque per-call identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    /// Fresh id from the current time plus randomness.
    pub fn generate() -> Self {
        Self(Arc::from(Uuid::now_v7().hyphenated().to_string()))
    }

    /// Accept an externally supplied id if it is 1..=128 visible ASCII chars.
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_INBOUND_LEN
            && raw.bytes().all(|b| b.is_ascii_graphic());
        valid.then(|| Self(Arc::from(raw)))
    }

    /// Read the id from headers, or mint one when absent or malformed.
    pub fn from_headers_or_generate(headers: &HeaderMap) -> Self {
        headers
            .get(X_CORRELATION_ID)
            .and_then(|v| v.to_str().ok())
            .and_then(Self::parse)
            .unwrap_or_else(Self::generate)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn header_value(&self) -> HeaderValue {
        // Generated and parsed ids are visible ASCII, so this cannot fail.
        HeaderValue::from_str(&self.0).unwrap_or_else(|_| HeaderValue::from_static("invalid"))
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Make sure the request carries a usable correlation id and return it.
///
/// The id is written back to the header map (replacing a malformed one) and
/// stored in the request extensions.
pub fn ensure_correlation_id<B>(request: &mut Request<B>) -> CorrelationId {
    if let Some(existing) = request.extensions().get::<CorrelationId>() {
        return existing.clone();
    }
    let id = CorrelationId::from_headers_or_generate(request.headers());
    request.headers_mut().insert(X_CORRELATION_ID, id.header_value());
    request.extensions_mut().insert(id.clone());
    id
}

/// `MakeRequestId` for tower-http's `SetRequestIdLayer`.
///
/// Only invoked when the header is missing, so valid caller ids survive.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeCorrelationId;

impl MakeRequestId for MakeCorrelationId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        Some(RequestId::new(CorrelationId::generate().header_value()))
    }
}

impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<CorrelationId>() {
            return Ok(id.clone());
        }
        let id = CorrelationId::from_headers_or_generate(&parts.headers);
        parts.extensions.insert(id.clone());
        Ok(id)
    }
}
