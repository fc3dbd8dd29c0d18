//! Typed failures raised by collaborators.
//!
//! Business handlers return `Result<_, ApiError>`. The error turns itself into
//! a tagged response; the boundary middleware finishes it into the standard
//! envelope once the correlation id, path and timing are known.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::errors::envelope::Failure;
use crate::errors::taxonomy::ErrorKind;

/// One violated rule on one input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
}

impl FieldError {
    pub fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        error_type: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            error_type: error_type.into(),
        }
    }
}

/// A failure already classified into the taxonomy.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    kind: ErrorKind,
    code: String,
    message: String,
    context: Map<String, Value>,
    details: Vec<FieldError>,
}

impl ApiError {
    /// Build an error with an explicit code.
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            context: Map::new(),
            details: Vec::new(),
        }
    }

    /// Build an error using the kind's default code.
    pub fn of_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, kind.default_code(), message)
    }

    pub fn validation(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::of_kind(ErrorKind::Validation, message).with_optional_context("field", field)
    }

    /// Validation failure carrying one entry per violated rule.
    pub fn validation_details(message: impl Into<String>, details: Vec<FieldError>) -> Self {
        let mut err = Self::of_kind(ErrorKind::Validation, message);
        err.details = details;
        err
    }

    pub fn authentication(message: Option<&str>) -> Self {
        Self::of_kind(
            ErrorKind::Authentication,
            message.unwrap_or("Authentication failed"),
        )
    }

    pub fn authorization(message: Option<&str>) -> Self {
        Self::of_kind(
            ErrorKind::Authorization,
            message.unwrap_or("Insufficient permissions"),
        )
    }

    /// Missing resource. The code is derived from the resource type,
    /// e.g. `Integration` becomes `INTEGRATION_NOT_FOUND`.
    pub fn not_found(resource_type: &str, resource_id: Option<&str>) -> Self {
        let mut message = format!("{resource_type} not found");
        if let Some(id) = resource_id {
            message.push_str(&format!(" (ID: {id})"));
        }
        let code = match screaming_snake(resource_type) {
            prefix if prefix.is_empty() => ErrorKind::NotFound.default_code().to_string(),
            prefix => format!("{prefix}_NOT_FOUND"),
        };
        Self::new(ErrorKind::NotFound, code, message)
            .with_context("resource_type", resource_type)
            .with_optional_context("resource_id", resource_id)
    }

    pub fn conflict(message: impl Into<String>, resource_type: Option<&str>) -> Self {
        Self::of_kind(ErrorKind::Conflict, message)
            .with_optional_context("resource_type", resource_type)
    }

    pub fn rate_limited(retry_after_secs: Option<u64>) -> Self {
        Self::of_kind(ErrorKind::RateLimited, "Rate limit exceeded")
            .with_optional_context("retry_after", retry_after_secs)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::of_kind(ErrorKind::Internal, message)
    }

    pub fn database(message: impl Into<String>, operation: Option<&str>) -> Self {
        Self::new(ErrorKind::Internal, "DATABASE_ERROR", message)
            .with_optional_context("operation", operation)
    }

    /// Failure of an external platform or infrastructure client.
    pub fn dependency(service_name: &str, message: Option<&str>) -> Self {
        let message = match message {
            Some(m) => m.to_string(),
            None => format!("{service_name} service is currently unavailable"),
        };
        Self::of_kind(ErrorKind::DependencyError, message)
            .with_context("service_name", service_name)
    }

    pub fn unavailable(message: Option<&str>, retry_after_secs: Option<u64>) -> Self {
        Self::of_kind(
            ErrorKind::Unavailable,
            message.unwrap_or("Service temporarily unavailable"),
        )
        .with_optional_context("retry_after", retry_after_secs)
    }

    pub fn configuration(message: impl Into<String>, config_key: Option<&str>) -> Self {
        Self::of_kind(ErrorKind::ConfigurationError, message)
            .with_optional_context("config_key", config_key)
    }

    /// Attach a context entry. Existing keys are overwritten.
    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    fn with_optional_context<V: Into<Value>>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with_context(key, v),
            None => self,
        }
    }

    pub fn with_detail(mut self, detail: FieldError) -> Self {
        self.details.push(detail);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    pub fn details(&self) -> &[FieldError] {
        &self.details
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }

    /// Seconds the caller should wait, when the error advertises one.
    pub fn retry_after(&self) -> Option<u64> {
        self.context.get("retry_after").and_then(Value::as_u64)
    }

    /// A code is well formed when it is non-empty upper snake case.
    pub fn has_valid_code(&self) -> bool {
        !self.code.is_empty()
            && self
                .code
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = self.status().into_response();
        response.extensions_mut().insert(Failure::Api(self));
        response
    }
}

/// `"Integration"` → `"INTEGRATION"`, `"UserProfile"` → `"USER_PROFILE"`,
/// `"api key"` → `"API_KEY"`.
fn screaming_snake(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 4);
    let mut prev_lower = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if ch.is_ascii_uppercase() && prev_lower {
                out.push('_');
            }
            out.push(ch.to_ascii_uppercase());
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        } else {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    out.trim_end_matches('_').to_string()
}
