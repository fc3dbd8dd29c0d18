//! The closed set of failure kinds understood at the request boundary.
//!
//! # Kinds
//! ```text
//! Validation          400  VALIDATION_ERROR
//! Authentication      401  AUTHENTICATION_ERROR
//! Authorization       403  AUTHORIZATION_ERROR
//! NotFound            404  RESOURCE_NOT_FOUND
//! Conflict            409  CONFLICT_ERROR
//! RateLimited         429  RATE_LIMIT_ERROR
//! Internal            500  INTERNAL_SERVER_ERROR
//! DependencyError     502  EXTERNAL_SERVICE_ERROR
//! Unavailable         503  SERVICE_UNAVAILABLE
//! ConfigurationError  500  CONFIGURATION_ERROR
//! ```
//!
//! # Design Decisions
//! - Status is a pure function of the kind; collaborators cannot override it
//! - Deterministic kinds are never retried by the outbound tier
//! - Anything outside this set is coerced to `Internal` at the boundary

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::Level;

/// Failure category carried by every error that crosses the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authentication,
    Authorization,
    NotFound,
    Conflict,
    RateLimited,
    Internal,
    DependencyError,
    Unavailable,
    ConfigurationError,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [ErrorKind; 10] = [
        ErrorKind::Validation,
        ErrorKind::Authentication,
        ErrorKind::Authorization,
        ErrorKind::NotFound,
        ErrorKind::Conflict,
        ErrorKind::RateLimited,
        ErrorKind::Internal,
        ErrorKind::DependencyError,
        ErrorKind::Unavailable,
        ErrorKind::ConfigurationError,
    ];

    /// HTTP status written for this kind.
    pub const fn status(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::DependencyError => StatusCode::BAD_GATEWAY,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::ConfigurationError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Code used when a constructor does not pick a more specific one.
    pub const fn default_code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Authentication => "AUTHENTICATION_ERROR",
            ErrorKind::Authorization => "AUTHORIZATION_ERROR",
            ErrorKind::NotFound => "RESOURCE_NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT_ERROR",
            ErrorKind::RateLimited => "RATE_LIMIT_ERROR",
            ErrorKind::Internal => "INTERNAL_SERVER_ERROR",
            ErrorKind::DependencyError => "EXTERNAL_SERVICE_ERROR",
            ErrorKind::Unavailable => "SERVICE_UNAVAILABLE",
            ErrorKind::ConfigurationError => "CONFIGURATION_ERROR",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Authorization => "authorization",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Internal => "internal",
            ErrorKind::DependencyError => "dependency_error",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::ConfigurationError => "configuration_error",
        }
    }

    /// Kinds whose outcome does not change when the call is repeated.
    pub const fn is_deterministic(self) -> bool {
        matches!(
            self,
            ErrorKind::Validation
                | ErrorKind::Authentication
                | ErrorKind::Authorization
                | ErrorKind::NotFound
                | ErrorKind::Conflict
                | ErrorKind::ConfigurationError
        )
    }

    /// Kinds whose outward message is replaced in restrictive mode.
    pub const fn hides_message(self) -> bool {
        matches!(self, ErrorKind::Internal | ErrorKind::ConfigurationError)
    }

    /// Severity of the boundary log event for this kind.
    pub const fn log_level(self) -> Level {
        match self {
            ErrorKind::Validation | ErrorKind::NotFound => Level::INFO,
            ErrorKind::Internal | ErrorKind::ConfigurationError => Level::ERROR,
            _ => Level::WARN,
        }
    }

    /// Rebuild a kind from a remote status code.
    ///
    /// 500 maps to `Internal`: the wire format cannot distinguish it from
    /// `ConfigurationError`. Returns `None` for non-error statuses.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            400 | 422 => Some(ErrorKind::Validation),
            401 => Some(ErrorKind::Authentication),
            403 => Some(ErrorKind::Authorization),
            404 => Some(ErrorKind::NotFound),
            409 => Some(ErrorKind::Conflict),
            429 => Some(ErrorKind::RateLimited),
            502 | 504 => Some(ErrorKind::DependencyError),
            503 => Some(ErrorKind::Unavailable),
            500..=599 => Some(ErrorKind::Internal),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
