//! Declarative request validation.
//!
//! `ValidatedJson<T>` deserializes the body and runs `T`'s `validator` rules.
//! Every failure becomes a `Validation` error whose details list one entry per
//! violated rule, sorted by field path. Transport refusals (a body over the
//! size limit, an unreadable stream) keep the status the framework gave them.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use crate::errors::{ApiError, FieldError};

/// JSON body extractor that also enforces validation rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = BodyRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(BodyRejection::from)?;
        value
            .validate()
            .map_err(|errors| BodyRejection::Invalid(validation_error(&errors)))?;
        Ok(ValidatedJson(value))
    }
}

/// Why `ValidatedJson` refused a request.
#[derive(Debug)]
pub enum BodyRejection {
    /// The body was read but is not acceptable: bad JSON, wrong content type,
    /// or broken rules.
    Invalid(ApiError),
    /// The body could not be read at all. Answered with the rejection's own
    /// status (413 for an oversized body).
    Transport(JsonRejection),
}

impl BodyRejection {
    pub fn status(&self) -> StatusCode {
        match self {
            BodyRejection::Invalid(err) => err.status(),
            BodyRejection::Transport(rejection) => rejection.status(),
        }
    }

    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            BodyRejection::Invalid(err) => Some(err),
            BodyRejection::Transport(_) => None,
        }
    }
}

impl From<JsonRejection> for BodyRejection {
    fn from(rejection: JsonRejection) -> Self {
        let error_type = match rejection {
            JsonRejection::BytesRejection(_) => return BodyRejection::Transport(rejection),
            JsonRejection::MissingJsonContentType(_) => "content_type_invalid",
            _ => "json_invalid",
        };
        BodyRejection::Invalid(ApiError::validation_details(
            "Request body is not valid JSON",
            vec![FieldError::new("body", rejection.body_text(), error_type)],
        ))
    }
}

impl IntoResponse for BodyRejection {
    fn into_response(self) -> Response {
        match self {
            BodyRejection::Invalid(err) => err.into_response(),
            BodyRejection::Transport(rejection) => rejection.into_response(),
        }
    }
}

/// Flatten `validator` output into sorted field details.
pub fn validation_error(errors: &ValidationErrors) -> ApiError {
    let mut details = Vec::new();
    collect(None, errors, &mut details);
    details.sort_by(|a, b| a.field.cmp(&b.field));
    ApiError::validation_details("Request validation failed", details)
}

fn collect(prefix: Option<&str>, errors: &ValidationErrors, out: &mut Vec<FieldError>) {
    for (field, kind) in errors.errors() {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{field}"),
            None => field.to_string(),
        };
        match kind {
            ValidationErrorsKind::Field(rules) => {
                for rule in rules {
                    let message = rule
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("failed '{}' rule", rule.code));
                    out.push(FieldError::new(path.clone(), message, rule.code.to_string()));
                }
            }
            ValidationErrorsKind::Struct(inner) => collect(Some(&path), inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect(Some(&format!("{path}[{index}]")), inner, out);
                }
            }
        }
    }
}
