//! Outbound HTTP client.
//!
//! # Responsibilities
//! - Send requests to a dependency with the caller's correlation id
//! - Retry transient failures through `RetryExecutor`
//! - Rebuild typed errors from remote error envelopes
//!
//! # Data Flow
//! ```text
//! collaborator → OutboundClient::send(method, path, body, options)
//!     → RetryPolicy (method + options.idempotent + RetryConfig)
//!     → RetryExecutor (attempt → reqwest → decode)
//!     → OutboundResponse | OutboundError
//! ```

use axum::http::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::{ConfigError, RetryConfig};
use crate::errors::{ApiError, ErrorEnvelope, ErrorKind};
use crate::http::request::{CorrelationId, X_CORRELATION_ID};
use crate::observability::Logger;
use crate::resilience::{RetryError, RetryExecutor, RetryOutcome, RetryPolicy};

/// Errors returned by the outbound client.
#[derive(Debug, Error)]
pub enum OutboundError {
    /// No response was received.
    #[error("network error calling {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success response without an error envelope.
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16, body: String },

    /// Non-success response carrying an error envelope.
    #[error("{url} returned HTTP {status}: {error}")]
    Remote {
        url: String,
        status: u16,
        error: ApiError,
    },

    /// Success response whose body could not be decoded.
    #[error("invalid response body from {url}: {message}")]
    Decode { url: String, message: String },

    /// Every permitted attempt failed.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<OutboundError>,
    },

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("client setup failed: {0}")]
    Setup(String),

    #[error(transparent)]
    Policy(#[from] ConfigError),
}

impl OutboundError {
    /// Status of the final response, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            OutboundError::Status { status, .. } | OutboundError::Remote { status, .. } => {
                Some(*status)
            }
            OutboundError::Exhausted { last, .. } => last.status(),
            _ => None,
        }
    }

    /// Body of the final response, if one was received.
    pub fn body(&self) -> Option<&str> {
        match self {
            OutboundError::Status { body, .. } => Some(body),
            OutboundError::Exhausted { last, .. } => last.body(),
            _ => None,
        }
    }

    /// Attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            OutboundError::Exhausted { attempts, .. } => *attempts,
            _ => 1,
        }
    }

    /// The error the remote service reported, when it sent an envelope.
    pub fn remote(&self) -> Option<&ApiError> {
        match self {
            OutboundError::Remote { error, .. } => Some(error),
            OutboundError::Exhausted { last, .. } => last.remote(),
            _ => None,
        }
    }

    /// Classify as a `DependencyError` for the inbound boundary.
    pub fn into_api_error(self, service_name: &str) -> ApiError {
        let attempts = self.attempts();
        let status = self.status();
        let remote_code = self.remote().map(|e| e.code().to_string());
        let message = self.to_string();

        let mut err = ApiError::dependency(service_name, None)
            .with_context("attempts", attempts)
            .with_context("error", message);
        if let Some(status) = status {
            err = err.with_context("upstream_status", status);
        }
        if let Some(code) = remote_code {
            err = err.with_context("upstream_code", code);
        }
        err
    }
}

impl RetryOutcome for OutboundError {
    fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            OutboundError::Remote { error, .. } => Some(error.kind()),
            OutboundError::Exhausted { last, .. } => last.error_kind(),
            OutboundError::Decode { .. }
            | OutboundError::InvalidUrl(_)
            | OutboundError::Setup(_)
            | OutboundError::Policy(_) => Some(ErrorKind::ConfigurationError),
            _ => None,
        }
    }

    fn status(&self) -> Option<u16> {
        OutboundError::status(self)
    }

    fn is_network(&self) -> bool {
        match self {
            OutboundError::Network { .. } => true,
            OutboundError::Exhausted { last, .. } => last.is_network(),
            _ => false,
        }
    }
}

impl From<OutboundError> for ApiError {
    fn from(err: OutboundError) -> Self {
        err.into_api_error("upstream")
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    idempotent: Option<bool>,
    correlation_id: Option<CorrelationId>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the method-based retry decision. `true` opts a POST/PATCH/DELETE
    /// into retries; `false` disables them for a safe method.
    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = Some(idempotent);
        self
    }

    /// Propagate the inbound request's id instead of minting a new one.
    pub fn correlation(mut self, id: &CorrelationId) -> Self {
        self.correlation_id = Some(id.clone());
        self
    }
}

/// Decoded success response.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundResponse {
    pub status: u16,
    pub body: Value,
}

/// HTTP client for one dependency.
#[derive(Debug, Clone)]
pub struct OutboundClient {
    http: reqwest::Client,
    base_url: Url,
    retry: RetryConfig,
    executor: RetryExecutor,
}

impl OutboundClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        retry: RetryConfig,
        logger: Logger,
    ) -> Result<Self, OutboundError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OutboundError::Setup(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            retry,
            executor: RetryExecutor::new(logger),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, OutboundError> {
        let response = self.send(Method::GET, path, None, options).await?;
        self.decode(path, response)
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, OutboundError> {
        let body = serde_json::to_value(body).map_err(|e| OutboundError::Decode {
            url: path.to_string(),
            message: e.to_string(),
        })?;
        let response = self.send(Method::POST, path, Some(body), options).await?;
        self.decode(path, response)
    }

    pub async fn delete(&self, path: &str, options: RequestOptions) -> Result<(), OutboundError> {
        self.send(Method::DELETE, path, None, options).await.map(|_| ())
    }

    /// Send a request, retrying per the method and options.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<OutboundResponse, OutboundError> {
        let url = self.base_url.join(path.trim_start_matches('/'))?;
        let policy = match options.idempotent {
            Some(true) => RetryPolicy::from_config(&self.retry)?,
            Some(false) => RetryPolicy::none(),
            None => RetryPolicy::for_method(&method, &self.retry)?,
        };
        let correlation_id = options
            .correlation_id
            .unwrap_or_else(CorrelationId::generate);

        let result = self
            .executor
            .execute(
                |_| self.attempt(method.clone(), url.clone(), body.as_ref(), &correlation_id),
                &policy,
            )
            .await;

        match result {
            Ok(response) => Ok(response),
            Err(RetryError::Exhausted { attempts, last }) if attempts > 1 => {
                Err(OutboundError::Exhausted {
                    attempts,
                    last: Box::new(last),
                })
            }
            Err(err) => Err(err
                .into_last()
                .unwrap_or_else(|| OutboundError::Setup("call cancelled".to_string()))),
        }
    }

    async fn attempt(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        correlation_id: &CorrelationId,
    ) -> Result<OutboundResponse, OutboundError> {
        let url_text = url.to_string();
        let mut request = self
            .http
            .request(method, url)
            .header(X_CORRELATION_ID, correlation_id.header_value());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|source| OutboundError::Network {
            url: url_text.clone(),
            source,
        })?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|source| OutboundError::Network {
            url: url_text.clone(),
            source,
        })?;

        if (200..300).contains(&status) {
            let body = if text.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&text).map_err(|e| OutboundError::Decode {
                    url: url_text.clone(),
                    message: e.to_string(),
                })?
            };
            return Ok(OutboundResponse { status, body });
        }

        match serde_json::from_str::<ErrorEnvelope>(&text) {
            Ok(envelope) => Err(OutboundError::Remote {
                url: url_text,
                status,
                error: envelope.into_api_error(status),
            }),
            Err(_) => Err(OutboundError::Status {
                url: url_text,
                status,
                body: text,
            }),
        }
    }

    fn decode<T: DeserializeOwned>(
        &self,
        path: &str,
        response: OutboundResponse,
    ) -> Result<T, OutboundError> {
        serde_json::from_value(response.body).map_err(|e| OutboundError::Decode {
            url: path.to_string(),
            message: e.to_string(),
        })
    }
}
