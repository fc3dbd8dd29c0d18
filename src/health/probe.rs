//! Probe types and the built-in HTTP probe.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Health of one dependency, or of the whole service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one probe run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub name: String,
    pub status: HealthStatus,
    /// Seconds the probe took, absent when it never completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,
    pub critical: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Why a probe produced no status of its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("probe timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("aggregate check deadline of {}ms exceeded", .0.as_millis())]
    Deadline(Duration),

    #[error("{0}")]
    Failed(String),

    #[error("probe panicked")]
    Panicked,

    #[error("probe task was cancelled")]
    Cancelled,
}

pub type ProbeFuture = Pin<Box<dyn Future<Output = Result<HealthStatus, String>> + Send>>;

/// A bounded check against one dependency.
///
/// `Err` means unhealthy with the message recorded. Implemented for any
/// `Fn() -> impl Future<Output = Result<HealthStatus, String>>`.
pub trait HealthProbe: Send + Sync {
    fn check(&self) -> ProbeFuture;
}

impl<F, Fut> HealthProbe for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<HealthStatus, String>> + Send + 'static,
{
    fn check(&self) -> ProbeFuture {
        Box::pin(self())
    }
}

/// GET a URL: 2xx healthy, 4xx degraded, 5xx or no response unhealthy.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl HealthProbe for HttpProbe {
    fn check(&self) -> ProbeFuture {
        let request = self
            .client
            .get(&self.url)
            .header("user-agent", "edge-resilience-health-check");
        Box::pin(async move {
            let response = request.send().await.map_err(|e| e.to_string())?;
            let status = response.status();
            if status.is_success() {
                Ok(HealthStatus::Healthy)
            } else if status.is_client_error() {
                Ok(HealthStatus::Degraded)
            } else {
                Err(format!("HTTP {}", status.as_u16()))
            }
        })
    }
}
