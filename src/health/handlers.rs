//! Health endpoints.
//!
//! - `GET /health`: aggregate document, 503 when unhealthy
//! - `GET /health/live`: liveness only, never runs probes
//! - `GET /health/detailed`: configuration diagnostics, debug mode only
//! - `GET /health/{name}`: one probe on demand

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::errors::envelope::unix_timestamp;
use crate::errors::ApiError;
use crate::health::probe::{HealthStatus, ProbeResult};
use crate::http::server::AppState;

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: f64,
    pub environment: String,
    pub version: String,
    pub response_time: f64,
    pub services: BTreeMap<String, ProbeResult>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/live", get(live))
        .route("/health/detailed", get(detailed))
        .route("/health/{name}", get(probe))
}

async fn health(State(state): State<AppState>) -> Response {
    let aggregate = state.health.check_all().await;
    let config = state.config.load();

    let status = match aggregate.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    };
    let body = HealthResponse {
        status: aggregate.status,
        timestamp: aggregate.timestamp,
        environment: config.app.environment.clone(),
        version: config.app.version.clone(),
        response_time: aggregate.response_time,
        services: aggregate.services,
    };
    (status, Json(body)).into_response()
}

async fn live() -> Json<Value> {
    Json(json!({ "alive": true, "timestamp": unix_timestamp() }))
}

async fn detailed(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let config = state.config.load_full();
    if !config.app.debug {
        return Err(ApiError::unavailable(
            Some("Detailed health information is only available in debug mode"),
            None,
        ));
    }

    let aggregate = state.health.check_all().await;
    Ok(Json(json!({
        "status": aggregate.status,
        "timestamp": aggregate.timestamp,
        "environment": config.app.environment,
        "version": config.app.version,
        "response_time": aggregate.response_time,
        "configuration": {
            "debug": config.app.debug,
            "log_level": config.observability.log_level,
            "log_format": config.observability.log_format,
            "request_timeout_secs": config.server.request_timeout_secs,
            "max_body_bytes": config.server.max_body_bytes,
            "retries": config.retries,
            "health_default_timeout_ms": config.health.default_timeout_ms,
            "health_aggregate_timeout_ms": state
                .health
                .deadline()
                .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            "rate_limit": config.rate_limit,
        },
        "rate_limited_clients": state.rate_limiter.len(),
        "probes": state.health.probes(),
        "services": aggregate.services,
    })))
}

async fn probe(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ProbeResult>, ApiError> {
    let result = state.health.check_one(&name).await?;
    if result.status == HealthStatus::Unhealthy {
        let message = format!(
            "{name} is unhealthy: {}",
            result.error.as_deref().unwrap_or("no detail")
        );
        return Err(ApiError::dependency(&name, Some(&message))
            .with_context("critical", result.critical));
    }
    Ok(Json(result))
}
