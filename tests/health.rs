//! Health endpoints and HTTP probes.

mod common;

use axum::http::StatusCode;
use axum::Router;
use serde_json::json;
use std::time::Duration;

use common::{closed_port, get, send, start_programmable_backend, test_state};
use edge_resilience::config::{HealthConfig, ProbeConfig};
use edge_resilience::health::{HealthStatus, HttpProbe};
use edge_resilience::http::{build_router, AppState};
use edge_resilience::observability::MemorySink;

fn app(debug: bool) -> (AppState, Router, MemorySink) {
    let (state, sink) = test_state(debug);
    let router = build_router(state.clone(), Router::new());
    (state, router, sink)
}

#[tokio::test]
async fn test_health_with_no_probes() {
    let (_, router, _) = app(false);
    let (status, headers, body) = send(router, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["environment"], "test");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["services"], json!({}));
    assert!(headers.get("x-correlation-id").is_some());
}

#[tokio::test]
async fn test_non_critical_failure_degrades() {
    let (state, router, _) = app(false);
    state.health.register_probe("database", true, Duration::from_secs(1), || async {
        Ok(HealthStatus::Healthy)
    });
    state.health.register_probe("search", false, Duration::from_secs(1), || async {
        Err("Connection timeout".to_string())
    });

    let (status, _, body) = send(router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["services"]["search"]["status"], "unhealthy");
    assert_eq!(body["services"]["search"]["error"], "Connection timeout");
    assert_eq!(body["services"]["database"]["critical"], true);
}

#[tokio::test]
async fn test_critical_failure_is_503() {
    let (state, router, _) = app(false);
    state.health.register_probe("database", true, Duration::from_secs(1), || async {
        Err("refused".to_string())
    });

    let (status, _, body) = send(router, get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn test_single_probe_endpoint() {
    let (state, router, _) = app(true);
    state.health.register_probe("cache", false, Duration::from_secs(1), || async {
        Ok(HealthStatus::Degraded)
    });
    state.health.register_probe("broker", true, Duration::from_secs(1), || async {
        Err("no route to host".to_string())
    });

    let (status, _, body) = send(router.clone(), get("/health/cache")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");

    let (status, _, body) = send(router.clone(), get("/health/broker")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "EXTERNAL_SERVICE_ERROR");
    assert_eq!(body["error"]["message"], "broker is unhealthy: no route to host");
    assert_eq!(body["error"]["context"]["service_name"], "broker");

    let (status, _, body) = send(router, get("/health/unknown")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "PROBE_NOT_FOUND");
}

#[tokio::test]
async fn test_detailed_requires_debug() {
    let (_, router, _) = app(false);
    let (status, _, body) = send(router, get("/health/detailed")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");

    let (state, router, _) = app(true);
    state.health.register_probe("database", true, Duration::from_millis(750), || async {
        Ok(HealthStatus::Healthy)
    });
    let (status, _, body) = send(router, get("/health/detailed")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["configuration"]["debug"], true);
    assert_eq!(body["configuration"]["retries"]["max_attempts"], 3);
    assert_eq!(body["configuration"]["health_aggregate_timeout_ms"], 3000);
    assert_eq!(body["configuration"]["rate_limit"]["requests_per_minute"], 60);
    assert_eq!(
        body["probes"],
        json!([{ "name": "database", "critical": true, "timeout_ms": 750 }])
    );
}

#[tokio::test]
async fn test_liveness() {
    let (_, router, _) = app(false);
    let (status, _, body) = send(router, get("/health/live")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alive"], true);
}

#[tokio::test]
async fn test_http_probe_statuses() {
    let (addr, _) = start_programmable_backend(|seen, _| async move {
        let path = seen.head.split_whitespace().nth(1).unwrap_or_default().to_string();
        match path.as_str() {
            "/ok" => (200, "{}".to_string()),
            "/limited" => (429, "{}".to_string()),
            _ => (500, "{}".to_string()),
        }
    })
    .await;

    let check = |path: &str| {
        let probe = HttpProbe::new(format!("http://{addr}{path}"));
        async move { edge_resilience::health::HealthProbe::check(&probe).await }
    };
    assert_eq!(check("/ok").await, Ok(HealthStatus::Healthy));
    assert_eq!(check("/limited").await, Ok(HealthStatus::Degraded));
    assert_eq!(check("/boom").await, Err("HTTP 500".to_string()));
}

#[tokio::test]
async fn test_configured_probes() {
    let (up, _) = start_programmable_backend(|_, _| async { (200, "{}".to_string()) }).await;
    let down = closed_port().await;

    let (state, router, _) = app(false);
    state.health.register_configured(&HealthConfig {
        default_timeout_ms: 2000,
        aggregate_timeout_ms: 0,
        probes: vec![
            ProbeConfig {
                name: "api".into(),
                url: format!("http://{up}/health"),
                critical: true,
                timeout_ms: None,
            },
            ProbeConfig {
                name: "analytics".into(),
                url: format!("http://{down}/health"),
                critical: false,
                timeout_ms: Some(500),
            },
        ],
    });

    let (status, _, body) = send(router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["services"]["api"]["status"], "healthy");
    assert_eq!(body["services"]["analytics"]["status"], "unhealthy");
    assert!(body["services"]["analytics"]["error"].is_string());
}

#[tokio::test(start_paused = true)]
async fn test_hung_dependency_bounded_by_default_deadline() {
    let (state, router, _) = app(false);
    state.health.register_probe("database", true, Duration::from_secs(1), || async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(HealthStatus::Healthy)
    });
    state.health.register_probe("search", true, Duration::from_secs(2), || async {
        tokio::time::sleep(Duration::from_millis(1800)).await;
        Ok(HealthStatus::Healthy)
    });
    state.health.register_probe("vector_db", false, Duration::from_secs(5), || async {
        std::future::pending::<()>().await;
        Ok(HealthStatus::Healthy)
    });

    let started = tokio::time::Instant::now();
    let (status, _, body) = send(router, get("/health")).await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_millis(3100));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["services"]["search"]["status"], "healthy");
    assert_eq!(body["services"]["vector_db"]["status"], "unhealthy");
}
