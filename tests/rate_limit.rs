//! Per-client rate limiting through the full router and a live server.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::time::Duration;

use common::{get as get_req, send, state_with};
use edge_resilience::config::AppConfig;
use edge_resilience::http::{build_router, AppState, HttpServer};
use edge_resilience::lifecycle::Shutdown;

fn routes() -> Router<AppState> {
    Router::new().route("/ok", get(|| async { Json(json!({ "ok": true })) }))
}

fn limited_config(burst: u32) -> AppConfig {
    let mut config = AppConfig::default();
    config.app.debug = true;
    config.rate_limit.burst_size = burst;
    config.rate_limit.requests_per_minute = 5;
    config
}

fn router(config: AppConfig) -> Router {
    let (state, _) = state_with(config);
    build_router(state, routes())
}

fn from_client(uri: &str, ip: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_over_budget_gets_429_envelope() {
    let router = router(limited_config(2));

    for remaining in [4, 3] {
        let (status, headers, _) = send(router.clone(), get_req("/ok")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["x-ratelimit-limit-minute"], "5");
        assert_eq!(headers["x-ratelimit-remaining-minute"], remaining.to_string().as_str());
        assert_eq!(headers["x-ratelimit-limit-hour"], "1000");
    }

    let (status, headers, body) = send(router, get_req("/ok")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers[header::RETRY_AFTER], "1");
    assert_eq!(headers["x-ratelimit-remaining-minute"], "3");
    assert!(headers.get("x-correlation-id").is_some());

    let error = &body["error"];
    assert_eq!(error["code"], "RATE_LIMIT_ERROR");
    assert_eq!(error["context"]["retry_after"], 1);
    assert_eq!(error["context"]["window"], "burst");
    assert_eq!(error["path"], "/ok");
}

#[tokio::test(start_paused = true)]
async fn test_restrictive_mode_keeps_retry_after() {
    let mut config = limited_config(1);
    config.app.debug = false;
    let router = router(config);

    send(router.clone(), get_req("/ok")).await;
    let (status, headers, body) = send(router, get_req("/ok")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers[header::RETRY_AFTER], "1");
    assert!(body["error"].get("context").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_exempt_paths_are_not_counted() {
    let router = router(limited_config(1));

    for _ in 0..5 {
        let (status, headers, _) = send(router.clone(), get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.get("x-ratelimit-limit-minute").is_none());
    }
    let (status, _, _) = send(router, get_req("/ok")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn test_forwarded_clients_have_separate_budgets() {
    let mut config = limited_config(1);
    config.rate_limit.trust_forwarded_for = true;
    let router = router(config);

    let (status, _, _) = send(router.clone(), from_client("/ok", "203.0.113.1")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(router.clone(), from_client("/ok", "203.0.113.1")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    let (status, _, _) = send(router, from_client("/ok", "203.0.113.2")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_disabled_limiter_passes_everything() {
    let mut config = limited_config(1);
    config.rate_limit.enabled = false;
    let router = router(config);

    for _ in 0..3 {
        let (status, headers, _) = send(router.clone(), get_req("/ok")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.get("x-ratelimit-limit-minute").is_none());
    }
}

#[tokio::test]
async fn test_live_server_keys_by_peer_address() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (state, _) = state_with(limited_config(1));
    let limiter = state.rate_limiter.clone();
    let shutdown = Shutdown::new();
    let server = tokio::spawn(
        HttpServer::with_routes(state, routes()).run(listener, shutdown.clone()),
    );

    let client = reqwest::Client::new();
    let url = format!("http://{addr}/ok");
    let first = client.get(&url).send().await.unwrap();
    assert_eq!(first.status(), 200);
    let second = client.get(&url).send().await.unwrap();
    assert_eq!(second.status(), 429);
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["error"]["code"], "RATE_LIMIT_ERROR");

    assert_eq!(limiter.len(), 1);
    assert_eq!(limiter.evict_idle(Duration::ZERO), 1);

    drop(client);
    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
