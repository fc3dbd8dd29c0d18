//! Per-client request rate limiting.
//!
//! # Responsibilities
//! - Identify the client (peer address, or forwarding headers when trusted)
//! - Enforce burst, per-minute and per-hour budgets with token buckets
//! - Answer over-budget requests with `RateLimited` and a retry hint
//! - Report the remaining budget in `X-RateLimit-*` headers
//! - Forget clients that have been idle for the eviction window
//!
//! # Design Decisions
//! - Limits are read from the live config on every request
//! - A request takes one token from every bucket or from none

use arc_swap::ArcSwap;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};

use crate::config::{AppConfig, RateLimitConfig};
use crate::errors::ApiError;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

pub const X_RATELIMIT_LIMIT_MINUTE: HeaderName = HeaderName::from_static("x-ratelimit-limit-minute");
pub const X_RATELIMIT_REMAINING_MINUTE: HeaderName =
    HeaderName::from_static("x-ratelimit-remaining-minute");
pub const X_RATELIMIT_LIMIT_HOUR: HeaderName = HeaderName::from_static("x-ratelimit-limit-hour");
pub const X_RATELIMIT_REMAINING_HOUR: HeaderName =
    HeaderName::from_static("x-ratelimit-remaining-hour");

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Key used when the client cannot be identified.
pub const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Clone, Copy)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    fn refill(&mut self, window: &Window, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * window.rate).min(window.capacity);
        self.last_update = now;
    }

    /// Seconds until one token is available.
    fn wait_secs(&self, window: &Window) -> f64 {
        if self.tokens >= 1.0 {
            0.0
        } else {
            (1.0 - self.tokens) / window.rate
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    name: &'static str,
    capacity: f64,
    /// Tokens per second.
    rate: f64,
}

/// Burst, minute and hour windows, in that order.
fn windows(config: &RateLimitConfig) -> [Window; 3] {
    let window = |name, limit: u32, period: f64| Window {
        name,
        capacity: f64::from(limit),
        rate: f64::from(limit) / period,
    };
    [
        window("burst", config.burst_size, 1.0),
        window("minute", config.requests_per_minute, 60.0),
        window("hour", config.requests_per_hour, 3600.0),
    ]
}

#[derive(Debug)]
struct ClientBuckets {
    buckets: [TokenBucket; 3],
    last_seen: Instant,
}

/// What is left of a client's budget after a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit_minute: u32,
    pub remaining_minute: u32,
    pub limit_hour: u32,
    pub remaining_hour: u32,
}

impl Quota {
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(X_RATELIMIT_LIMIT_MINUTE, HeaderValue::from(self.limit_minute));
        headers.insert(X_RATELIMIT_REMAINING_MINUTE, HeaderValue::from(self.remaining_minute));
        headers.insert(X_RATELIMIT_LIMIT_HOUR, HeaderValue::from(self.limit_hour));
        headers.insert(X_RATELIMIT_REMAINING_HOUR, HeaderValue::from(self.remaining_hour));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed(Quota),
    Limited {
        /// Whole seconds until the most depleted window admits a request.
        retry_after_secs: u64,
        window: &'static str,
        quota: Quota,
    },
}

/// Token buckets for every client seen recently.
#[derive(Debug, Default)]
pub struct RateLimiter {
    clients: DashMap<String, ClientBuckets>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charge one request to `key` if every window has a token.
    pub fn check(&self, key: &str, config: &RateLimitConfig) -> Decision {
        let now = Instant::now();
        let windows = windows(config);
        let mut entry = self
            .clients
            .entry(key.to_string())
            .or_insert_with(|| ClientBuckets {
                buckets: windows.map(|w| TokenBucket::full(w.capacity, now)),
                last_seen: now,
            });
        let client = entry.value_mut();
        client.last_seen = now;
        for (bucket, window) in client.buckets.iter_mut().zip(&windows) {
            bucket.refill(window, now);
        }

        let exhausted = client
            .buckets
            .iter()
            .zip(&windows)
            .filter(|(bucket, _)| bucket.tokens < 1.0)
            .map(|(bucket, window)| (bucket.wait_secs(window), window.name))
            .max_by(|a, b| a.0.total_cmp(&b.0));

        if exhausted.is_none() {
            for bucket in &mut client.buckets {
                bucket.tokens -= 1.0;
            }
        }

        let remaining = |i: usize| client.buckets[i].tokens.max(0.0).floor() as u32;
        let quota = Quota {
            limit_minute: config.requests_per_minute,
            remaining_minute: remaining(1),
            limit_hour: config.requests_per_hour,
            remaining_hour: remaining(2),
        };

        match exhausted {
            None => Decision::Allowed(quota),
            Some((wait, window)) => Decision::Limited {
                retry_after_secs: wait.ceil().max(1.0) as u64,
                window,
                quota,
            },
        }
    }

    /// Drop clients not seen for `idle`. Returns how many were dropped.
    pub fn evict_idle(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let before = self.clients.len();
        self.clients
            .retain(|_, client| now.saturating_duration_since(client.last_seen) < idle);
        before.saturating_sub(self.clients.len())
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Sweep idle clients on the configured interval until shutdown.
    pub async fn run_eviction(self: Arc<Self>, config: Arc<ArcSwap<AppConfig>>, shutdown: Shutdown) {
        let stopped = shutdown.signalled();
        tokio::pin!(stopped);
        loop {
            let (interval, idle) = {
                let config = config.load();
                (
                    Duration::from_secs(config.rate_limit.cleanup_interval_secs.max(1)),
                    Duration::from_secs(config.rate_limit.idle_eviction_secs),
                )
            };
            tokio::select! {
                _ = &mut stopped => break,
                _ = time::sleep(interval) => {
                    let evicted = self.evict_idle(idle);
                    if evicted > 0 {
                        tracing::debug!(evicted, active = self.len(), "Rate limiter evicted idle clients");
                    }
                }
            }
        }
    }
}

/// Client identity: the first forwarded address when trusted, else the peer IP.
pub fn client_key(request: &Request, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let headers = request.headers();
        let forwarded = headers
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .or_else(|| headers.get(X_REAL_IP).and_then(|v| v.to_str().ok()))
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Shared state for the rate limit layer.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub config: Arc<ArcSwap<AppConfig>>,
}

/// `axum::middleware::from_fn_with_state` entry point.
pub async fn rate_limit(State(state): State<RateLimitState>, request: Request, next: Next) -> Response {
    let config = state.config.load_full();
    let limits = &config.rate_limit;
    if !limits.enabled || limits.exempt_paths.iter().any(|p| p == request.uri().path()) {
        return next.run(request).await;
    }

    let key = client_key(&request, limits.trust_forwarded_for);
    match state.limiter.check(&key, limits) {
        Decision::Allowed(quota) => {
            let mut response = next.run(request).await;
            quota.apply(response.headers_mut());
            response
        }
        Decision::Limited {
            retry_after_secs,
            window,
            quota,
        } => {
            metrics::record_rate_limited(window);
            let mut response = ApiError::rate_limited(Some(retry_after_secs))
                .with_context("window", window)
                .into_response();
            quota.apply(response.headers_mut());
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn limits(per_minute: u32, per_hour: u32, burst: u32) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_minute: per_minute,
            requests_per_hour: per_hour,
            burst_size: burst,
            ..RateLimitConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_refill() {
        let limiter = RateLimiter::new();
        let config = limits(60, 1000, 3);

        for _ in 0..3 {
            assert!(matches!(limiter.check("10.0.0.1", &config), Decision::Allowed(_)));
        }
        match limiter.check("10.0.0.1", &config) {
            Decision::Limited { retry_after_secs, window, .. } => {
                assert_eq!(window, "burst");
                assert_eq!(retry_after_secs, 1);
            }
            other => panic!("expected limit, got {other:?}"),
        }
        // Other clients have their own buckets.
        assert!(matches!(limiter.check("10.0.0.2", &config), Decision::Allowed(_)));

        time::advance(Duration::from_secs(1)).await;
        assert!(matches!(limiter.check("10.0.0.1", &config), Decision::Allowed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_minute_window_reports_longest_wait() {
        let limiter = RateLimiter::new();
        let config = limits(2, 1000, 10);

        let Decision::Allowed(first) = limiter.check("c", &config) else {
            panic!("first request limited");
        };
        assert_eq!(first.remaining_minute, 1);
        assert_eq!(first.limit_hour, 1000);
        assert_eq!(first.remaining_hour, 999);
        assert!(matches!(limiter.check("c", &config), Decision::Allowed(_)));

        match limiter.check("c", &config) {
            Decision::Limited { retry_after_secs, window, quota } => {
                assert_eq!(window, "minute");
                assert_eq!(retry_after_secs, 30);
                assert_eq!(quota.remaining_minute, 0);
                assert_eq!(quota.remaining_hour, 998);
            }
            other => panic!("expected limit, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_request_costs_nothing() {
        let limiter = RateLimiter::new();
        let config = limits(60, 1, 10);

        assert!(matches!(limiter.check("c", &config), Decision::Allowed(_)));
        for _ in 0..5 {
            let decision = limiter.check("c", &config);
            assert!(matches!(decision, Decision::Limited { window: "hour", .. }));
        }
        let Decision::Limited { quota, .. } = limiter.check("c", &config) else {
            panic!("expected limit");
        };
        assert_eq!(quota.remaining_minute, 59);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_clients_are_evicted() {
        let limiter = RateLimiter::new();
        let config = limits(60, 1000, 10);
        limiter.check("old", &config);
        time::advance(Duration::from_secs(50)).await;
        limiter.check("recent", &config);
        time::advance(Duration::from_secs(20)).await;

        assert_eq!(limiter.evict_idle(Duration::from_secs(60)), 1);
        assert_eq!(limiter.len(), 1);
        assert_eq!(limiter.evict_idle(Duration::from_secs(60)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_task_sweeps_until_shutdown() {
        let limiter = Arc::new(RateLimiter::new());
        let mut config = AppConfig::default();
        config.rate_limit.cleanup_interval_secs = 10;
        config.rate_limit.idle_eviction_secs = 30;
        let shared = Arc::new(ArcSwap::from_pointee(config));
        limiter.check("c", &shared.load().rate_limit);

        let shutdown = Shutdown::new();
        let task = tokio::spawn(limiter.clone().run_eviction(shared, shutdown.clone()));

        time::sleep(Duration::from_secs(25)).await;
        assert_eq!(limiter.len(), 1);
        time::sleep(Duration::from_secs(10)).await;
        assert!(limiter.is_empty());

        shutdown.trigger();
        time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }

    #[test]
    fn test_client_key() {
        let request = |headers: &[(&str, &str)]| {
            let mut builder = Request::builder().uri("/");
            for (name, value) in headers {
                builder = builder.header(*name, *value);
            }
            let mut request = builder.body(Body::empty()).unwrap();
            request
                .extensions_mut()
                .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 7], 40123))));
            request
        };

        let forwarded = request(&[("x-forwarded-for", "203.0.113.9, 10.0.0.1")]);
        assert_eq!(client_key(&forwarded, true), "203.0.113.9");
        assert_eq!(client_key(&forwarded, false), "192.168.1.7");
        assert_eq!(client_key(&request(&[("x-real-ip", "198.51.100.4")]), true), "198.51.100.4");
        assert_eq!(client_key(&request(&[]), true), "192.168.1.7");

        let bare = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(client_key(&bare, false), UNKNOWN_CLIENT);
    }
}
