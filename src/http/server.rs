//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: health endpoints, collaborator routes, fallback
//! - Wire up middleware (request id, tracing, boundary, rate limit, body
//!   limit, panics)
//! - Bind server to listener and shut down gracefully

use arc_swap::ArcSwap;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{middleware, Router};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::SetRequestIdLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::errors::{ApiError, ErrorKind, Failure};
use crate::health::{handlers, HealthAggregator};
use crate::http::middleware::{boundary, BoundaryState};
use crate::http::request::{MakeCorrelationId, X_CORRELATION_ID};
use crate::lifecycle::Shutdown;
use crate::observability::Logger;
use crate::security::{rate_limit, RateLimitState, RateLimiter};

/// Application state injected into handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<ArcSwap<AppConfig>>,
    pub health: Arc<HealthAggregator>,
    pub rate_limiter: Arc<RateLimiter>,
    pub logger: Logger,
}

impl AppState {
    pub fn new(config: AppConfig, logger: Logger) -> Self {
        Self::from_shared(Arc::new(ArcSwap::from_pointee(config)), logger)
    }

    /// Build around an existing shared config (one a `ConfigWatcher` updates).
    pub fn from_shared(config: Arc<ArcSwap<AppConfig>>, logger: Logger) -> Self {
        let aggregate_timeout_ms = config.load().health.aggregate_timeout_ms;
        let health = match aggregate_timeout_ms {
            0 => HealthAggregator::new(logger.clone()).without_deadline(),
            ms => HealthAggregator::new(logger.clone()).with_deadline(Duration::from_millis(ms)),
        };
        Self {
            config,
            health: Arc::new(health),
            rate_limiter: Arc::new(RateLimiter::new()),
            logger,
        }
    }
}

/// HTTP server.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Server with only the built-in routes.
    pub fn new(state: AppState) -> Self {
        Self::with_routes(state, Router::new())
    }

    /// Server with collaborator routes mounted next to the built-in ones.
    pub fn with_routes(state: AppState, routes: Router<AppState>) -> Self {
        let router = build_router(state.clone(), routes);
        Self { router, state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let service = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, service)
            .with_graceful_shutdown(shutdown.signalled())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the router with all middleware layers.
///
/// Layer order, outermost first: request id, trace, boundary, rate limit,
/// body limit, panic catcher. The boundary sees every response the inner
/// layers make.
///
/// `max_body_bytes` is read here once; changing it needs a restart.
pub fn build_router(state: AppState, routes: Router<AppState>) -> Router {
    let max_body_bytes = state.config.load().server.max_body_bytes;
    let boundary_state = BoundaryState::new(state.config.clone(), state.logger.clone());
    let rate_state = RateLimitState {
        limiter: state.rate_limiter.clone(),
        config: state.config.clone(),
    };

    Router::new()
        .merge(handlers::routes())
        .merge(routes)
        .fallback(route_not_found)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(X_CORRELATION_ID, MakeCorrelationId))
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(boundary_state, boundary))
                .layer(middleware::from_fn_with_state(rate_state, rate_limit))
                .layer(RequestBodyLimitLayer::new(max_body_bytes))
                .layer(CatchPanicLayer::custom(panic_response)),
        )
}

async fn route_not_found(uri: Uri) -> ApiError {
    ApiError::new(
        ErrorKind::NotFound,
        "ROUTE_NOT_FOUND",
        format!("No route matches {}", uri.path()),
    )
    .with_context("path", uri.path())
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
    response
        .extensions_mut()
        .insert(Failure::unclassified("panic", message));
    response
}
