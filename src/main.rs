//! edge-resilience server.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────┐
//!   request ──────▶│ request id → trace → boundary → rate limit → panics  │
//!                  │                        │                              │
//!                  │                        ▼                              │
//!                  │        /health, /health/{name}, collaborator routes   │
//!                  │                        │                              │
//!   response ◀─────│ envelope + x-correlation-id + x-process-time          │
//!                  └──────────────────────────────────────────────────────┘
//!                          │                          │
//!                          ▼                          ▼
//!                   HealthAggregator            OutboundClient
//!                   (probes, timeouts)          (retries, backoff)
//! ```
//!
//! Usage: `edge-resilience [config.toml]`. Without a path the defaults plus
//! `EDGE_*` environment overrides are used.

use arc_swap::ArcSwap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use edge_resilience::config::loader::{load_config, load_from_env};
use edge_resilience::config::watcher::ConfigWatcher;
use edge_resilience::http::{AppState, HttpServer};
use edge_resilience::lifecycle::{spawn_signal_listener, Shutdown};
use edge_resilience::observability::{init_logging, metrics, Logger};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match &config_path {
        Some(path) => load_config(path)?,
        None => load_from_env()?,
    };

    init_logging(&config.observability);
    tracing::info!(
        version = %config.app.version,
        environment = %config.app.environment,
        debug = config.app.debug,
        bind_address = %config.server.bind_address,
        "edge-resilience starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    let shared = Arc::new(ArcSwap::from_pointee(config));

    // Dropping the watcher stops it, so keep it for the life of the server.
    let _watcher = match &config_path {
        Some(path) => Some(ConfigWatcher::new(path, shared.clone()).run()?),
        None => None,
    };

    let state = AppState::from_shared(shared.clone(), Logger::tracing());
    state.health.register_configured(&shared.load().health);

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());
    tokio::spawn(
        state
            .rate_limiter
            .clone()
            .run_eviction(shared.clone(), shutdown.clone()),
    );

    HttpServer::new(state).run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
