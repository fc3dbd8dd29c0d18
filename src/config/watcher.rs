//! Configuration file watcher for hot reload.
//!
//! Reloads swap the shared `ArcSwap<AppConfig>`. Settings read per request
//! take effect live: exposure mode, environment, version, the request
//! timeout and rate limits. Settings read once at startup
//! (see `restart_required`) are logged when they change and apply after a
//! restart.

use arc_swap::ArcSwap;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::loader::load_config;
use crate::config::schema::AppConfig;

/// Watches one config file and publishes validated reloads.
pub struct ConfigWatcher {
    path: PathBuf,
    shared: Arc<ArcSwap<AppConfig>>,
}

impl ConfigWatcher {
    pub fn new(path: &Path, shared: Arc<ArcSwap<AppConfig>>) -> Self {
        Self {
            path: path.to_path_buf(),
            shared,
        }
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();
        let shared = self.shared.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    reload(&path, &shared);
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Load the file and swap it in if it validates. Returns whether a swap happened.
pub fn reload(path: &Path, shared: &ArcSwap<AppConfig>) -> bool {
    let next = match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Config reload rejected, keeping current configuration");
            return false;
        }
    };

    let current = shared.load();
    if **current == next {
        return false;
    }
    let pending = restart_required(&current, &next);
    if !pending.is_empty() {
        tracing::warn!(settings = ?pending, "Changed settings take effect after restart");
    }
    tracing::info!(
        environment = %next.app.environment,
        debug = next.app.debug,
        "Configuration reloaded"
    );
    shared.store(Arc::new(next));
    true
}

/// Settings that differ between `current` and `next` but are only read at
/// startup.
pub fn restart_required(current: &AppConfig, next: &AppConfig) -> Vec<&'static str> {
    let checks = [
        ("server.bind_address", current.server.bind_address != next.server.bind_address),
        ("server.max_body_bytes", current.server.max_body_bytes != next.server.max_body_bytes),
        (
            "health.default_timeout_ms",
            current.health.default_timeout_ms != next.health.default_timeout_ms,
        ),
        (
            "health.aggregate_timeout_ms",
            current.health.aggregate_timeout_ms != next.health.aggregate_timeout_ms,
        ),
        ("health.probes", current.health.probes != next.health.probes),
        ("observability", current.observability != next.observability),
    ];
    checks
        .into_iter()
        .filter_map(|(name, changed)| changed.then_some(name))
        .collect()
}
