//! Multi-probe health aggregation.
//!
//! # Responsibilities
//! - Hold the registry of named probes with criticality and timeout
//! - Run every probe concurrently, each bounded by its own timeout and by
//!   the aggregate deadline
//! - Roll the results into one status
//!
//! # Data Flow
//! ```text
//! check_all()
//!     → snapshot registry
//!     → spawn one task per probe (timeout each, abort on hang)
//!     → join_all → BTreeMap<name, ProbeResult>
//!     → compute_status() → AggregateHealth
//! ```
//!
//! # Design Decisions
//! - A probe failure, panic or hang never affects the other probes
//! - Probe tasks die with the call: dropping `check_all` aborts them
//! - Every call is independent; no history or smoothing

use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::Level;

use crate::config::HealthConfig;
use crate::errors::envelope::unix_timestamp;
use crate::errors::ApiError;
use crate::health::probe::{HealthProbe, HealthStatus, HttpProbe, ProbeError, ProbeResult};
use crate::observability::metrics;
use crate::observability::{LogEvent, Logger};

/// Deadline for a whole `check_all` unless configured otherwise.
pub const DEFAULT_AGGREGATE_DEADLINE: Duration = Duration::from_secs(3);

#[derive(Clone)]
struct RegisteredProbe {
    critical: bool,
    timeout: Duration,
    probe: Arc<dyn HealthProbe>,
}

/// Registration facts about one probe, as shown by diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeInfo {
    pub name: String,
    pub critical: bool,
    pub timeout_ms: u64,
}

/// Result of one `check_all` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateHealth {
    pub status: HealthStatus,
    pub timestamp: f64,
    /// Seconds spent checking.
    pub response_time: f64,
    pub services: BTreeMap<String, ProbeResult>,
}

/// Registry of dependency probes.
pub struct HealthAggregator {
    probes: DashMap<String, RegisteredProbe>,
    deadline: Option<Duration>,
    logger: Logger,
}

impl HealthAggregator {
    pub fn new(logger: Logger) -> Self {
        Self {
            probes: DashMap::new(),
            deadline: Some(DEFAULT_AGGREGATE_DEADLINE),
            logger,
        }
    }

    /// Bound the whole `check_all` call. Probes still running when it elapses
    /// are aborted and recorded unhealthy.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Let each probe run for its full timeout.
    pub fn without_deadline(mut self) -> Self {
        self.deadline = None;
        self
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Register a probe. A probe already registered under `name` is replaced.
    pub fn register_probe<P>(&self, name: &str, critical: bool, timeout: Duration, probe: P)
    where
        P: HealthProbe + 'static,
    {
        let entry = RegisteredProbe {
            critical,
            timeout,
            probe: Arc::new(probe),
        };
        if self.probes.insert(name.to_string(), entry).is_some() {
            self.logger.emit(
                LogEvent::new(Level::WARN, "Health probe replaced").field("probe", name),
            );
        }
    }

    /// Register an `HttpProbe` for every probe declared in configuration.
    pub fn register_configured(&self, config: &HealthConfig) {
        let client = reqwest::Client::new();
        for probe in &config.probes {
            let timeout = Duration::from_millis(probe.timeout_ms.unwrap_or(config.default_timeout_ms));
            self.register_probe(
                &probe.name,
                probe.critical,
                timeout,
                HttpProbe::with_client(client.clone(), probe.url.as_str()),
            );
            self.logger.emit(
                LogEvent::new(Level::INFO, "Health probe registered")
                    .field("probe", probe.name.as_str())
                    .field("url", probe.url.as_str())
                    .field("critical", probe.critical),
            );
        }
    }

    /// Remove a probe. Returns whether it existed.
    pub fn deregister_probe(&self, name: &str) -> bool {
        self.probes.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Registered probes sorted by name.
    pub fn probes(&self) -> Vec<ProbeInfo> {
        let mut infos: Vec<_> = self
            .probes
            .iter()
            .map(|entry| ProbeInfo {
                name: entry.key().clone(),
                critical: entry.critical,
                timeout_ms: u64::try_from(entry.timeout.as_millis()).unwrap_or(u64::MAX),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Run every probe concurrently and aggregate.
    pub async fn check_all(&self) -> AggregateHealth {
        let started = Instant::now();
        // Clone out of the map so no shard lock is held across awaits.
        let snapshot: Vec<(String, RegisteredProbe)> = self
            .probes
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let results = join_all(
            snapshot
                .into_iter()
                .map(|(name, entry)| self.run_probe(name, entry)),
        )
        .await;

        let services: BTreeMap<String, ProbeResult> = results
            .into_iter()
            .map(|result| (result.name.clone(), result))
            .collect();
        let status = compute_status(services.values());

        let event = LogEvent::new(Level::DEBUG, "Health check completed")
            .field("status", status.as_str())
            .field("probes", services.len());
        self.logger.emit(event);

        AggregateHealth {
            status,
            timestamp: unix_timestamp(),
            response_time: started.elapsed().as_secs_f64(),
            services,
        }
    }

    /// Run one probe on demand. Unknown names are `NotFound`.
    pub async fn check_one(&self, name: &str) -> Result<ProbeResult, ApiError> {
        let entry = self
            .probes
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                ApiError::new(
                    crate::errors::ErrorKind::NotFound,
                    "PROBE_NOT_FOUND",
                    format!("Health probe '{name}' is not registered"),
                )
                .with_context("resource_type", "probe")
                .with_context("resource_id", name)
            })?;
        Ok(self.run_probe(name.to_string(), entry).await)
    }

    async fn run_probe(&self, name: String, entry: RegisteredProbe) -> ProbeResult {
        let started = Instant::now();
        let (limit, limit_error) = match self.deadline {
            Some(deadline) if deadline < entry.timeout => (deadline, ProbeError::Deadline(deadline)),
            _ => (entry.timeout, ProbeError::Timeout(entry.timeout)),
        };

        let mut task = AbortOnDrop(tokio::spawn(entry.probe.check()));
        let outcome = match time::timeout(limit, &mut task.0).await {
            Ok(Ok(Ok(status))) => Ok(status),
            Ok(Ok(Err(message))) => Err(ProbeError::Failed(message)),
            Ok(Err(join_error)) if join_error.is_panic() => Err(ProbeError::Panicked),
            Ok(Err(_)) => Err(ProbeError::Cancelled),
            Err(_) => Err(limit_error),
        };
        drop(task);
        let elapsed = started.elapsed();

        let result = match outcome {
            Ok(status) => ProbeResult {
                name,
                status,
                response_time: Some(elapsed.as_secs_f64()),
                critical: entry.critical,
                error: None,
            },
            Err(err) => {
                let completed = !matches!(err, ProbeError::Timeout(_) | ProbeError::Deadline(_));
                ProbeResult {
                    name,
                    status: HealthStatus::Unhealthy,
                    response_time: completed.then(|| elapsed.as_secs_f64()),
                    critical: entry.critical,
                    error: Some(err.to_string()),
                }
            }
        };

        metrics::record_probe(&result.name, result.status, elapsed);
        if result.status != HealthStatus::Healthy {
            let level = if result.critical && result.status == HealthStatus::Unhealthy {
                Level::ERROR
            } else {
                Level::WARN
            };
            let mut event = LogEvent::new(level, "Health probe not healthy")
                .field("probe", result.name.as_str())
                .field("status", result.status.as_str())
                .field("critical", result.critical);
            if let Some(error) = &result.error {
                event = event.field("error", error.as_str());
            }
            self.logger.emit(event);
        }
        result
    }
}

/// Aborts the probe task when the owning future goes away, whether it
/// finished, timed out or was dropped by its caller.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl std::fmt::Debug for HealthAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthAggregator")
            .field("probes", &self.probes.len())
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// Unhealthy if any critical probe is unhealthy; degraded if any probe is
/// degraded or a non-critical one is unhealthy; healthy otherwise.
pub fn compute_status<'a, I>(results: I) -> HealthStatus
where
    I: IntoIterator<Item = &'a ProbeResult>,
{
    let mut status = HealthStatus::Healthy;
    for result in results {
        match (result.status, result.critical) {
            (HealthStatus::Unhealthy, true) => return HealthStatus::Unhealthy,
            (HealthStatus::Unhealthy, false) | (HealthStatus::Degraded, _) => {
                status = HealthStatus::Degraded;
            }
            (HealthStatus::Healthy, _) => {}
        }
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::logging::MemorySink;

    fn result(name: &str, status: HealthStatus, critical: bool) -> ProbeResult {
        ProbeResult {
            name: name.into(),
            status,
            response_time: Some(0.01),
            critical,
            error: None,
        }
    }

    #[test]
    fn test_status_precedence() {
        use HealthStatus::*;
        assert_eq!(compute_status(std::iter::empty()), Healthy);
        assert_eq!(
            compute_status(&[result("a", Healthy, true), result("b", Healthy, false)]),
            Healthy
        );
        assert_eq!(
            compute_status(&[result("a", Healthy, true), result("b", Unhealthy, false)]),
            Degraded
        );
        assert_eq!(
            compute_status(&[result("a", Degraded, true), result("b", Healthy, false)]),
            Degraded
        );
        assert_eq!(
            compute_status(&[result("a", Degraded, false), result("b", Unhealthy, true)]),
            Unhealthy
        );
    }

    #[tokio::test]
    async fn test_empty_registry_is_healthy() {
        let health = HealthAggregator::new(Logger::default()).check_all().await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(health.services.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_isolated() {
        let aggregator = HealthAggregator::new(Logger::default());
        aggregator.register_probe("cache", false, Duration::from_secs(1), || async {
            Err("connection refused".to_string())
        });
        aggregator.register_probe("database", true, Duration::from_secs(1), || async {
            Ok(HealthStatus::Healthy)
        });
        aggregator.register_probe("search", false, Duration::from_secs(1), || async {
            let broken = true;
            if broken {
                panic!("probe bug");
            }
            Ok(HealthStatus::Healthy)
        });

        let health = aggregator.check_all().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        let names: Vec<_> = health.services.keys().cloned().collect();
        assert_eq!(names, ["cache", "database", "search"]);
        assert_eq!(
            health.services["cache"].error.as_deref(),
            Some("connection refused")
        );
        assert_eq!(
            health.services["search"].error.as_deref(),
            Some("probe panicked")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_probes_run_concurrently() {
        let aggregator = HealthAggregator::new(Logger::default());
        for (name, secs) in [("a", 1), ("b", 2), ("c", 2)] {
            aggregator.register_probe(name, true, Duration::from_secs(5), move || async move {
                time::sleep(Duration::from_secs(secs)).await;
                Ok(HealthStatus::Healthy)
            });
        }

        let started = time::Instant::now();
        let health = aggregator.check_all().await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(started.elapsed() < Duration::from_millis(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_probe_times_out() {
        let aggregator = HealthAggregator::new(Logger::default());
        aggregator.register_probe("queue", true, Duration::from_secs(2), || async {
            std::future::pending::<()>().await;
            Ok(HealthStatus::Healthy)
        });

        let started = time::Instant::now();
        let health = aggregator.check_all().await;
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert!(started.elapsed() < Duration::from_millis(2100));

        let queue = &health.services["queue"];
        assert_eq!(queue.error.as_deref(), Some("probe timed out after 2000ms"));
        assert_eq!(queue.response_time, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_hung_probe() {
        let aggregator =
            HealthAggregator::new(Logger::default()).with_deadline(Duration::from_secs(3));
        aggregator.register_probe("fast", true, Duration::from_secs(1), || async {
            time::sleep(Duration::from_millis(200)).await;
            Ok(HealthStatus::Healthy)
        });
        aggregator.register_probe("medium", true, Duration::from_secs(2), || async {
            time::sleep(Duration::from_millis(1500)).await;
            Ok(HealthStatus::Healthy)
        });
        aggregator.register_probe("hung", false, Duration::from_secs(5), || async {
            std::future::pending::<()>().await;
            Ok(HealthStatus::Healthy)
        });

        let started = time::Instant::now();
        let health = aggregator.check_all().await;
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_millis(3100));
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.services["hung"].status, HealthStatus::Unhealthy);
        assert_eq!(health.services["medium"].status, HealthStatus::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_deadline_bounds_hung_dependency() {
        let aggregator = HealthAggregator::new(Logger::default());
        assert_eq!(aggregator.deadline(), Some(DEFAULT_AGGREGATE_DEADLINE));
        for (name, timeout, work) in [("fast", 1, Some(200)), ("medium", 2, Some(1500)), ("hung", 5, None)] {
            aggregator.register_probe(name, name != "hung", Duration::from_secs(timeout), move || async move {
                match work {
                    Some(ms) => time::sleep(Duration::from_millis(ms)).await,
                    None => std::future::pending::<()>().await,
                }
                Ok(HealthStatus::Healthy)
            });
        }

        let started = time::Instant::now();
        let health = aggregator.check_all().await;
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(1500) && elapsed < Duration::from_millis(3100));
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(
            health.services["hung"].error.as_deref(),
            Some("aggregate check deadline of 3000ms exceeded")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_deadline_waits_for_own_timeout() {
        let aggregator = HealthAggregator::new(Logger::default()).without_deadline();
        aggregator.register_probe("hung", false, Duration::from_secs(5), || async {
            std::future::pending::<()>().await;
            Ok(HealthStatus::Healthy)
        });

        let started = time::Instant::now();
        let health = aggregator.check_all().await;
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(health.services["hung"].error.as_deref(), Some("probe timed out after 5000ms"));
    }

    struct SetOnDrop(Arc<std::sync::atomic::AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_check_aborts_spawned_tasks() {
        let dropped = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let aggregator = HealthAggregator::new(Logger::default()).without_deadline();
        let flag = dropped.clone();
        aggregator.register_probe("stuck", true, Duration::from_secs(60), move || {
            let guard = SetOnDrop(flag.clone());
            async move {
                let _guard = guard;
                std::future::pending::<()>().await;
                Ok(HealthStatus::Healthy)
            }
        });

        let abandoned = time::timeout(Duration::from_secs(1), aggregator.check_all()).await;
        assert!(abandoned.is_err());

        time::sleep(Duration::from_millis(10)).await;
        assert!(dropped.load(std::sync::atomic::Ordering::SeqCst));

        dropped.store(false, std::sync::atomic::Ordering::SeqCst);
        let abandoned = time::timeout(Duration::from_secs(1), aggregator.check_one("stuck")).await;
        assert!(abandoned.is_err());
        time::sleep(Duration::from_millis(10)).await;
        assert!(dropped.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_register_configured() {
        let config: HealthConfig = toml::from_str(
            r#"
            default_timeout_ms = 1500

            [[probes]]
            name = "search"
            url = "http://127.0.0.1:9200/_cluster/health"

            [[probes]]
            name = "database"
            url = "http://127.0.0.1:5433/ready"
            critical = true
            timeout_ms = 250
            "#,
        )
        .unwrap();
        let aggregator = HealthAggregator::new(Logger::default());
        aggregator.register_configured(&config);

        let infos = aggregator.probes();
        assert_eq!(
            infos,
            vec![
                ProbeInfo { name: "database".into(), critical: true, timeout_ms: 250 },
                ProbeInfo { name: "search".into(), critical: false, timeout_ms: 1500 },
            ]
        );
    }

    #[tokio::test]
    async fn test_check_one_and_replace() {
        let sink = MemorySink::new();
        let aggregator = HealthAggregator::new(Logger::new(Arc::new(sink.clone())));
        aggregator.register_probe("db", true, Duration::from_secs(1), || async {
            Ok(HealthStatus::Healthy)
        });
        aggregator.register_probe("db", false, Duration::from_secs(1), || async {
            Ok(HealthStatus::Degraded)
        });

        assert_eq!(aggregator.len(), 1);
        assert_eq!(sink.find("Health probe replaced").len(), 1);

        let result = aggregator.check_one("db").await.unwrap();
        assert_eq!(result.status, HealthStatus::Degraded);
        assert!(!result.critical);

        let err = aggregator.check_one("missing").await.unwrap_err();
        assert_eq!(err.code(), "PROBE_NOT_FOUND");
        assert_eq!(err.status(), axum::http::StatusCode::NOT_FOUND);
    }
}
