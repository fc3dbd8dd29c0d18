//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber (pretty or JSON)
//! - Provide the injected `Logger` handle components write events to
//!
//! # Design Decisions
//! - Components never reach for a global logger; they hold a `Logger`
//! - `TracingSink` is the production sink, `MemorySink` captures events in tests
//! - Log level configurable via config and `RUST_LOG`

use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;
use crate::http::request::CorrelationId;

/// One structured log line.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub level: Level,
    pub message: String,
    pub correlation_id: Option<String>,
    pub fields: Map<String, Value>,
}

impl LogEvent {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            correlation_id: None,
            fields: Map::new(),
        }
    }

    pub fn correlation(mut self, id: &CorrelationId) -> Self {
        self.correlation_id = Some(id.to_string());
        self
    }

    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Destination for structured events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &LogEvent);
}

/// Cloneable handle injected into every component that logs.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn EventSink>,
}

impl Logger {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Logger forwarding to the process-wide tracing subscriber.
    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingSink))
    }

    pub fn emit(&self, event: LogEvent) {
        self.sink.emit(&event);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::tracing()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

/// Sink writing through `tracing` macros.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &LogEvent) {
        let correlation_id = event.correlation_id.as_deref().unwrap_or("none");
        let fields = Value::Object(event.fields.clone());
        let message = event.message.as_str();
        match event.level {
            Level::ERROR => tracing::error!(correlation_id, %fields, "{message}"),
            Level::WARN => tracing::warn!(correlation_id, %fields, "{message}"),
            Level::INFO => tracing::info!(correlation_id, %fields, "{message}"),
            Level::DEBUG => tracing::debug!(correlation_id, %fields, "{message}"),
            _ => tracing::trace!(correlation_id, %fields, "{message}"),
        }
    }
}

/// Sink keeping events in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<LogEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Events whose message matches exactly.
    pub fn find(&self, message: &str) -> Vec<LogEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.message == message)
            .collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &LogEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}

/// Install the global subscriber. Safe to call more than once.
pub fn init_logging(config: &ObservabilityConfig) {
    let default_filter = format!(
        "edge_resilience={level},tower_http={level}",
        level = config.log_level
    );
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    let json = config.log_format.eq_ignore_ascii_case("json");

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .try_init();

    if let Err(e) = result {
        tracing::debug!(error = %e, "Tracing subscriber already installed");
    }
}
