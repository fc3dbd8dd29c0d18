//! Retry logic for outbound calls.
//!
//! # Responsibilities
//! - Decide whether a failed attempt is eligible for another try
//! - Execute retries with exponential backoff
//! - Abort pending delays immediately on caller cancellation
//!
//! # Design Decisions
//! - Only safe methods (GET, HEAD, OPTIONS, TRACE) retry by default; writes and
//!   deletes need an explicit opt-in at the call site
//! - Deterministic taxonomy kinds are never retried
//! - Network-level failures and 5xx responses are retried
//! - The delay only suspends the calling task

use axum::http::Method;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::Level;

use crate::config::{ConfigError, RetryConfig};
use crate::errors::{ApiError, ErrorKind};
use crate::observability::metrics;
use crate::observability::{LogEvent, Logger};
use crate::resilience::backoff::calculate_backoff;

/// What the retry predicate can learn about a failed attempt.
pub trait RetryOutcome {
    /// Taxonomy kind, when the failure is classified.
    fn error_kind(&self) -> Option<ErrorKind> {
        None
    }

    /// Response status, when a response was received.
    fn status(&self) -> Option<u16> {
        None
    }

    /// True when no response was received (connect error, timeout, reset).
    fn is_network(&self) -> bool {
        false
    }
}

impl RetryOutcome for ApiError {
    fn error_kind(&self) -> Option<ErrorKind> {
        Some(self.kind())
    }

    fn status(&self) -> Option<u16> {
        Some(self.kind().status().as_u16())
    }
}

impl RetryOutcome for reqwest::Error {
    fn status(&self) -> Option<u16> {
        reqwest::Error::status(self).map(|s| s.as_u16())
    }

    fn is_network(&self) -> bool {
        self.is_connect() || self.is_timeout() || self.is_request()
    }
}

pub type RetryPredicate = Arc<dyn Fn(&dyn RetryOutcome) -> bool + Send + Sync>;

/// Retry network failures and 5xx; never retry deterministic kinds.
pub fn default_retry_predicate(outcome: &dyn RetryOutcome) -> bool {
    if outcome.error_kind().is_some_and(ErrorKind::is_deterministic) {
        return false;
    }
    if outcome.is_network() {
        return true;
    }
    matches!(outcome.status(), Some(500..=599))
}

/// Attempt budget, delay schedule and eligibility predicate.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    backoff_multiplier: f64,
    max_delay: Option<Duration>,
    jitter: f64,
    predicate: RetryPredicate,
}

impl RetryPolicy {
    /// Rejects `max_attempts == 0` and multipliers below 1.0.
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        backoff_multiplier: f64,
    ) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::InvalidPolicy(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if !(backoff_multiplier >= 1.0) || !backoff_multiplier.is_finite() {
            return Err(ConfigError::InvalidPolicy(format!(
                "backoff_multiplier must be a finite value >= 1.0, got {backoff_multiplier}"
            )));
        }
        Ok(Self {
            max_attempts,
            base_delay,
            backoff_multiplier,
            max_delay: None,
            jitter: 0.0,
            predicate: Arc::new(default_retry_predicate),
        })
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            max_delay: None,
            jitter: 0.0,
            predicate: Arc::new(default_retry_predicate),
        }
    }

    /// 3 attempts: immediate → 1s → 1.5s.
    pub fn standard() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 1.5,
            max_delay: None,
            jitter: 0.0,
            predicate: Arc::new(default_retry_predicate),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Result<Self, ConfigError> {
        if !config.enabled {
            return Ok(Self::none());
        }
        let policy = Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            config.backoff_multiplier,
        )?;
        let policy = match config.max_delay_ms {
            0 => policy,
            ms => policy.with_max_delay(Duration::from_millis(ms)),
        };
        policy.with_jitter(config.jitter)
    }

    /// Configured policy for safe methods, `none()` for everything else.
    pub fn for_method(method: &Method, config: &RetryConfig) -> Result<Self, ConfigError> {
        if method.is_safe() {
            Self::from_config(config)
        } else {
            Ok(Self::none())
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Result<Self, ConfigError> {
        if !(0.0..1.0).contains(&jitter) {
            return Err(ConfigError::InvalidPolicy(format!(
                "jitter must be in [0.0, 1.0), got {jitter}"
            )));
        }
        self.jitter = jitter;
        Ok(self)
    }

    pub fn with_predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&dyn RetryOutcome) -> bool + Send + Sync + 'static,
    {
        self.predicate = Arc::new(predicate);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay slept before attempt `attempt` (1-based). Zero for the first.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        calculate_backoff(
            attempt.saturating_sub(1),
            self.base_delay,
            self.backoff_multiplier,
            self.max_delay,
            self.jitter,
        )
    }

    pub fn should_retry(&self, outcome: &dyn RetryOutcome) -> bool {
        (self.predicate)(outcome)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("max_delay", &self.max_delay)
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}

/// Final failure of a retried call.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// No attempts left, or the last failure was not retryable.
    #[error("call failed after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: E },

    /// The caller's cancellation fired first.
    #[error("call cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32, last: Option<E> },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Cancelled { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn last(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::Cancelled { last, .. } => last.as_ref(),
        }
    }

    pub fn into_last(self) -> Option<E> {
        match self {
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::Cancelled { last, .. } => last,
        }
    }
}

/// Runs fallible async calls under a `RetryPolicy`.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    logger: Logger,
}

impl RetryExecutor {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }

    /// Run `call` until it succeeds, fails non-retryably, or attempts run out.
    /// The closure receives the 1-based attempt number.
    pub async fn execute<F, Fut, T, E>(&self, call: F, policy: &RetryPolicy) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryOutcome + fmt::Display,
    {
        self.execute_until(call, policy, std::future::pending::<()>()).await
    }

    /// Like [`execute`](Self::execute), racing every attempt and delay against
    /// `cancel` (a deadline, a shutdown signal...).
    pub async fn execute_until<F, Fut, T, E, C>(
        &self,
        mut call: F,
        policy: &RetryPolicy,
        cancel: C,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryOutcome + fmt::Display,
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);
        let mut attempt: u32 = 1;
        let mut last: Option<E> = None;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = &mut cancel => {
                    self.log_cancelled(attempt);
                    return Err(RetryError::Cancelled { attempts: attempt, last });
                }
                outcome = call(attempt) => outcome,
            };

            let err = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        metrics::record_retry("recovered");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let retryable = policy.should_retry(&err);
            if !retryable || attempt >= policy.max_attempts() {
                metrics::record_retry(if retryable { "exhausted" } else { "rejected" });
                self.logger.emit(
                    LogEvent::new(Level::WARN, "Outbound call failed")
                        .field("attempts", attempt)
                        .field("max_attempts", policy.max_attempts())
                        .field("retryable", retryable)
                        .field("error", err.to_string()),
                );
                return Err(RetryError::Exhausted { attempts: attempt, last: err });
            }

            let delay = policy.delay_before(attempt + 1);
            metrics::record_retry("scheduled");
            self.logger.emit(
                LogEvent::new(Level::INFO, "Retrying outbound call")
                    .field("attempt", attempt)
                    .field("delay_ms", u64::try_from(delay.as_millis()).unwrap_or(u64::MAX))
                    .field("error", err.to_string()),
            );
            last = Some(err);

            tokio::select! {
                biased;
                _ = &mut cancel => {
                    self.log_cancelled(attempt);
                    return Err(RetryError::Cancelled { attempts: attempt, last });
                }
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    fn log_cancelled(&self, attempt: u32) {
        metrics::record_retry("cancelled");
        self.logger.emit(
            LogEvent::new(Level::INFO, "Outbound call cancelled").field("attempts", attempt),
        );
    }
}
