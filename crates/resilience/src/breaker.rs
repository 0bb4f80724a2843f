use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use go2_common::CircuitBreakerConfig;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through; consecutive failures are counted.
    #[default]
    Closed,
    /// Calls are rejected without touching the dependency.
    Open,
    /// Probation: calls pass through to test whether the dependency recovered.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("circuit breaker {name} is open")]
    Open { name: String },

    #[error("call through circuit breaker {name} timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    /// The guarded operation's own error, unchanged.
    #[error("{0}")]
    Operation(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BreakerError::Timeout { .. })
    }

    /// The operation's error, if the operation ran and failed.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            BreakerError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

/// Point-in-time view of a breaker for admin and metrics endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_requests: u64,
    pub total_failures: u64,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    pub config: CircuitBreakerConfig,
}

#[derive(Debug, Default)]
struct BreakerCounters {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    total_requests: u64,
    total_failures: u64,
    /// Monotonic reading driving the open -> half-open timeout.
    last_failure: Option<Instant>,
    last_failure_time: Option<DateTime<Utc>>,
    last_success_time: Option<DateTime<Utc>>,
}

/// Per-dependency circuit breaker.
///
/// The counters sit behind a mutex that is only held for bookkeeping, never
/// across the guarded operation, so calls through a closed or half-open
/// breaker run concurrently.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    counters: Mutex<BreakerCounters>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            counters: Mutex::new(BreakerCounters::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state as last recorded. An open breaker whose recovery
    /// timeout has elapsed still reports `Open` until the next call.
    pub fn state(&self) -> CircuitState {
        self.counters.lock().state
    }

    /// Run `operation` under breaker protection.
    ///
    /// Returns [`BreakerError::Open`] without invoking `operation` when the
    /// breaker is open. Otherwise the outcome is recorded and the operation's
    /// value or error is handed back unchanged. An operation exceeding
    /// `call_timeout_secs` is dropped and recorded as a failure.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.acquire()?;

        let timeout = Duration::from_secs(self.config.call_timeout_secs);
        match tokio::time::timeout(timeout, operation()).await {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(e)) => {
                self.record_failure();
                Err(BreakerError::Operation(e))
            }
            Err(_) => {
                warn!(breaker = %self.name, ?timeout, "guarded call timed out");
                self.record_failure();
                Err(BreakerError::Timeout {
                    name: self.name.clone(),
                    timeout,
                })
            }
        }
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let c = self.counters.lock();
        CircuitBreakerStats {
            name: self.name.clone(),
            state: c.state,
            failure_count: c.failure_count,
            success_count: c.success_count,
            total_requests: c.total_requests,
            total_failures: c.total_failures,
            last_failure_time: c.last_failure_time,
            last_success_time: c.last_success_time,
            config: self.config,
        }
    }

    /// Return to `Closed` with every counter zeroed.
    pub fn reset(&self) {
        *self.counters.lock() = BreakerCounters::default();
        info!(breaker = %self.name, state = "closed", "circuit breaker manually reset");
    }

    fn acquire<E>(&self) -> Result<(), BreakerError<E>> {
        let mut c = self.counters.lock();

        if c.state == CircuitState::Open {
            let recovery = Duration::from_secs(self.config.recovery_timeout_secs);
            let recovered = c
                .last_failure
                .is_some_and(|at| Instant::now().saturating_duration_since(at) >= recovery);

            if !recovered {
                warn!(
                    breaker = %self.name,
                    state = %c.state,
                    failure_count = c.failure_count,
                    "circuit breaker is open, rejecting request"
                );
                return Err(BreakerError::Open {
                    name: self.name.clone(),
                });
            }

            c.state = CircuitState::HalfOpen;
            c.success_count = 0;
            info!(breaker = %self.name, state = "half_open", "circuit breaker transitioning to half-open");
        }

        c.total_requests += 1;
        Ok(())
    }

    fn record_success(&self) {
        let mut c = self.counters.lock();
        c.last_success_time = Some(Utc::now());

        match c.state {
            CircuitState::Closed => c.failure_count = 0,
            CircuitState::HalfOpen => {
                c.success_count += 1;
                if c.success_count >= self.config.success_threshold {
                    c.state = CircuitState::Closed;
                    c.failure_count = 0;
                    info!(breaker = %self.name, state = "closed", "circuit breaker transitioning to closed");
                }
            }
            // A call admitted before the breaker opened; it does not reopen anything.
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut c = self.counters.lock();
        c.last_failure = Some(Instant::now());
        c.last_failure_time = Some(Utc::now());
        c.failure_count += 1;
        c.total_failures += 1;

        match c.state {
            CircuitState::HalfOpen => {
                c.state = CircuitState::Open;
                c.success_count = 0;
                warn!(
                    breaker = %self.name,
                    state = "open",
                    failure_count = c.failure_count,
                    "probe failed, circuit breaker reopening"
                );
            }
            CircuitState::Closed if c.failure_count >= self.config.failure_threshold => {
                c.state = CircuitState::Open;
                warn!(
                    breaker = %self.name,
                    state = "open",
                    failure_count = c.failure_count,
                    threshold = self.config.failure_threshold,
                    "circuit breaker transitioning to open"
                );
            }
            _ => {}
        }
    }
}
