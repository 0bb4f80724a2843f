use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::info;

use crate::breaker::BreakerError;

/// Why a fallback value was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackCause {
    /// The breaker was open; the dependency was not called.
    CircuitOpen,
    /// The dependency did not answer within the breaker's call timeout.
    Timeout,
    /// The dependency returned an error.
    Failed(String),
}

impl FallbackCause {
    pub fn from_error<E: fmt::Display>(err: &BreakerError<E>) -> Self {
        match err {
            BreakerError::Open { .. } => FallbackCause::CircuitOpen,
            BreakerError::Timeout { .. } => FallbackCause::Timeout,
            BreakerError::Operation(e) => FallbackCause::Failed(e.to_string()),
        }
    }
}

/// Substitute value source for a degraded dependency.
///
/// `execute` must not fail: it is the last line of defence behind a
/// [`GracefulDegradation`](crate::GracefulDegradation) wrapper.
pub trait FallbackStrategy<T>: Send + Sync {
    fn execute(&self, cause: &FallbackCause) -> T;

    /// Called with every value the primary dependency produced.
    fn observe_success(&self, _value: &T) {}
}

impl<T, S> FallbackStrategy<T> for Arc<S>
where
    S: FallbackStrategy<T> + ?Sized,
{
    fn execute(&self, cause: &FallbackCause) -> T {
        (**self).execute(cause)
    }

    fn observe_success(&self, value: &T) {
        (**self).observe_success(value)
    }
}

/// Always answers with the same value.
#[derive(Debug, Clone)]
pub struct DefaultValueFallback<T> {
    value: T,
}

impl<T> DefaultValueFallback<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T> FallbackStrategy<T> for DefaultValueFallback<T>
where
    T: Clone + fmt::Debug + Send + Sync,
{
    fn execute(&self, cause: &FallbackCause) -> T {
        info!(?cause, default_value = ?self.value, "using default value fallback");
        self.value.clone()
    }
}

/// Answers with the last value the dependency returned successfully, or a
/// default until one has been seen.
pub struct CachedFallback<T> {
    cache_key: String,
    cached: ArcSwapOption<T>,
    default_value: T,
}

impl<T> CachedFallback<T> {
    pub fn new(cache_key: impl Into<String>, default_value: T) -> Self {
        Self {
            cache_key: cache_key.into(),
            cached: ArcSwapOption::empty(),
            default_value,
        }
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn cached(&self) -> Option<Arc<T>> {
        self.cached.load_full()
    }
}

impl<T> FallbackStrategy<T> for CachedFallback<T>
where
    T: Clone + Send + Sync,
{
    fn execute(&self, cause: &FallbackCause) -> T {
        match self.cached.load_full() {
            Some(value) => {
                info!(cache_key = %self.cache_key, ?cause, "using cached fallback");
                T::clone(&value)
            }
            None => {
                info!(cache_key = %self.cache_key, ?cause, "cache empty, using default fallback");
                self.default_value.clone()
            }
        }
    }

    fn observe_success(&self, value: &T) {
        self.cached.store(Some(Arc::new(value.clone())));
    }
}
