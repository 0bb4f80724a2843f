use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use go2_common::CircuitBreakerConfig;
use tracing::warn;

use crate::breaker::CircuitBreaker;
use crate::fallback::{FallbackCause, FallbackStrategy};
use crate::registry::BreakerRegistry;

/// Where a [`Degraded`] value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    Primary,
    Fallback(FallbackCause),
}

/// A value produced by [`GracefulDegradation`], tagged with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Degraded<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Degraded<T> {
    pub fn is_degraded(&self) -> bool {
        matches!(self.source, ValueSource::Fallback(_))
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

/// A named dependency call that always yields a value.
///
/// Calls go through the registry breaker for `name`; when the breaker
/// rejects the call, the call times out, or the dependency fails, the
/// fallback supplies the value instead. A returned value therefore does not
/// mean the dependency was reached. Use
/// [`execute_with_source`](Self::execute_with_source) to find out.
pub struct GracefulDegradation<T, F> {
    name: String,
    breaker: Arc<CircuitBreaker>,
    fallback: F,
    _value: PhantomData<fn() -> T>,
}

impl<T, F> GracefulDegradation<T, F>
where
    F: FallbackStrategy<T>,
{
    pub fn new(registry: &BreakerRegistry, name: &str, fallback: F) -> Self {
        Self::from_breaker(registry.get(name), fallback)
    }

    pub fn with_config(
        registry: &BreakerRegistry,
        name: &str,
        fallback: F,
        config: CircuitBreakerConfig,
    ) -> Self {
        Self::from_breaker(registry.get_with_config(name, config), fallback)
    }

    pub fn from_breaker(breaker: Arc<CircuitBreaker>, fallback: F) -> Self {
        Self {
            name: breaker.name().to_string(),
            breaker,
            fallback,
            _value: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn fallback(&self) -> &F {
        &self.fallback
    }

    pub async fn execute<Op, Fut, E>(&self, operation: Op) -> T
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.execute_with_source(operation).await.into_value()
    }

    pub async fn execute_with_source<Op, Fut, E>(&self, operation: Op) -> Degraded<T>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        match self.breaker.call(operation).await {
            Ok(value) => {
                self.fallback.observe_success(&value);
                Degraded {
                    value,
                    source: ValueSource::Primary,
                }
            }
            Err(err) => {
                warn!(
                    service = %self.name,
                    error = %err,
                    fallback_used = true,
                    "service failed, using fallback"
                );
                let cause = FallbackCause::from_error(&err);
                Degraded {
                    value: self.fallback.execute(&cause),
                    source: ValueSource::Fallback(cause),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::{CachedFallback, DefaultValueFallback};
    use crate::CircuitState;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn strict() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 2,
            recovery_timeout_secs: 60,
            success_threshold: 1,
            call_timeout_secs: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failure_yields_fallback_value() {
        let registry = BreakerRegistry::default();
        let geo = GracefulDegradation::new(
            &registry,
            "geolocation",
            DefaultValueFallback::new("Unknown".to_string()),
        );

        let country = geo
            .execute(|| async { Err::<String, _>("connection refused") })
            .await;
        assert_eq!(country, "Unknown");
    }

    #[tokio::test(start_paused = true)]
    async fn never_fails_across_open_breaker() {
        let registry = BreakerRegistry::default();
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let safety = GracefulDegradation::with_config(
            &registry,
            "safety",
            DefaultValueFallback::new(true),
            strict(),
        );

        for _ in 0..5 {
            let outcome = safety
                .execute_with_source(move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<bool, _>("quota exceeded")
                })
                .await;
            assert!(outcome.value);
            assert!(outcome.is_degraded());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(registry.get("safety").state(), CircuitState::Open);

        let outcome = safety
            .execute_with_source(|| async { Ok::<_, &str>(false) })
            .await;
        assert_eq!(outcome.source, ValueSource::Fallback(FallbackCause::CircuitOpen));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_falls_back() {
        let registry = BreakerRegistry::default();
        let email = GracefulDegradation::with_config(
            &registry,
            "email",
            DefaultValueFallback::new(0u32),
            strict(),
        );

        let outcome = email
            .execute_with_source(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<u32, &str>(1)
            })
            .await;

        assert_eq!(outcome.value, 0);
        assert_eq!(outcome.source, ValueSource::Fallback(FallbackCause::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn cached_fallback_serves_last_good_value() {
        let registry = BreakerRegistry::default();
        let geo = GracefulDegradation::new(
            &registry,
            "geolocation",
            CachedFallback::new("geo", "Unknown".to_string()),
        );

        let first = geo
            .execute_with_source(|| async { Ok::<_, &str>("NZ".to_string()) })
            .await;
        assert_eq!(first.source, ValueSource::Primary);

        let second = geo
            .execute_with_source(|| async { Err::<String, _>("503") })
            .await;
        assert_eq!(second.value, "NZ");
        assert_eq!(
            second.source,
            ValueSource::Fallback(FallbackCause::Failed("503".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shares_breaker_with_registry() {
        let registry = BreakerRegistry::default();
        let a: GracefulDegradation<i32, _> =
            GracefulDegradation::new(&registry, "qr", DefaultValueFallback::new(1));
        let b: GracefulDegradation<i32, _> =
            GracefulDegradation::new(&registry, "qr", DefaultValueFallback::new(2));

        assert!(Arc::ptr_eq(a.breaker(), b.breaker()));
        assert_eq!(a.name(), "qr");
        assert_eq!(registry.len(), 1);
    }
}
