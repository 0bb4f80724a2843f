use std::sync::Arc;

use dashmap::DashMap;
use go2_common::{CircuitBreakerConfig, ResilienceConfig};

use crate::breaker::{CircuitBreaker, CircuitBreakerStats};

/// Name-keyed set of circuit breakers, one per downstream dependency.
///
/// Constructed once at startup and shared by reference. Breakers are created
/// on first lookup and live for the life of the registry.
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: ResilienceConfig,
}

impl BreakerRegistry {
    pub fn new(config: ResilienceConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    /// Get or create the breaker for `name`, using its configured override
    /// or the registry defaults.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_with_config(name, self.config.breaker(name))
    }

    /// Get or create the breaker for `name`. `config` is only used when the
    /// breaker does not exist yet.
    pub fn get_with_config(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return Arc::clone(existing.value());
        }

        let entry = self.breakers.entry(name.to_string()).or_insert_with(|| {
            tracing::info!(
                breaker = name,
                failure_threshold = config.failure_threshold,
                recovery_timeout_secs = config.recovery_timeout_secs,
                success_threshold = config.success_threshold,
                call_timeout_secs = config.call_timeout_secs,
                "creating circuit breaker"
            );
            Arc::new(CircuitBreaker::new(name, config))
        });
        Arc::clone(entry.value())
    }

    /// Existing breaker for `name`, without creating one.
    pub fn lookup(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| Arc::clone(b.value()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|b| b.key().clone()).collect();
        names.sort();
        names
    }

    /// Stats for every breaker, sorted by name.
    pub fn stats(&self) -> Vec<CircuitBreakerStats> {
        let mut stats: Vec<CircuitBreakerStats> =
            self.breakers.iter().map(|b| b.value().stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Reset the named breaker. Returns `false` if no such breaker exists.
    pub fn reset(&self, name: &str) -> bool {
        match self.lookup(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        for breaker in self.breakers.iter() {
            breaker.value().reset();
        }
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(ResilienceConfig::default())
    }
}
