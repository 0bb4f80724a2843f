use std::sync::Arc;

use go2_common::AppConfig;
use go2_rate_limit::RateLimitGate;
use go2_resilience::{BreakerRegistry, CircuitState};
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry};

use crate::probe::DependencyProbe;

/// Shared state type alias used across all route handlers.
pub type SharedState = Arc<AppState>;

/// Everything a request handler needs: configuration, the rate-limit gate,
/// the breaker registry, dependency probes and metrics.
pub struct AppState {
    pub config: AppConfig,
    pub gate: RateLimitGate,
    pub breakers: Arc<BreakerRegistry>,
    pub probes: Vec<Arc<dyn DependencyProbe>>,
    pub metrics: ApiMetrics,
    pub start_time: std::time::Instant,
}

/// Prometheus metrics exported on `/api/metrics`.
pub struct ApiMetrics {
    pub registry: Registry,
    pub requests_total: IntCounter,
    pub rate_limited_total: IntCounterVec,
    pub request_duration: HistogramVec,
    pub breaker_state: IntGaugeVec,
}

impl ApiMetrics {
    /// Create the metric set registered against a fresh Prometheus registry.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounter::with_opts(Opts::new(
            "go2_requests_total",
            "Total number of requests processed",
        ))?;

        let rate_limited_total = IntCounterVec::new(
            Opts::new(
                "go2_rate_limited_total",
                "Requests rejected by the rate limiter, by policy",
            ),
            &["scope"],
        )?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "go2_request_duration_seconds",
                "Request processing duration in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
            &["method", "status"],
        )?;

        let breaker_state = IntGaugeVec::new(
            Opts::new(
                "go2_circuit_breaker_state",
                "Circuit breaker state (0 = closed, 1 = half-open, 2 = open)",
            ),
            &["breaker"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(rate_limited_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(breaker_state.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            rate_limited_total,
            request_duration,
            breaker_state,
        })
    }

    /// Copy the current state of every breaker into the state gauge.
    pub fn refresh_breaker_states(&self, breakers: &BreakerRegistry) {
        for stats in breakers.stats() {
            let value = match stats.state {
                CircuitState::Closed => 0,
                CircuitState::HalfOpen => 1,
                CircuitState::Open => 2,
            };
            self.breaker_state
                .with_label_values(&[stats.name.as_str()])
                .set(value);
        }
    }
}

impl AppState {
    /// Create a new AppState from the given configuration.
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let gate = RateLimitGate::from_config(&config.rate_limit);
        let breakers = Arc::new(BreakerRegistry::new(config.resilience.clone()));

        Ok(Self {
            config,
            gate,
            breakers,
            probes: Vec::new(),
            metrics: ApiMetrics::new()?,
            start_time: std::time::Instant::now(),
        })
    }

    /// Register a dependency checked by `/health` through its circuit breaker.
    ///
    /// The `go2-api` binary registers none; probes are for embedders that
    /// build their own state around the router.
    pub fn with_probe(mut self, probe: Arc<dyn DependencyProbe>) -> Self {
        self.probes.push(probe);
        self
    }
}
