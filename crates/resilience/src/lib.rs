//! Isolation from failing downstream dependencies.
//!
//! - [`CircuitBreaker`] guards one dependency with a
//!   closed / open / half-open state machine and a call timeout.
//! - [`BreakerRegistry`] hands out one breaker per dependency name, creating
//!   it on first use.
//! - [`FallbackStrategy`] implementations ([`DefaultValueFallback`],
//!   [`CachedFallback`]) produce substitute values.
//! - [`GracefulDegradation`] combines a registry breaker with a fallback so a
//!   dependency call always yields a value.
//!
//! ```no_run
//! use go2_resilience::{BreakerRegistry, DefaultValueFallback, GracefulDegradation};
//!
//! # async fn lookup_country(_ip: &str) -> Result<String, std::io::Error> { Ok("NZ".into()) }
//! # async fn demo() {
//! let registry = BreakerRegistry::default();
//! let geo = GracefulDegradation::new(
//!     &registry,
//!     "geolocation",
//!     DefaultValueFallback::new("Unknown".to_string()),
//! );
//!
//! let country = geo.execute(|| lookup_country("203.0.113.9")).await;
//! # let _ = country;
//! # }
//! ```

pub mod breaker;
pub mod degradation;
pub mod fallback;
pub mod registry;

pub use breaker::{BreakerError, CircuitBreaker, CircuitBreakerStats, CircuitState};
pub use degradation::{Degraded, GracefulDegradation, ValueSource};
pub use fallback::{CachedFallback, DefaultValueFallback, FallbackCause, FallbackStrategy};
pub use registry::BreakerRegistry;
