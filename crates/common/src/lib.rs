//! Configuration and error types shared by the go2 crates.

pub mod config;
pub mod error;

pub use config::{
    AppConfig, CircuitBreakerConfig, EndpointLimitConfig, LimitConfig, RateLimitConfig,
    ResilienceConfig, ServerConfig,
};
pub use error::{Go2Error, Go2Result};
