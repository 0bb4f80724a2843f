use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub resilience: ResilienceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            environment: default_environment(),
        }
    }
}

impl ServerConfig {
    /// Replace the port of `listen`, keeping its host.
    pub fn override_port(&mut self, port: &str) -> crate::Go2Result<()> {
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|_| crate::Go2Error::Config(format!("invalid port '{}'", port)))?;
        let host = match self.listen.rsplit_once(':') {
            Some((host, _)) if !host.is_empty() => host.to_string(),
            _ => "0.0.0.0".to_string(),
        };
        self.listen = format!("{}:{}", host, port);
        Ok(())
    }
}

/// Rate limiting: one global policy plus endpoint policies keyed by path prefix.
///
/// `endpoints` is consulted in declaration order and the first matching
/// prefix wins, so overlapping prefixes must be listed most specific first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_skip_paths")]
    pub skip_paths: Vec<String>,
    #[serde(default = "default_global_limit")]
    pub global: LimitConfig,
    #[serde(default = "default_endpoint_limits")]
    pub endpoints: Vec<EndpointLimitConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            skip_paths: default_skip_paths(),
            global: default_global_limit(),
            endpoints: default_endpoint_limits(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitConfig {
    pub limit: u64,
    pub window_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointLimitConfig {
    pub pattern: String,
    pub limit: u64,
    pub window_secs: u64,
}

impl EndpointLimitConfig {
    fn new(pattern: &str, limit: u64, window_secs: u64) -> Self {
        Self {
            pattern: pattern.to_string(),
            limit,
            window_secs,
        }
    }
}

/// Settings for a single circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Seconds an open breaker waits before letting a probe through.
    #[serde(default = "default_recovery_timeout")]
    pub recovery_timeout_secs: u64,
    /// Half-open successes required to close again.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    /// Upper bound on a single guarded call; exceeding it counts as a failure.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout(),
            success_threshold: default_success_threshold(),
            call_timeout_secs: default_call_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default)]
    pub defaults: CircuitBreakerConfig,
    /// Per-dependency overrides, keyed by breaker name.
    #[serde(default)]
    pub breakers: BTreeMap<String, CircuitBreakerConfig>,
}

impl ResilienceConfig {
    /// Config for the named breaker, falling back to `defaults`.
    pub fn breaker(&self, name: &str) -> CircuitBreakerConfig {
        self.breakers.get(name).copied().unwrap_or(self.defaults)
    }
}

// Default value helpers
fn default_listen() -> String {
    "0.0.0.0:8000".to_string()
}
fn default_environment() -> String {
    "development".to_string()
}
fn default_true() -> bool {
    true
}
fn default_skip_paths() -> Vec<String> {
    vec![
        "/docs".to_string(),
        "/redoc".to_string(),
        "/openapi.json".to_string(),
    ]
}
fn default_global_limit() -> LimitConfig {
    LimitConfig {
        limit: 100,
        window_secs: 60,
    }
}
fn default_endpoint_limits() -> Vec<EndpointLimitConfig> {
    vec![
        EndpointLimitConfig::new("/api/links/shorten", 10, 60),
        EndpointLimitConfig::new("/api/qr/", 30, 60),
        EndpointLimitConfig::new("/health", 10, 10),
        EndpointLimitConfig::new("/api/users/", 20, 60),
    ]
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_recovery_timeout() -> u64 {
    60
}
fn default_success_threshold() -> u32 {
    3
}
fn default_call_timeout() -> u64 {
    30
}

impl AppConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &str) -> crate::Go2Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML document.
    pub fn from_yaml(content: &str) -> crate::Go2Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency.
    pub fn validate(&self) -> crate::Go2Result<()> {
        use crate::Go2Error::Config;

        if self.server.listen.trim().is_empty() {
            return Err(Config("server.listen must not be empty".into()));
        }

        let global = &self.rate_limit.global;
        if global.limit == 0 || global.window_secs == 0 {
            return Err(Config(
                "rate_limit.global limit and window_secs must be positive".into(),
            ));
        }

        for endpoint in &self.rate_limit.endpoints {
            if !endpoint.pattern.starts_with('/') {
                return Err(Config(format!(
                    "rate limit pattern '{}' must start with '/'",
                    endpoint.pattern
                )));
            }
            if endpoint.limit == 0 || endpoint.window_secs == 0 {
                return Err(Config(format!(
                    "rate limit for '{}' must have a positive limit and window_secs",
                    endpoint.pattern
                )));
            }
        }

        let named = self
            .resilience
            .breakers
            .iter()
            .map(|(name, cfg)| (name.as_str(), cfg));
        for (name, cfg) in std::iter::once(("defaults", &self.resilience.defaults)).chain(named) {
            if cfg.failure_threshold == 0 || cfg.success_threshold == 0 {
                return Err(Config(format!(
                    "circuit breaker '{}' thresholds must be positive",
                    name
                )));
            }
            if cfg.call_timeout_secs == 0 {
                return Err(Config(format!(
                    "circuit breaker '{}' call_timeout_secs must be positive",
                    name
                )));
            }
        }

        Ok(())
    }
}
