use go2_common::RateLimitConfig;
use std::time::Duration;

/// Name of the catch-all policy applied to every request.
pub const GLOBAL_POLICY: &str = "global";

/// An immutable `(limit, window)` pair attached to a path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub pattern: String,
    pub limit: u64,
    pub window_secs: u64,
}

impl RateLimitPolicy {
    pub fn new(pattern: impl Into<String>, limit: u64, window_secs: u64) -> Self {
        Self {
            pattern: pattern.into(),
            limit,
            window_secs,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(self.pattern.as_str())
    }
}

/// The global policy plus endpoint policies in declaration order.
#[derive(Debug, Clone)]
pub struct RateLimitPolicyTable {
    global: RateLimitPolicy,
    endpoints: Vec<RateLimitPolicy>,
}

impl RateLimitPolicyTable {
    pub fn new(global: RateLimitPolicy, endpoints: Vec<RateLimitPolicy>) -> Self {
        Self { global, endpoints }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        let global = RateLimitPolicy::new(
            GLOBAL_POLICY,
            config.global.limit,
            config.global.window_secs,
        );
        let endpoints = config
            .endpoints
            .iter()
            .filter(|e| e.pattern != GLOBAL_POLICY)
            .map(|e| RateLimitPolicy::new(e.pattern.clone(), e.limit, e.window_secs))
            .collect();
        Self::new(global, endpoints)
    }

    pub fn global(&self) -> &RateLimitPolicy {
        &self.global
    }

    pub fn endpoints(&self) -> &[RateLimitPolicy] {
        &self.endpoints
    }

    /// First endpoint policy, in declaration order, whose pattern prefixes
    /// `path`. This is not a longest-prefix match.
    pub fn endpoint_policy(&self, path: &str) -> Option<&RateLimitPolicy> {
        self.endpoints.iter().find(|policy| policy.matches(path))
    }
}

impl Default for RateLimitPolicyTable {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}
