//! Request admission control for the go2 API.
//!
//! This crate is transport-agnostic. The HTTP layer resolves a
//! [`ClientIdentity`] and a request path, asks the [`RateLimitGate`] for a
//! [`GateDecision`], and turns a rejection into a 429 response.
//!
//! - [`SlidingWindowCounter`] keeps an exact timestamp log per key and
//!   decides admit/reject for any `(limit, window)` pair.
//! - [`RateLimitPolicyTable`] maps path prefixes to limits, plus the global
//!   policy every request is counted against.
//! - [`RateLimitGate`] runs the two-phase check: global policy keyed by
//!   identity, then the first matching endpoint policy keyed by identity and
//!   path.
//!
//! All state is process-local; separate instances each keep their own view.

pub mod identity;
pub mod policy;
pub mod sliding_window;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use go2_common::RateLimitConfig;

pub use identity::ClientIdentity;
pub use policy::{RateLimitPolicy, RateLimitPolicyTable, GLOBAL_POLICY};
pub use sliding_window::{RateDecision, SlidingWindowCounter};

/// Which policy rejected a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitScope {
    Global,
    Endpoint(String),
}

impl LimitScope {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &str {
        match self {
            LimitScope::Global => GLOBAL_POLICY,
            LimitScope::Endpoint(pattern) => pattern,
        }
    }
}

impl fmt::Display for LimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// The path is allow-listed or the gate is disabled; nothing was counted.
    Skipped,
    Admitted,
    Rejected {
        retry_after_secs: u64,
        scope: LimitScope,
    },
}

/// Global-policy usage for an identity, reported in `X-RateLimit-*` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitUsage {
    pub limit: u64,
    pub remaining: u64,
    /// Unix timestamp (seconds) at which a full window has elapsed.
    pub reset: i64,
}

/// Request-facing rate limiter combining a policy table with one shared
/// [`SlidingWindowCounter`].
///
/// The gate is cheaply cloneable (backed by `Arc`) and safe to share across
/// tasks and threads.
#[derive(Clone)]
pub struct RateLimitGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    enabled: bool,
    skip_paths: Vec<String>,
    policies: RateLimitPolicyTable,
    counter: SlidingWindowCounter,
}

impl RateLimitGate {
    pub fn new(policies: RateLimitPolicyTable, skip_paths: Vec<String>) -> Self {
        Self::build(true, policies, skip_paths)
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        if !config.enabled {
            tracing::warn!("rate limiting disabled by configuration");
        }
        Self::build(
            config.enabled,
            RateLimitPolicyTable::from_config(config),
            config.skip_paths.clone(),
        )
    }

    fn build(enabled: bool, policies: RateLimitPolicyTable, skip_paths: Vec<String>) -> Self {
        tracing::info!(
            enabled,
            global_limit = policies.global().limit,
            global_window_secs = policies.global().window_secs,
            endpoint_policies = policies.endpoints().len(),
            "creating sliding window rate limit gate"
        );
        Self {
            inner: Arc::new(GateInner {
                enabled,
                skip_paths,
                policies,
                counter: SlidingWindowCounter::new(),
            }),
        }
    }

    pub fn policies(&self) -> &RateLimitPolicyTable {
        &self.inner.policies
    }

    pub fn counter(&self) -> &SlidingWindowCounter {
        &self.inner.counter
    }

    pub fn should_skip(&self, path: &str) -> bool {
        !self.inner.enabled
            || self
                .inner
                .skip_paths
                .iter()
                .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Run the global and endpoint checks for one request.
    pub fn check(&self, identity: &ClientIdentity, path: &str) -> GateDecision {
        self.check_at(identity, path, Instant::now())
    }

    pub fn check_at(&self, identity: &ClientIdentity, path: &str, now: Instant) -> GateDecision {
        if self.should_skip(path) {
            return GateDecision::Skipped;
        }

        let client_key = identity.key();

        let global = self.inner.policies.global();
        if let Some(retry_after_secs) = self.check_policy(&client_key, global, now) {
            return GateDecision::Rejected {
                retry_after_secs,
                scope: LimitScope::Global,
            };
        }

        if let Some(policy) = self.inner.policies.endpoint_policy(path) {
            let endpoint_key = format!("{}:{}", client_key, path);
            if let Some(retry_after_secs) = self.check_policy(&endpoint_key, policy, now) {
                return GateDecision::Rejected {
                    retry_after_secs,
                    scope: LimitScope::Endpoint(policy.pattern.clone()),
                };
            }
        }

        GateDecision::Admitted
    }

    /// Current global usage for `identity`, recounted at call time.
    pub fn usage(&self, identity: &ClientIdentity) -> RateLimitUsage {
        self.usage_at(identity, Instant::now())
    }

    pub fn usage_at(&self, identity: &ClientIdentity, now: Instant) -> RateLimitUsage {
        let global = self.inner.policies.global();
        let current = self
            .inner
            .counter
            .current_count_at(&identity.key(), global.window(), now);

        RateLimitUsage {
            limit: global.limit,
            remaining: global.limit.saturating_sub(current),
            reset: chrono::Utc::now().timestamp() + global.window_secs as i64,
        }
    }

    fn check_policy(&self, key: &str, policy: &RateLimitPolicy, now: Instant) -> Option<u64> {
        let retry_after = self
            .inner
            .counter
            .is_allowed_at(key, policy.limit, policy.window(), now)
            .retry_after()?;

        tracing::warn!(
            client_key = %key,
            endpoint = %policy.pattern,
            limit = policy.limit,
            window = policy.window_secs,
            retry_after,
            "rate limit exceeded"
        );
        Some(retry_after)
    }
}
