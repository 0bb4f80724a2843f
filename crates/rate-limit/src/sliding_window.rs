use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Minimum wall time between two opportunistic sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// The window is full; the oldest tracked request leaves it in
    /// `retry_after_secs` seconds (rounded up, always at least 1).
    Limited { retry_after_secs: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            RateDecision::Allowed => None,
            RateDecision::Limited { retry_after_secs } => Some(*retry_after_secs),
        }
    }
}

/// A concurrent sliding window log rate limiter.
///
/// Every key owns an ascending log of admission timestamps. A check trims the
/// entries that fell out of the trailing window, rejects when the log is
/// full, and otherwise appends `now`. The trim, the capacity check and the
/// append all happen while holding the key's [`DashMap`] shard lock, so two
/// concurrent checks on one key can never both take the last free slot.
///
/// Limits and windows are supplied per call, which lets one counter serve
/// every policy in a table. Each log remembers the window it was last checked
/// with, and sweeps age keys by that window.
pub struct SlidingWindowCounter {
    requests: DashMap<String, WindowLog>,
    last_sweep: Mutex<Instant>,
}

#[derive(Debug)]
struct WindowLog {
    window: Duration,
    timestamps: VecDeque<Instant>,
}

impl WindowLog {
    fn new(window: Duration) -> Self {
        Self {
            window,
            timestamps: VecDeque::new(),
        }
    }
}

impl SlidingWindowCounter {
    pub fn new() -> Self {
        Self {
            requests: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Check whether a request identified by `key` fits in `limit` requests
    /// per `window`, recording it if so.
    pub fn is_allowed(&self, key: &str, limit: u64, window: Duration) -> RateDecision {
        self.is_allowed_at(key, limit, window, Instant::now())
    }

    /// Same as [`is_allowed`](Self::is_allowed) with an explicit clock reading.
    pub fn is_allowed_at(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
        now: Instant,
    ) -> RateDecision {
        // Must run before taking the entry: `retain` locks every shard.
        self.maybe_sweep(now);

        let mut entry = self
            .requests
            .entry(key.to_string())
            .or_insert_with(|| WindowLog::new(window));
        let log = entry.value_mut();
        log.window = window;
        let timestamps = &mut log.timestamps;

        trim(timestamps, now, window);

        if timestamps.len() as u64 >= limit {
            let oldest = timestamps.front().copied().unwrap_or(now);
            let retry_after_secs = (oldest + window).saturating_duration_since(now).as_secs() + 1;
            return RateDecision::Limited { retry_after_secs };
        }

        timestamps.push_back(now);
        RateDecision::Allowed
    }

    /// Number of recorded requests for `key` inside the trailing `window`.
    ///
    /// Read-only: nothing is trimmed or appended.
    pub fn current_count(&self, key: &str, window: Duration) -> u64 {
        self.current_count_at(key, window, Instant::now())
    }

    pub fn current_count_at(&self, key: &str, window: Duration, now: Instant) -> u64 {
        self.requests
            .get(key)
            .map(|log| {
                log.timestamps
                    .iter()
                    .filter(|&&t| now.saturating_duration_since(t) < window)
                    .count() as u64
            })
            .unwrap_or(0)
    }

    /// Number of keys currently holding a timestamp log.
    pub fn tracked_keys(&self) -> usize {
        self.requests.len()
    }

    /// Drop timestamps that fell out of their own key's window and remove
    /// keys left empty. Returns the number of keys removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.requests.len();

        self.requests.retain(|_key, log| {
            trim(&mut log.timestamps, now, log.window);
            !log.timestamps.is_empty()
        });

        let remaining = self.requests.len();
        let removed = before.saturating_sub(remaining);
        tracing::debug!(removed, remaining, "sliding window sweep complete");
        removed
    }

    fn maybe_sweep(&self, now: Instant) {
        {
            let mut last_sweep = self.last_sweep.lock();
            if now.saturating_duration_since(*last_sweep) <= SWEEP_INTERVAL {
                return;
            }
            *last_sweep = now;
        }

        self.sweep_at(now);
    }
}

impl Default for SlidingWindowCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Pop every timestamp at least `window` old. The log is append-ordered, so
/// expired entries always form a prefix.
fn trim(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = timestamps.front() {
        if now.saturating_duration_since(oldest) >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    const MINUTE: Duration = Duration::from_secs(60);

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn allows_up_to_limit() {
        let counter = SlidingWindowCounter::new();
        let t0 = Instant::now();

        for i in 0..5 {
            assert!(
                counter.is_allowed_at("client", 5, MINUTE, t0).is_allowed(),
                "request {} should be allowed",
                i
            );
        }

        let decision = counter.is_allowed_at("client", 5, MINUTE, t0);
        assert!(!decision.is_allowed(), "should deny beyond limit");
        assert!(decision.retry_after().unwrap() > 0);
    }

    #[test]
    fn full_window_then_recovery() {
        let counter = SlidingWindowCounter::new();
        let key = "ip:1.2.3.4";
        let t0 = Instant::now();

        for _ in 0..10 {
            assert!(counter.is_allowed_at(key, 10, MINUTE, t0).is_allowed());
        }

        let retry = counter
            .is_allowed_at(key, 10, MINUTE, t0 + secs(5))
            .retry_after()
            .expect("11th request must be limited");
        assert!((55..=56).contains(&retry), "retry_after was {}", retry);

        assert!(counter.is_allowed_at(key, 10, MINUTE, t0 + secs(61)).is_allowed());
    }

    #[test]
    fn entry_exactly_one_window_old_has_expired() {
        let counter = SlidingWindowCounter::new();
        let t0 = Instant::now();

        assert!(counter.is_allowed_at("k", 1, MINUTE, t0).is_allowed());
        assert!(!counter.is_allowed_at("k", 1, MINUTE, t0 + secs(59)).is_allowed());
        assert!(counter.is_allowed_at("k", 1, MINUTE, t0 + MINUTE).is_allowed());
    }

    #[test]
    fn rejected_requests_are_not_recorded() {
        let counter = SlidingWindowCounter::new();
        let t0 = Instant::now();

        counter.is_allowed_at("k", 2, MINUTE, t0);
        counter.is_allowed_at("k", 2, MINUTE, t0);
        for _ in 0..10 {
            counter.is_allowed_at("k", 2, MINUTE, t0 + secs(1));
        }

        assert_eq!(counter.current_count_at("k", MINUTE, t0 + secs(1)), 2);
    }

    #[test]
    fn independent_keys() {
        let counter = SlidingWindowCounter::new();
        let t0 = Instant::now();

        assert!(counter.is_allowed_at("a", 2, MINUTE, t0).is_allowed());
        assert!(counter.is_allowed_at("a", 2, MINUTE, t0).is_allowed());
        assert!(!counter.is_allowed_at("a", 2, MINUTE, t0).is_allowed());

        // Key B is independent.
        assert!(counter.is_allowed_at("b", 2, MINUTE, t0).is_allowed());
    }

    #[test]
    fn current_count_ignores_expired_entries() {
        let counter = SlidingWindowCounter::new();
        let t0 = Instant::now();

        counter.is_allowed_at("k", 10, MINUTE, t0);
        counter.is_allowed_at("k", 10, MINUTE, t0 + secs(30));

        assert_eq!(counter.current_count_at("k", MINUTE, t0 + secs(45)), 2);
        assert_eq!(counter.current_count_at("k", MINUTE, t0 + secs(75)), 1);
        assert_eq!(counter.current_count_at("missing", MINUTE, t0), 0);
    }

    #[test]
    fn sweep_removes_stale_entries() {
        let counter = SlidingWindowCounter::new();
        let t0 = Instant::now();

        counter.is_allowed_at("will-be-stale", 10, secs(1), t0);
        counter.is_allowed_at("keep-alive", 10, secs(2), t0 + secs(10));

        let removed = counter.sweep_at(t0 + secs(11));

        assert_eq!(removed, 1);
        assert!(counter.requests.contains_key("keep-alive"));
        assert!(!counter.requests.contains_key("will-be-stale"));
    }

    #[test]
    fn opportunistic_sweep_runs_after_interval() {
        let counter = SlidingWindowCounter::new();
        let t0 = Instant::now();

        for i in 0..20 {
            counter.is_allowed_at(&format!("one-shot-{}", i), 10, secs(1), t0);
        }
        assert_eq!(counter.tracked_keys(), 20);

        // Within the sweep interval nothing is collected.
        counter.is_allowed_at("late", 10, secs(1), t0 + secs(30));
        assert_eq!(counter.tracked_keys(), 21);

        counter.is_allowed_at("later", 10, secs(1), t0 + secs(120));
        assert_eq!(counter.tracked_keys(), 1);
        assert!(counter.requests.contains_key("later"));
    }

    #[test]
    fn sweep_respects_each_keys_own_window() {
        let counter = SlidingWindowCounter::new();
        let hour = secs(3600);
        let t0 = Instant::now();

        assert!(counter.is_allowed_at("export", 2, hour, t0).is_allowed());
        assert!(counter.is_allowed_at("export", 2, hour, t0).is_allowed());
        assert!(!counter.is_allowed_at("export", 2, hour, t0 + secs(10)).is_allowed());

        // A short-window check after the sweep interval triggers a sweep.
        assert!(counter.is_allowed_at("global", 100, MINUTE, t0 + secs(200)).is_allowed());
        assert_eq!(counter.current_count_at("export", hour, t0 + secs(200)), 2);

        let retry = counter
            .is_allowed_at("export", 2, hour, t0 + secs(200))
            .retry_after()
            .expect("still inside the hour window");
        assert_eq!(retry, 3401);
    }

    #[test]
    fn concurrent_checks_never_exceed_limit() {
        let counter = SlidingWindowCounter::new();
        let admitted = AtomicU64::new(0);
        let t0 = Instant::now();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        if counter.is_allowed_at("hot", 100, MINUTE, t0).is_allowed() {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(admitted.load(Ordering::SeqCst), 100);
    }
}
