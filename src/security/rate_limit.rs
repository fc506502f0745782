//! Sliding-window rate limiting keyed by client identifier.
//!
//! Each identifier owns an ordered list of request instants inside the
//! trailing window. Expired entries are dropped lazily on every check, and
//! every [`DEFAULT_SWEEP_INTERVAL`] attempts the in-memory store drops
//! identifiers whose window has emptied. There is no background task. A
//! rejected attempt is not recorded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::RateLimitConfig;
use crate::error::{GateError, GateResult, RateLimitError};
use crate::observability::metrics;
use crate::security::clock::{Clock, SystemClock};

/// Outcome of one admission attempt against a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Attempt recorded; `count` requests now fall inside the window.
    Allowed { count: usize },
    /// Quota already used up; nothing was recorded.
    Rejected,
}

/// Failure of the backing store itself.
#[derive(Debug, Clone, thiserror::Error)]
#[error("rate limit store failure: {0}")]
pub struct StoreError(pub String);

/// Storage for per-identifier windows.
///
/// `try_admit` must be atomic per key: two concurrent calls for the same
/// identifier may never both observe the same count.
pub trait RateLimitStore: Send + Sync + std::fmt::Debug {
    fn try_admit(
        &self,
        key: &str,
        now: Instant,
        window: Duration,
        limit: usize,
    ) -> Result<Admission, StoreError>;

    /// Number of identifiers currently tracked.
    fn tracked(&self) -> usize;
}

/// In-process store. The DashMap entry guard serializes access per identifier.
/// Admission attempts between sweeps of idle identifiers.
pub const DEFAULT_SWEEP_INTERVAL: u64 = 1024;

#[derive(Debug)]
pub struct MemoryRateLimitStore {
    windows: DashMap<String, VecDeque<Instant>>,
    attempts: AtomicU64,
    sweep_interval: u64,
}

impl Default for MemoryRateLimitStore {
    fn default() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that sweeps idle identifiers every `interval` attempts.
    pub fn with_sweep_interval(interval: u64) -> Self {
        Self {
            windows: DashMap::new(),
            attempts: AtomicU64::new(0),
            sweep_interval: interval.max(1),
        }
    }

    /// Drop identifiers with no request inside the window ending at `now`.
    ///
    /// Returns the number of identifiers removed. Must not be called while an
    /// entry guard of this map is held.
    pub fn sweep(&self, now: Instant, window: Duration) -> usize {
        let Some(window_start) = now.checked_sub(window) else {
            return 0;
        };
        let before = self.windows.len();
        self.windows
            .retain(|_, timestamps| timestamps.back().is_some_and(|t| *t > window_start));
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.windows.len(), "Swept idle rate-limit entries");
        }
        removed
    }

    fn admit_key(&self, key: &str, now: Instant, window: Duration, limit: usize) -> Admission {
        let mut timestamps = self.windows.entry(key.to_string()).or_default();

        // Before the process has been up for a full window nothing can expire.
        if let Some(window_start) = now.checked_sub(window) {
            while timestamps.front().is_some_and(|t| *t <= window_start) {
                timestamps.pop_front();
            }
        }

        if timestamps.len() >= limit {
            return Admission::Rejected;
        }

        timestamps.push_back(now);
        Admission::Allowed {
            count: timestamps.len(),
        }
    }

    /// Entries currently recorded for `key`, expired or not.
    pub fn recorded(&self, key: &str) -> usize {
        self.windows.get(key).map(|w| w.len()).unwrap_or(0)
    }
}

impl RateLimitStore for MemoryRateLimitStore {
    fn try_admit(
        &self,
        key: &str,
        now: Instant,
        window: Duration,
        limit: usize,
    ) -> Result<Admission, StoreError> {
        let admission = self.admit_key(key, now, window, limit);

        // The entry guard is released by now; retain locks every shard.
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        if attempt % self.sweep_interval == 0 {
            self.sweep(now, window);
        }

        Ok(admission)
    }

    fn tracked(&self) -> usize {
        self.windows.len()
    }
}


/// Per-identifier sliding-window limiter.
#[derive(Debug, Clone)]
pub struct SlidingWindowLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    max_requests: usize,
    window: Duration,
}

impl SlidingWindowLimiter {
    pub fn new(config: &RateLimitConfig, store: Arc<dyn RateLimitStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &RateLimitConfig,
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            clock,
            max_requests: config.max_requests_per_window,
            window: Duration::from_secs(config.window_secs),
        }
    }

    /// Count one request for `identifier`, failing once the quota is used.
    pub fn check(&self, identifier: &str) -> GateResult<()> {
        let now = self.clock.now();
        let admission = self
            .store
            .try_admit(identifier, now, self.window, self.max_requests)
            .map_err(|e| GateError::internal(e.to_string()))?;

        metrics::record_tracked_clients(self.store.tracked());

        match admission {
            Admission::Allowed { count } => {
                tracing::trace!(client = %identifier, count, "Request admitted");
                Ok(())
            }
            Admission::Rejected => {
                tracing::warn!(client = %identifier, limit = self.max_requests, "Rate limit exceeded");
                Err(RateLimitError::RateExceeded {
                    retry_after_secs: self.window.as_secs(),
                }
                .into())
            }
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::clock::MockClock;

    fn limiter(max: usize) -> (SlidingWindowLimiter, MockClock, Arc<MemoryRateLimitStore>) {
        let config = RateLimitConfig {
            enabled: true,
            max_requests_per_window: max,
            window_secs: 60,
        };
        let clock = MockClock::new(Instant::now());
        let store = Arc::new(MemoryRateLimitStore::new());
        let limiter = SlidingWindowLimiter::with_clock(&config, store.clone(), Arc::new(clock.clone()));
        (limiter, clock, store)
    }

    #[test]
    fn test_quota_then_rejection() {
        let (limiter, _clock, _) = limiter(60);

        for _ in 0..60 {
            assert!(limiter.check("10.0.0.1").is_ok());
        }

        let err = limiter.check("10.0.0.1").unwrap_err();
        assert_eq!(
            err,
            GateError::RateLimit(RateLimitError::RateExceeded { retry_after_secs: 60 })
        );
    }

    #[test]
    fn test_rejected_attempt_not_recorded() {
        let (limiter, _clock, store) = limiter(2);
        limiter.check("a").unwrap();
        limiter.check("a").unwrap();
        assert!(limiter.check("a").is_err());
        assert!(limiter.check("a").is_err());
        assert_eq!(store.recorded("a"), 2);
    }

    #[test]
    fn test_window_fully_resets() {
        let (limiter, clock, _) = limiter(3);
        for _ in 0..3 {
            limiter.check("a").unwrap();
        }
        assert!(limiter.check("a").is_err());

        clock.advance(Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.check("a").is_ok());
        }
        assert!(limiter.check("a").is_err());
    }

    #[test]
    fn test_window_slides() {
        let (limiter, clock, _) = limiter(2);
        limiter.check("a").unwrap();
        clock.advance(Duration::from_secs(30));
        limiter.check("a").unwrap();
        assert!(limiter.check("a").is_err());

        // Only the first request has left the window.
        clock.advance(Duration::from_secs(31));
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_err());
    }

    #[test]
    fn test_identifiers_are_independent() {
        let (limiter, _clock, store) = limiter(1);
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("b").is_ok());
        assert!(limiter.check("a").is_err());
        assert_eq!(store.tracked(), 2);
    }

    #[test]
    fn test_idle_identifiers_are_swept() {
        let config = RateLimitConfig {
            enabled: true,
            max_requests_per_window: 60,
            window_secs: 60,
        };
        let clock = MockClock::new(Instant::now());
        let store = Arc::new(MemoryRateLimitStore::with_sweep_interval(100));
        let limiter = SlidingWindowLimiter::with_clock(&config, store.clone(), Arc::new(clock.clone()));

        for i in 0..1_000 {
            limiter.check(&format!("rotating-{}", i)).unwrap();
        }
        assert_eq!(store.tracked(), 1_000);

        clock.advance(Duration::from_secs(3600));
        for _ in 0..100 {
            let _ = limiter.check("steady");
        }

        // Only the identifier active in the current window survives.
        assert_eq!(store.tracked(), 1);
        assert_eq!(store.recorded("steady"), 60);
    }

    #[test]
    fn test_sweep_keeps_active_windows() {
        let store = MemoryRateLimitStore::new();
        let start = Instant::now();
        let window = Duration::from_secs(60);

        store.try_admit("old", start, window, 10).unwrap();
        store.try_admit("recent", start + Duration::from_secs(50), window, 10).unwrap();

        assert_eq!(store.sweep(start + Duration::from_secs(70), window), 1);
        assert_eq!(store.tracked(), 1);
        assert_eq!(store.recorded("recent"), 1);
    }

    #[test]
    fn test_concurrent_checks_never_exceed_quota() {
        let (limiter, _clock, _) = limiter(50);
        let limiter = Arc::new(limiter);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || (0..20).filter(|_| limiter.check("shared").is_ok()).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }

    #[derive(Debug)]
    struct FailingStore;

    impl RateLimitStore for FailingStore {
        fn try_admit(&self, _: &str, _: Instant, _: Duration, _: usize) -> Result<Admission, StoreError> {
            Err(StoreError("connection refused".into()))
        }

        fn tracked(&self) -> usize {
            0
        }
    }

    #[test]
    fn test_store_failure_is_internal() {
        let limiter = SlidingWindowLimiter::new(&RateLimitConfig::default(), Arc::new(FailingStore));
        assert!(matches!(limiter.check("a"), Err(GateError::Internal(_))));
    }
}
