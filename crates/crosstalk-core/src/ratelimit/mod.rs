//! Fixed-window rate limiting keyed by operation name.
//!
//! Used to throttle repeated bridge invocations of the same logical
//! operation and to rate-limit per-session command execution. One shared
//! instance is constructed by the host and injected wherever needed.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Outcome of a rate-limit check. Denial is a value, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether this call is within the window budget.
    pub allowed: bool,
    /// Time remaining until the window resets (zero when allowed).
    pub retry_after: Duration,
}

impl RateDecision {
    /// Remaining wait in milliseconds, for user-facing "try again in Ns"
    /// messages.
    #[must_use]
    pub const fn retry_after_ms(&self) -> u128 {
        self.retry_after.as_millis()
    }
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter.
///
/// A new window starts the first time [`check`](Self::check) is called after
/// the previous window has fully elapsed. Within a window the first
/// `max_attempts` calls are allowed; later calls are denied with the time
/// remaining until the reset.
#[derive(Debug)]
pub struct RateLimiter {
    max_attempts: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    /// Create a limiter allowing `max_attempts` calls per `window`.
    #[must_use]
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count one call against `key` and decide whether it is allowed.
    pub fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let slot = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(slot.started) >= self.window {
            slot.started = now;
            slot.count = 0;
        }

        if slot.count < self.max_attempts {
            slot.count += 1;
            RateDecision {
                allowed: true,
                retry_after: Duration::ZERO,
            }
        } else {
            let elapsed = now.duration_since(slot.started);
            RateDecision {
                allowed: false,
                retry_after: self.window.saturating_sub(elapsed),
            }
        }
    }

    /// Drop all counters (e.g. on reconfiguration).
    pub fn reset(&self) {
        self.windows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_allows_up_to_max_attempts() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..5 {
            assert!(limiter.check_at("cmd", start).allowed);
        }
        let denied = limiter.check_at("cmd", start);
        assert!(!denied.allowed);
        assert!(denied.retry_after > Duration::ZERO);
        assert!(denied.retry_after <= Duration::from_secs(60));
    }

    #[test]
    fn test_window_resets_after_elapse() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();
        assert!(limiter.check_at("op", start).allowed);
        assert!(limiter.check_at("op", start).allowed);
        assert!(!limiter.check_at("op", start).allowed);

        let later = start + Duration::from_secs(61);
        assert!(limiter.check_at("op", later).allowed);
    }

    #[test]
    fn test_retry_after_counts_down() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();
        assert!(limiter.check_at("op", start).allowed);

        let denied = limiter.check_at("op", start + Duration::from_secs(45));
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Duration::from_secs(15));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();
        assert!(limiter.check_at("a", start).allowed);
        assert!(limiter.check_at("b", start).allowed);
        assert!(!limiter.check_at("a", start).allowed);
    }

    #[test]
    fn test_reset_clears_counters() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();
        assert!(limiter.check_at("a", start).allowed);
        limiter.reset();
        assert!(limiter.check_at("a", start).allowed);
    }
}
