//! Per-`(session, method)` rate limiting.
//!
//! A fixed-window counter per key: each window allows up to `limit`
//! requests; a denial reports the number of seconds until the window
//! resets. Method-specific overrides replace the default limit for that
//! method only.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Request is allowed; one token was consumed.
    Allowed,
    /// Request is denied; `retry_after` seconds until the window resets.
    Denied {
        /// Seconds until the caller may retry.
        retry_after: u64,
    },
}

struct Window {
    count: u32,
    window_started_at: Instant,
}

/// Fixed-window limiter keyed by `(session_id, method)`.
pub struct RateLimiter {
    default_limit: u32,
    window: Duration,
    overrides: DashMap<String, (u32, Duration)>,
    windows: DashMap<(String, String), Window>,
    enabled: bool,
}

impl RateLimiter {
    /// Construct a limiter with a default `limit` per `window`.
    #[must_use]
    pub fn new(limit: u32, window: Duration, enabled: bool) -> Self {
        Self {
            default_limit: limit,
            window,
            overrides: DashMap::new(),
            windows: DashMap::new(),
            enabled,
        }
    }

    /// Override the limit for a specific method.
    pub fn set_override(&self, method: impl Into<String>, limit: u32, window: Duration) {
        self.overrides.insert(method.into(), (limit, window));
    }

    /// Check and consume one token for `(session_id, method)`. Always
    /// `Allowed` when the limiter is disabled.
    pub fn check(&self, session_id: &str, method: &str) -> RateLimitDecision {
        if !self.enabled {
            return RateLimitDecision::Allowed;
        }

        let (limit, window) = self
            .overrides
            .get(method)
            .map(|entry| *entry)
            .unwrap_or((self.default_limit, self.window));

        let key = (session_id.to_string(), method.to_string());
        let mut entry = self
            .windows
            .entry(key)
            .or_insert_with(|| Window {
                count: 0,
                window_started_at: Instant::now(),
            });

        if entry.window_started_at.elapsed() >= window {
            entry.count = 0;
            entry.window_started_at = Instant::now();
        }

        if entry.count >= limit {
            let remaining = window.saturating_sub(entry.window_started_at.elapsed());
            return RateLimitDecision::Denied {
                retry_after: remaining.as_secs().max(1),
            };
        }

        entry.count += 1;
        RateLimitDecision::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_then_denies() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60), true);
        assert_eq!(limiter.check("s1", "tools/call"), RateLimitDecision::Allowed);
        assert_eq!(limiter.check("s1", "tools/call"), RateLimitDecision::Allowed);
        assert!(matches!(
            limiter.check("s1", "tools/call"),
            RateLimitDecision::Denied { .. }
        ));
    }

    #[test]
    fn disabled_limiter_always_allows() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60), false);
        assert_eq!(limiter.check("s1", "x"), RateLimitDecision::Allowed);
        assert_eq!(limiter.check("s1", "x"), RateLimitDecision::Allowed);
    }

    #[test]
    fn windows_are_independent_per_session() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60), true);
        assert_eq!(limiter.check("s1", "x"), RateLimitDecision::Allowed);
        assert_eq!(limiter.check("s2", "x"), RateLimitDecision::Allowed);
    }

    #[test]
    fn windows_are_independent_per_method() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60), true);
        assert_eq!(limiter.check("s1", "tools/call"), RateLimitDecision::Allowed);
        assert_eq!(limiter.check("s1", "resources/read"), RateLimitDecision::Allowed);
    }

    #[test]
    fn method_override_replaces_default_limit() {
        let limiter = RateLimiter::new(100, Duration::from_secs(60), true);
        limiter.set_override("tools/call", 1, Duration::from_secs(60));
        assert_eq!(limiter.check("s1", "tools/call"), RateLimitDecision::Allowed);
        assert!(matches!(
            limiter.check("s1", "tools/call"),
            RateLimitDecision::Denied { .. }
        ));
        // Unrelated method still uses the default limit.
        assert_eq!(limiter.check("s1", "resources/read"), RateLimitDecision::Allowed);
    }

    #[test]
    fn window_resets_after_elapsing() {
        let limiter = RateLimiter::new(1, Duration::from_millis(5), true);
        assert_eq!(limiter.check("s1", "x"), RateLimitDecision::Allowed);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(limiter.check("s1", "x"), RateLimitDecision::Allowed);
    }
}
