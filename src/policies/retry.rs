//! # Retry policy for task start and restart.
//!
//! [`RetryPolicy`] decides **whether** a failed attempt is retried and **how long**
//! the task waits before the next attempt.
//!
//! ## Budget
//! ```text
//! max_retry < 0   → unlimited retries
//! max_retry == 0  → no retry, the raw error becomes the stop reason
//! max_retry > 0   → up to max_retry retries, then RetryExhausted{ last }
//! ```
//!
//! ## Pacing
//! The pause before retry `n` (1-based) is `interval × factor^(n-1)`, clamped to
//! `max_interval`, then jittered. The task waits only for the part of that pause
//! which has not already elapsed since the failed attempt started, so a slow
//! attempt is not penalized twice.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use tasktree::RetryPolicy;
//!
//! let retry = RetryPolicy::new(3, Duration::from_secs(1));
//! assert!(retry.allows(2));
//! assert!(!retry.allows(3));
//!
//! // The attempt already took 400ms of the 1s interval.
//! assert_eq!(retry.pause(1, Duration::from_millis(400)), Duration::from_millis(600));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Per-task retry configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Retry budget (`< 0` unlimited, `0` none).
    pub max_retry: i32,
    /// Base pause between attempts.
    pub interval: Duration,
    /// Multiplicative growth of the pause per retry (`1.0` = constant).
    pub factor: f64,
    /// Upper bound for the grown pause.
    pub max_interval: Duration,
    /// Randomization applied after growth and clamping.
    pub jitter: JitterPolicy,
}

impl Default for RetryPolicy {
    /// No retry.
    fn default() -> Self {
        Self::never()
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub const fn never() -> Self {
        Self {
            max_retry: 0,
            interval: Duration::ZERO,
            factor: 1.0,
            max_interval: Duration::ZERO,
            jitter: JitterPolicy::None,
        }
    }

    /// Up to `max_retry` retries (negative = unlimited) paced by a fixed `interval`.
    pub fn new(max_retry: i32, interval: Duration) -> Self {
        Self {
            max_retry,
            interval,
            factor: 1.0,
            max_interval: interval,
            jitter: JitterPolicy::None,
        }
    }

    /// Unlimited retries paced by `interval`.
    pub fn unlimited(interval: Duration) -> Self {
        Self::new(-1, interval)
    }

    /// Grows the pause by `factor` per retry, up to `max_interval`.
    pub fn with_backoff(mut self, factor: f64, max_interval: Duration) -> Self {
        self.factor = factor;
        self.max_interval = max_interval.max(self.interval);
        self
    }

    /// Sets the jitter applied to each pause.
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// True if no budget limit applies.
    #[inline]
    pub fn is_unlimited(&self) -> bool {
        self.max_retry < 0
    }

    /// True if another retry is allowed after `retried` retries.
    #[inline]
    pub fn allows(&self, retried: u32) -> bool {
        self.max_retry < 0 || i64::from(retried) < i64::from(self.max_retry)
    }

    /// Full pause before retry number `retry` (1-based), before subtracting elapsed time.
    pub fn interval_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.interval.as_secs_f64() * self.factor.powi(exp);
        let cap = self.max_interval.max(self.interval);

        let base = if !secs.is_finite() || secs < 0.0 || secs > cap.as_secs_f64() {
            cap
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }

    /// Remaining wait before retry `retry` when the failed attempt took `elapsed`.
    pub fn pause(&self, retry: u32, elapsed: Duration) -> Duration {
        self.interval_for(retry).saturating_sub(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_semantics() {
        let never = RetryPolicy::never();
        assert!(!never.allows(0));

        let bounded = RetryPolicy::new(2, Duration::from_millis(10));
        assert!(bounded.allows(0));
        assert!(bounded.allows(1));
        assert!(!bounded.allows(2));

        let unlimited = RetryPolicy::unlimited(Duration::from_millis(10));
        assert!(unlimited.is_unlimited());
        assert!(unlimited.allows(u32::MAX));
    }

    #[test]
    fn fixed_interval_by_default() {
        let p = RetryPolicy::new(5, Duration::from_millis(300));
        for retry in 1..6 {
            assert_eq!(p.interval_for(retry), Duration::from_millis(300));
        }
    }

    #[test]
    fn pause_subtracts_elapsed_time() {
        let p = RetryPolicy::new(1, Duration::from_secs(1));
        assert_eq!(p.pause(1, Duration::from_millis(250)), Duration::from_millis(750));
        assert_eq!(p.pause(1, Duration::from_secs(3)), Duration::ZERO);
    }

    #[test]
    fn backoff_grows_and_clamps() {
        let p = RetryPolicy::new(-1, Duration::from_millis(100))
            .with_backoff(2.0, Duration::from_secs(1));
        assert_eq!(p.interval_for(1), Duration::from_millis(100));
        assert_eq!(p.interval_for(2), Duration::from_millis(200));
        assert_eq!(p.interval_for(4), Duration::from_millis(800));
        assert_eq!(p.interval_for(5), Duration::from_secs(1));
        assert_eq!(p.interval_for(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn max_interval_never_below_interval() {
        let p = RetryPolicy::new(1, Duration::from_secs(2)).with_backoff(0.5, Duration::from_secs(1));
        assert_eq!(p.max_interval, Duration::from_secs(2));
    }
}
