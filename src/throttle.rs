//! Outbound call throttling and retry.
//!
//! [`RateLimiter`] is a sliding window over the timestamps of recent calls.
//! One instance is shared through an `Arc` by everything that talks to the
//! remote service, so the limit holds across components.
//!
//! [`RetryPolicy`] re-runs an operation that failed with a transient error,
//! doubling the delay between attempts up to a ceiling.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::{to_chrono, Clock};
use crate::config::{RateLimitSettings, RetrySettings};
use crate::{GoapError, Result};

pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            calls: Mutex::new(VecDeque::with_capacity(max_calls)),
            clock,
        }
    }

    pub fn from_settings(settings: &RateLimitSettings, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            settings.max_calls,
            Duration::from_millis(settings.window_ms),
            clock,
        )
    }

    /// Blocks until a call is allowed and records it.
    ///
    /// The lock is held while waiting, so concurrent callers are admitted
    /// strictly one after another. Returns how long this call waited.
    pub fn acquire(&self) -> Duration {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        let window = to_chrono(self.window);
        let mut waited = Duration::ZERO;

        loop {
            let now = self.clock.now();
            while calls.front().is_some_and(|&t| now - t >= window) {
                calls.pop_front();
            }
            if calls.len() < self.max_calls {
                calls.push_back(now);
                return waited;
            }
            let Some(&oldest) = calls.front() else {
                continue;
            };
            let wait = (oldest + window - now)
                .to_std()
                .unwrap_or(Duration::ZERO)
                .max(Duration::from_millis(1));
            log::debug!("Rate limit reached, waiting {:?}", wait);
            self.clock.sleep(wait);
            waited += wait;
        }
    }

    /// Number of calls recorded inside the current window.
    pub fn in_flight(&self) -> usize {
        let calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();
        let window = to_chrono(self.window);
        calls.iter().filter(|&&t| now - t < window).count()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_calls", &self.max_calls)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or
    /// the attempts run out. `op` receives the 1-based attempt number.
    pub fn retry<T, F>(&self, clock: &dyn Clock, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) if attempt >= self.max_attempts => {
                    log::error!("Giving up after {} attempts: {}", attempt, err);
                    return Err(GoapError::RetriesExhausted {
                        attempts: attempt,
                        last_error: err.to_string(),
                    });
                }
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    log::warn!(
                        "Attempt {}/{} failed ({}), retrying in {:?}",
                        attempt,
                        self.max_attempts,
                        err,
                        delay
                    );
                    clock.sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_rate_limiter_admits_at_most_max_calls_per_window() {
        let clock = Arc::new(ManualClock::default());
        let limiter = RateLimiter::new(3, Duration::from_secs(1), clock.clone());

        let start = clock.now();
        let mut admitted = Vec::new();
        for _ in 0..10 {
            limiter.acquire();
            admitted.push(clock.now());
        }

        for (i, t) in admitted.iter().enumerate() {
            let in_window = admitted[..=i]
                .iter()
                .filter(|&&earlier| *t - earlier < chrono::Duration::seconds(1))
                .count();
            assert!(in_window <= 3, "call {} saw {} calls in window", i, in_window);
        }
        // ten calls at three per second need at least three full windows
        assert!(clock.now() - start >= chrono::Duration::seconds(3));
    }

    #[test]
    fn test_rate_limiter_does_not_wait_under_limit() {
        let clock = Arc::new(ManualClock::default());
        let limiter = RateLimiter::from_settings(&RateLimitSettings::default(), clock.clone());
        for _ in 0..16 {
            assert_eq!(limiter.acquire(), Duration::ZERO);
        }
        assert_eq!(limiter.in_flight(), 16);
        assert!(clock.sleeps().is_empty());
        assert!(limiter.acquire() > Duration::ZERO);
    }

    #[test]
    fn test_delay_doubles_up_to_ceiling() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(6), Duration::from_millis(8000));
        assert_eq!(policy.delay_for(60), Duration::from_millis(8000));
    }

    #[test]
    fn test_retry_gives_up_after_max_attempts() {
        let clock = ManualClock::default();
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let result: Result<()> = policy.retry(&clock, |_| {
            calls += 1;
            Err(GoapError::Transient("503".into()))
        });

        assert_eq!(calls, 3);
        match result {
            Err(GoapError::RetriesExhausted { attempts, last_error }) => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("503"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(500), Duration::from_millis(1000)]
        );
    }

    #[test]
    fn test_retry_succeeds_after_transient_failure() {
        let clock = ManualClock::default();
        let result = RetryPolicy::default().retry(&clock, |attempt| {
            if attempt < 2 {
                Err(GoapError::Transient("timeout".into()))
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn test_retry_does_not_repeat_permanent_errors() {
        let clock = ManualClock::default();
        let mut calls = 0;
        let result: Result<()> = RetryPolicy::default().retry(&clock, |_| {
            calls += 1;
            Err(GoapError::ActionFailed {
                action: "fight".into(),
                message: "target missing".into(),
            })
        });
        assert_eq!(calls, 1);
        assert!(matches!(result, Err(GoapError::ActionFailed { .. })));
        assert!(clock.sleeps().is_empty());
    }
}
