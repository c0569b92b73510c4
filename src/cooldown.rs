use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::{seconds_between, Clock};
use crate::config::Thresholds;

/// Decides how long to wait for a server-side cooldown, and waits.
///
/// Cooldowns that are already over, or that end within the detection
/// threshold, are not waited for. Anything longer is clamped to
/// `[min_wait, max_wait]` seconds.
pub struct CooldownManager {
    detection_threshold: f64,
    min_wait: f64,
    max_wait: f64,
    clock: Arc<dyn Clock>,
}

impl CooldownManager {
    pub fn new(thresholds: &Thresholds, clock: Arc<dyn Clock>) -> Self {
        Self {
            detection_threshold: thresholds.cooldown_detection_threshold,
            min_wait: thresholds.min_cooldown_wait,
            max_wait: thresholds.max_cooldown_wait,
            clock,
        }
    }

    /// Seconds to wait for a cooldown expiring at `expiry`, seen at `now`.
    pub fn calculate_wait_duration(&self, expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
        let Some(expiry) = expiry else {
            return 0.0;
        };
        let remaining = seconds_between(now, expiry);
        if remaining <= self.detection_threshold {
            return 0.0;
        }
        remaining.max(self.min_wait).min(self.max_wait)
    }

    pub fn is_on_cooldown(&self, expiry: Option<DateTime<Utc>>) -> bool {
        self.calculate_wait_duration(expiry, self.clock.now()) > 0.0
    }

    /// Sleeps out the cooldown, if any, and returns the seconds waited.
    pub fn wait(&self, expiry: Option<DateTime<Utc>>) -> f64 {
        let seconds = self.calculate_wait_duration(expiry, self.clock.now());
        if let Ok(duration) = Duration::try_from_secs_f64(seconds) {
            if !duration.is_zero() {
                log::info!("Waiting {:.1}s for cooldown", seconds);
                self.clock.sleep(duration);
            }
        }
        seconds
    }
}

impl std::fmt::Debug for CooldownManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooldownManager")
            .field("detection_threshold", &self.detection_threshold)
            .field("min_wait", &self.min_wait)
            .field("max_wait", &self.max_wait)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn manager(clock: Arc<ManualClock>) -> CooldownManager {
        CooldownManager::new(&Thresholds::default(), clock)
    }

    #[test]
    fn test_long_cooldown_is_clamped_to_max_wait() {
        let clock = Arc::new(ManualClock::default());
        let now = clock.now();
        let cooldowns = manager(clock);
        let wait = cooldowns.calculate_wait_duration(Some(now + chrono::Duration::seconds(90)), now);
        assert_eq!(wait, 65.0);
    }

    #[test]
    fn test_no_wait_for_missing_expired_or_tiny_cooldowns() {
        let clock = Arc::new(ManualClock::default());
        let now = clock.now();
        let cooldowns = manager(clock);
        assert_eq!(cooldowns.calculate_wait_duration(None, now), 0.0);
        assert_eq!(
            cooldowns.calculate_wait_duration(Some(now - chrono::Duration::seconds(5)), now),
            0.0
        );
        assert_eq!(
            cooldowns.calculate_wait_duration(Some(now + chrono::Duration::milliseconds(400)), now),
            0.0
        );
        assert_eq!(
            cooldowns.calculate_wait_duration(Some(now + chrono::Duration::seconds(12)), now),
            12.0
        );
    }

    #[test]
    fn test_min_wait_raises_short_cooldowns() {
        let thresholds = Thresholds {
            min_cooldown_wait: 3.0,
            ..Thresholds::default()
        };
        let clock = Arc::new(ManualClock::default());
        let now = clock.now();
        let cooldowns = CooldownManager::new(&thresholds, clock);
        assert_eq!(
            cooldowns.calculate_wait_duration(Some(now + chrono::Duration::seconds(1)), now),
            3.0
        );
    }

    #[test]
    fn test_wait_sleeps_on_the_clock() {
        let clock = Arc::new(ManualClock::default());
        let expiry = clock.now() + chrono::Duration::seconds(8);
        let cooldowns = manager(clock.clone());

        assert!(cooldowns.is_on_cooldown(Some(expiry)));
        assert_eq!(cooldowns.wait(Some(expiry)), 8.0);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(8)]);
        assert!(!cooldowns.is_on_cooldown(Some(expiry)));
        assert_eq!(cooldowns.wait(Some(expiry)), 0.0);
    }
}
