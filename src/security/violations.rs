//! Sliding-window violation tracker with temporary bans.
//!
//! Auth failures and policy violations are recorded here. Reaching the
//! threshold inside the window clears the log and bans every request
//! until the deadline passes. A ban is never extended while active.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ViolationTracker {
    threshold: usize,
    window: Duration,
    ban_duration: Duration,
    log: VecDeque<Instant>,
    banned_until: Option<Instant>,
}

impl ViolationTracker {
    pub fn new(threshold: usize, window: Duration, ban_duration: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            window,
            ban_duration,
            log: VecDeque::new(),
            banned_until: None,
        }
    }

    pub fn record(&mut self) -> bool {
        self.record_at(Instant::now())
    }

    /// Record a violation at `now`. Returns `true` if this one started a ban.
    pub fn record_at(&mut self, now: Instant) -> bool {
        if self.is_banned_at(now) {
            return false;
        }

        self.log.push_back(now);
        self.prune(now);

        if self.log.len() >= self.threshold {
            self.banned_until = Some(now + self.ban_duration);
            self.log.clear();
            return true;
        }
        false
    }

    pub fn is_banned(&self) -> bool {
        self.is_banned_at(Instant::now())
    }

    pub fn is_banned_at(&self, now: Instant) -> bool {
        self.banned_until.is_some_and(|until| now < until)
    }

    /// Time left on the active ban, if any.
    pub fn ban_remaining_at(&self, now: Instant) -> Option<Duration> {
        self.banned_until
            .filter(|until| now < *until)
            .map(|until| until - now)
    }

    /// Violations currently inside the window.
    pub fn recent_count_at(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.log.len()
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.log.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.log.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);
    const BAN: Duration = Duration::from_secs(300);

    #[test]
    fn threshold_within_window_bans() {
        let t0 = Instant::now();
        let mut tracker = ViolationTracker::new(3, WINDOW, BAN);

        assert!(!tracker.record_at(t0));
        assert!(!tracker.record_at(t0 + Duration::from_secs(1)));
        assert!(!tracker.is_banned_at(t0 + Duration::from_secs(1)));

        let t2 = t0 + Duration::from_secs(2);
        assert!(tracker.record_at(t2));
        assert!(tracker.is_banned_at(t2));
        assert!(tracker.is_banned_at(t2 + BAN - Duration::from_millis(1)));
        assert!(!tracker.is_banned_at(t2 + BAN));
    }

    #[test]
    fn old_violations_fall_out_of_window() {
        let t0 = Instant::now();
        let mut tracker = ViolationTracker::new(3, WINDOW, BAN);

        tracker.record_at(t0);
        tracker.record_at(t0 + Duration::from_secs(10));
        // First entry is a full window old by now.
        let t2 = t0 + WINDOW;
        assert!(!tracker.record_at(t2));
        assert!(!tracker.is_banned_at(t2));
        assert_eq!(tracker.recent_count_at(t2), 2);
    }

    #[test]
    fn ban_not_extended_while_active() {
        let t0 = Instant::now();
        let mut tracker = ViolationTracker::new(2, WINDOW, BAN);
        tracker.record_at(t0);
        tracker.record_at(t0);
        assert_eq!(tracker.ban_remaining_at(t0), Some(BAN));

        for i in 1..10 {
            assert!(!tracker.record_at(t0 + Duration::from_secs(i)));
        }
        assert!(!tracker.is_banned_at(t0 + BAN));
    }

    #[test]
    fn log_cleared_when_ban_starts() {
        let t0 = Instant::now();
        let mut tracker = ViolationTracker::new(2, WINDOW, Duration::from_secs(5));
        tracker.record_at(t0);
        tracker.record_at(t0);

        let after = t0 + Duration::from_secs(6);
        assert!(!tracker.is_banned_at(after));
        assert_eq!(tracker.recent_count_at(after), 0);
        // A single new violation does not immediately re-ban.
        assert!(!tracker.record_at(after));
    }

    #[test]
    fn no_ban_remaining_when_clear() {
        let tracker = ViolationTracker::new(5, WINDOW, BAN);
        assert_eq!(tracker.ban_remaining_at(Instant::now()), None);
        assert!(!tracker.is_banned());
    }
}
