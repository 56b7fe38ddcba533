//! Token-bucket admission control.
//!
//! Refill is computed lazily on each call; there is no background timer.
//! Only whole refill intervals are credited, and `last_refill` advances by
//! exactly the credited intervals so partial progress toward the next
//! token carries over between calls.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct AdmissionController {
    capacity: u32,
    refill_interval: Duration,
    tokens: u32,
    last_refill: Instant,
}

impl AdmissionController {
    /// Full bucket of `capacity` tokens, one token credited per `refill_interval`.
    pub fn new(capacity: u32, refill_interval: Duration) -> Self {
        Self::new_at(capacity, refill_interval, Instant::now())
    }

    pub fn new_at(capacity: u32, refill_interval: Duration, now: Instant) -> Self {
        Self {
            capacity,
            refill_interval,
            tokens: capacity,
            last_refill: now,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn try_consume(&mut self) -> bool {
        self.try_consume_at(Instant::now())
    }

    /// Take one token if available.
    pub fn try_consume_at(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    pub fn remaining(&mut self) -> u32 {
        self.remaining_at(Instant::now())
    }

    /// Tokens available at `now`, after lazy refill, without consuming.
    pub fn remaining_at(&mut self, now: Instant) -> u32 {
        self.refill(now);
        self.tokens
    }

    pub fn retry_after(&mut self) -> Duration {
        self.retry_after_at(Instant::now())
    }

    /// Time until the next token is credited, or zero if one is available.
    pub fn retry_after_at(&mut self, now: Instant) -> Duration {
        self.refill(now);
        if self.tokens > 0 {
            return Duration::ZERO;
        }
        let since = now.saturating_duration_since(self.last_refill);
        self.refill_interval.saturating_sub(since)
    }

    fn refill(&mut self, now: Instant) {
        let interval = self.refill_interval.as_nanos();
        if interval == 0 {
            self.tokens = self.capacity;
            self.last_refill = now;
            return;
        }

        let elapsed = now.saturating_duration_since(self.last_refill).as_nanos();
        let intervals = elapsed / interval;
        if intervals == 0 {
            return;
        }

        let credit = u32::try_from(intervals).unwrap_or(u32::MAX);
        self.tokens = self.tokens.saturating_add(credit).min(self.capacity);

        // Advance by exactly intervals * refill_interval: keep the remainder.
        let remainder = u64::try_from(elapsed % interval).unwrap_or(0);
        self.last_refill = now
            .checked_sub(Duration::from_nanos(remainder))
            .unwrap_or(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn full_bucket_admits_capacity_then_rejects() {
        let t0 = Instant::now();
        let mut bucket = AdmissionController::new_at(5, SECOND, t0);

        for _ in 0..5 {
            assert!(bucket.try_consume_at(t0));
        }
        assert!(!bucket.try_consume_at(t0));
        assert_eq!(bucket.remaining_at(t0), 0);
    }

    #[test]
    fn one_interval_refills_exactly_one_token() {
        let t0 = Instant::now();
        let mut bucket = AdmissionController::new_at(5, SECOND, t0);
        for _ in 0..5 {
            bucket.try_consume_at(t0);
        }

        let t1 = t0 + SECOND;
        assert!(bucket.try_consume_at(t1));
        assert!(!bucket.try_consume_at(t1));
    }

    #[test]
    fn long_idle_never_exceeds_capacity() {
        let t0 = Instant::now();
        let mut bucket = AdmissionController::new_at(5, SECOND, t0);
        bucket.try_consume_at(t0);

        let later = t0 + Duration::from_secs(3600 * 24);
        assert_eq!(bucket.remaining_at(later), 5);
        assert!(bucket.remaining_at(later + SECOND * 10) <= bucket.capacity());
    }

    #[test]
    fn fractional_progress_is_not_dropped() {
        let t0 = Instant::now();
        let mut bucket = AdmissionController::new_at(2, SECOND, t0);
        bucket.try_consume_at(t0);
        bucket.try_consume_at(t0);

        // 1.5 intervals: one token, half an interval carried over.
        let t1 = t0 + Duration::from_millis(1500);
        assert!(bucket.try_consume_at(t1));
        assert!(!bucket.try_consume_at(t1));

        // Another half interval completes the second token.
        let t2 = t0 + Duration::from_millis(2000);
        assert!(bucket.try_consume_at(t2));
    }

    #[test]
    fn remaining_does_not_consume() {
        let t0 = Instant::now();
        let mut bucket = AdmissionController::new_at(3, SECOND, t0);
        assert_eq!(bucket.remaining_at(t0), 3);
        assert_eq!(bucket.remaining_at(t0), 3);
    }

    #[test]
    fn retry_hint_counts_down_to_next_token() {
        let t0 = Instant::now();
        let mut bucket = AdmissionController::new_at(1, Duration::from_secs(10), t0);
        assert_eq!(bucket.retry_after_at(t0), Duration::ZERO);

        bucket.try_consume_at(t0);
        assert_eq!(bucket.retry_after_at(t0), Duration::from_secs(10));
        assert_eq!(
            bucket.retry_after_at(t0 + Duration::from_secs(4)),
            Duration::from_secs(6)
        );
    }

    #[test]
    fn clock_going_backwards_is_harmless() {
        let t0 = Instant::now() + Duration::from_secs(5);
        let mut bucket = AdmissionController::new_at(1, SECOND, t0);
        bucket.try_consume_at(t0);
        let earlier = t0 - Duration::from_secs(2);
        assert!(!bucket.try_consume_at(earlier));
    }
}
