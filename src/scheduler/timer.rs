//! Lookahead timer: a cancellable wall-clock period polled by the host loop.

use std::time::{Duration, Instant};

/// Default polling period.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
pub struct LookaheadTimer {
    interval: Duration,
    next_fire: Option<Instant>,
}

impl Default for LookaheadTimer {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

impl LookaheadTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            next_fire: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start firing, the first time immediately.
    pub fn arm(&mut self, now: Instant) {
        self.next_fire = Some(now);
    }

    pub fn cancel(&mut self) {
        self.next_fire = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next_fire.is_some()
    }

    /// Whether the timer is due at `now`. Firing schedules the next period;
    /// missed periods collapse into one.
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(due) = self.next_fire else {
            return false;
        };
        if now < due {
            return false;
        }
        let mut next = due + self.interval;
        if next <= now {
            next = now + self.interval;
        }
        self.next_fire = Some(next);
        true
    }

    /// Time left until the next firing.
    pub fn time_until(&self, now: Instant) -> Option<Duration> {
        self.next_fire.map(|due| due.saturating_duration_since(now))
    }
}
