// src/network/backoff.rs
//! Reconnect delay policy
//!
//! Delays double from `min` up to `max`. A session that stays `Ready` for at
//! least `stable_after` resets the delay to `min`.

use std::time::Duration;

/// Exponential reconnect backoff
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    stable_after: Duration,
    current: Duration,
}

impl Backoff {
    /// Creates a backoff starting at `min`
    ///
    /// # Arguments
    /// * `min` - First delay and value after a reset
    /// * `max` - Cap on the delay
    /// * `stable_after` - Ready time after which the delay resets
    pub fn new(min: Duration, max: Duration, stable_after: Duration) -> Self {
        let max = max.max(min);
        Backoff {
            min,
            max,
            stable_after,
            current: min,
        }
    }

    /// Delay to wait before the next attempt; doubles the following one
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Resets to `min` if the last session was Ready for long enough
    ///
    /// # Returns
    /// `true` if the delay was reset
    pub fn reset_if_stable(&mut self, ready_for: Duration) -> bool {
        if ready_for >= self.stable_after {
            self.reset();
            true
        } else {
            false
        }
    }

    /// Back to the minimum delay
    pub fn reset(&mut self) {
        self.current = self.min;
    }
}
