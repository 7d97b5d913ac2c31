//! Reconnect backoff
//!
//! Exponential growth with "equal jitter":
//! `delay = d/2 + random(0, d/2)` where `d = min(max, base * 2^attempt)`.
//! Half of the window is always waited, so a flapping server is never
//! hammered with near-zero delays.

use std::time::Duration;

use rand::Rng;

/// Bounded exponential backoff
#[derive(Debug, Clone)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
    max_retries: u32,
    attempt: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(base: Duration, max: Duration, max_retries: u32) -> Self {
        let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        Self {
            base_ms,
            max_ms: max_ms.max(base_ms),
            max_retries,
            attempt: 0,
        }
    }

    /// Delay before the next attempt, or `None` once the retry budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_retries {
            return None;
        }
        let window = self
            .base_ms
            .saturating_mul(1u64.checked_shl(self.attempt).unwrap_or(u64::MAX))
            .min(self.max_ms);
        let half = window / 2;
        let jitter = if half == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=half)
        };
        self.attempt = self.attempt.saturating_add(1);
        Some(Duration::from_millis(window - half + jitter))
    }

    /// Attempts made since the last reset
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Start over after a session reached Ready
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
