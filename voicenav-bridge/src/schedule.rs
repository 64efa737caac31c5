//! Gapless playback scheduling.
//!
//! Chunks of synthesized speech arrive in bursts with network jitter; each
//! must start exactly where the previous one ends, and never earlier than
//! the output clock. The scheduler is a pure value so the invariants can be
//! checked without a device.

/// Computes back-to-back start times against a monotone output clock.
#[derive(Debug, Clone, Default)]
pub struct PlaybackScheduler {
    next_start: f64,
}

impl PlaybackScheduler {
    /// Create a scheduler with the next start at clock zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a chunk of `duration` seconds against the clock reading
    /// `now`, returning its start time.
    ///
    /// `start = max(now, next_start)`; the next chunk begins at
    /// `start + duration`.
    pub fn schedule(&mut self, now: f64, duration: f64) -> f64 {
        let start = now.max(self.next_start);
        self.next_start = start + duration;
        start
    }

    /// Seconds of scheduled audio not yet played at clock reading `now`.
    pub fn remaining(&self, now: f64) -> f64 {
        (self.next_start - now).max(0.0)
    }

    /// Forget all scheduled playback (session teardown).
    pub fn reset(&mut self) {
        self.next_start = 0.0;
    }
}
