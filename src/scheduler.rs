//! Fixed-period cadences for the control loop.
//!
//! The loop runs several independent activities at different rates inside
//! one thread:
//!
//! ```text
//!   tick (16 ms) ──┬── commands + status publish      every tick
//!                  ├── telemetry reads                Cadence(status_period)
//!                  ├── heartbeat check                Cadence(heartbeat_period)
//!                  └── summary log                    Cadence(status_period)
//! ```
//!
//! Each [`Cadence`] is checked against the tick's start time, so a slow
//! tick delays a firing but never makes one fire twice.

use std::time::{Duration, Instant};

/// A periodic activity that fires once `period` has elapsed since it last
/// fired (or since it was created).
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    period: Duration,
    last: Instant,
}

impl Cadence {
    pub fn new(period: Duration, start: Instant) -> Self {
        Self {
            period,
            last: start,
        }
    }

    /// Whether the activity should run at `now`.  Firing restarts the
    /// period from `now`.
    pub fn due(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last) >= self.period {
            self.last = now;
            true
        } else {
            false
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

/// Time left in a tick that started at `tick_start`, or zero if overrun.
pub fn sleep_budget(tick_period: Duration, tick_start: Instant, now: Instant) -> Duration {
    tick_period.saturating_sub(now.saturating_duration_since(tick_start))
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
