//! Fixed-rate tick scheduling.

use std::time::Duration;

/// Default simulation rate.
pub const DEFAULT_TICK_RATE_HZ: u32 = 30;

/// Default cap on ticks run for a single advance.
pub const DEFAULT_MAX_CATCH_UP: u32 = 5;

/// Turns variable frame times into a whole number of fixed-length ticks.
///
/// Elapsed time accumulates until at least one interval has passed. When the app
/// stalls (window dragged, debugger break) at most `max_catch_up` ticks are run
/// and the rest of the backlog is dropped instead of fast-forwarding.
#[derive(Clone, Debug)]
pub struct FixedTicker {
    interval: Duration,
    accumulator: Duration,
    max_catch_up: u32,
}

impl FixedTicker {
    /// A ticker firing `rate_hz` times per second. A rate of zero is treated as one.
    pub fn new(rate_hz: u32, max_catch_up: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / rate_hz.max(1),
            accumulator: Duration::ZERO,
            max_catch_up: max_catch_up.max(1),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time carried over toward the next tick.
    pub fn pending(&self) -> Duration {
        self.accumulator
    }

    /// Adds `elapsed` and returns how many ticks are due now.
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        self.accumulator += elapsed;
        let mut ticks = 0;
        while self.accumulator >= self.interval {
            if ticks == self.max_catch_up {
                let dropped = self.accumulator;
                self.accumulator = Duration::ZERO;
                tracing::debug!(?dropped, "tick backlog dropped");
                break;
            }
            self.accumulator -= self.interval;
            ticks += 1;
        }
        ticks
    }
}

impl Default for FixedTicker {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_RATE_HZ, DEFAULT_MAX_CATCH_UP)
    }
}
