//! # Sleep pacing with fractional carryover.
//!
//! The worker may only sleep whole milliseconds, but activities ask for fractional
//! periods (e.g. `0.5` ms per step). [`Pacing`] accumulates the requested period and
//! sleeps `floor(carryover)` milliseconds once that is positive, keeping the remainder:
//!
//! ```text
//! period = 0.5:  carry 0.5 → none | carry 1.0 → 1ms | carry 0.5 → none | ...
//! period = 2.5:  carry 2.5 → 2ms (0.5 left) | carry 3.0 → 3ms | ...
//! ```
//!
//! The long-run average delay therefore equals the configured rate. The state is owned
//! by one activity run and never shared.

use std::time::Duration;

/// Per-run pacing accumulator.
#[derive(Debug, Default)]
pub(crate) struct Pacing {
    carryover: f64,
}

impl Pacing {
    /// Adds one step's period and returns the whole-millisecond sleep due now, if any.
    pub(crate) fn next_sleep(&mut self, period_millis: f64) -> Option<Duration> {
        self.carryover += period_millis;
        let whole = self.carryover.floor();
        if whole < 1.0 {
            return None;
        }
        self.carryover -= whole;
        Some(Duration::from_millis(whole as u64))
    }
}
