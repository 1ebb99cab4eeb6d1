//! # Controller configuration.
//!
//! Provides [`ControllerConfig`] centralized settings for a [`Controller`](crate::Controller).
//!
//! Config is used in two ways:
//! 1. **Controller creation**: `Controller::builder(config)` / `Controller::new(config)`
//! 2. **Activity defaults**: `add_activity` seeds each [`ActivityHandle`](crate::ActivityHandle)
//!    with `default_max_steps` and `default_sleep_period_millis`
//!
//! ## Sentinel values
//! - `default_max_steps = 0` → unbounded
//! - `default_sleep_period_millis <= 0` (or NaN) → no pacing
//!
//! The pause flag always starts `true` and is deliberately not configurable:
//! stepping never begins until someone calls `unpause()` or `toggle()`.

/// Global configuration for a controller.
///
/// ## Field semantics
/// - `worker_name`: thread name of the worker (`"<worker_name>-events"` for the event pump)
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `default_max_steps`: steps per activity unless overridden (`0` = unbounded)
/// - `default_sleep_period_millis`: pacing delay per step unless overridden
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Name given to the worker thread.
    pub worker_name: String,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` messages will
    /// receive `Lagged` and skip older items. Minimum value is 1 (enforced by Bus).
    pub bus_capacity: usize,

    /// Default step budget for activities added without an explicit one.
    ///
    /// - `0` = unbounded
    /// - `n > 0` = the activity completes after `n` steps
    pub default_max_steps: u64,

    /// Default sleep period (milliseconds, fractional) between steps.
    pub default_sleep_period_millis: f64,
}

impl ControllerConfig {
    /// Returns the default step budget as an `Option`.
    ///
    /// - `None` → unbounded
    /// - `Some(n)` → at most `n` steps
    #[inline]
    pub fn max_steps_limit(&self) -> Option<u64> {
        if self.default_max_steps == 0 {
            None
        } else {
            Some(self.default_max_steps)
        }
    }

    /// Returns the default sleep period with negative and NaN values mapped to `0.0`.
    #[inline]
    pub fn sleep_period_clamped(&self) -> f64 {
        crate::activities::clamp_sleep_period(self.default_sleep_period_millis)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for ControllerConfig {
    /// Default configuration:
    ///
    /// - `worker_name = "simvisor-worker"`
    /// - `bus_capacity = 1024`
    /// - `default_max_steps = 0` (unbounded)
    /// - `default_sleep_period_millis = 0.0` (no pacing)
    fn default() -> Self {
        Self {
            worker_name: "simvisor-worker".to_string(),
            bus_capacity: 1024,
            default_max_steps: 0,
            default_sleep_period_millis: 0.0,
        }
    }
}
