//! # Activity abstractions and handles.
//!
//! This module provides the activity-related types:
//! - [`Activity`] - trait for callback-driven, pausable units of work
//! - [`ActivityFn`] - function-backed activity implementation
//! - [`ActivityHandle`] - live parameters, state and completion of a submitted activity
//! - [`ActivityState`] - lifecycle states reported by the handle

mod activity;
mod activity_fn;
mod handle;

pub use activity::Activity;
pub use activity_fn::ActivityFn;
pub use handle::{ActivityHandle, ActivityState};

pub(crate) use activity_fn::OneShot;

/// Longest per-step sleep period accepted: one hour.
pub(crate) const MAX_SLEEP_PERIOD_MILLIS: f64 = 3_600_000.0;

/// Maps negative, NaN and infinite sleep periods to `0.0` and caps the rest at
/// [`MAX_SLEEP_PERIOD_MILLIS`].
pub(crate) fn clamp_sleep_period(millis: f64) -> f64 {
    if millis.is_finite() && millis > 0.0 {
        millis.min(MAX_SLEEP_PERIOD_MILLIS)
    } else {
        0.0
    }
}
