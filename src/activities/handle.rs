//! # Handle to a submitted activity.
//!
//! [`ActivityHandle`] bundles what callers may observe or tune while an activity runs:
//! - live-mutable parameters (`max_steps`, `sleep_period_millis`), re-read by the
//!   running loop once per iteration
//! - lifecycle [`ActivityState`] and completed step count
//! - the completion result, which resolves **exactly once**
//!
//! All accessors are lock-free and safe from any thread. Clones share the same state.
//!
//! ## State machine
//! ```text
//! Created ──► Queued ──► Running ⇄ Paused ──► Completed | Failed
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use tokio::sync::watch;

use crate::activities::clamp_sleep_period;
use crate::error::ActivityError;

/// Sentinel stored in `max_steps` for "unbounded".
const UNBOUNDED: u64 = u64::MAX;

/// Lifecycle state of an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ActivityState {
    /// Handle exists but was not handed to a controller yet.
    Created = 0,
    /// Waiting in the pending queue or the worker's mailbox.
    Queued = 1,
    /// Stepping (or between steps running actions).
    Running = 2,
    /// Blocked at a checkpoint because the controller is paused.
    Paused = 3,
    /// Finished successfully.
    Completed = 4,
    /// Finished with an error (or rejected).
    Failed = 5,
}

impl ActivityState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ActivityState::Created,
            1 => ActivityState::Queued,
            2 => ActivityState::Running,
            3 => ActivityState::Paused,
            4 => ActivityState::Completed,
            _ => ActivityState::Failed,
        }
    }

    /// True for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, ActivityState::Completed | ActivityState::Failed)
    }
}

type Outcome = Option<Result<(), ActivityError>>;

struct Inner {
    name: Arc<str>,
    max_steps: AtomicU64,
    sleep_period_bits: AtomicU64,
    state: AtomicU8,
    steps: AtomicU64,
    outcome: watch::Sender<Outcome>,
}

/// Shared handle to a submitted activity.
///
/// ## Example
/// ```rust
/// use simvisor::{ActivityFn, Controller, ControllerConfig};
///
/// let ctl = Controller::new(ControllerConfig::default());
/// let handle = ctl.add_activity(ActivityFn::new("noop", || Ok(())));
///
/// handle.set_max_steps(Some(3));
/// handle.set_sleep_period_millis(0.25);
/// assert_eq!(handle.max_steps(), Some(3));
/// assert_eq!(handle.sleep_period_millis(), 0.25);
///
/// ctl.halt().unwrap();
/// assert!(handle.wait().is_ok());
/// assert_eq!(handle.steps_completed(), 3);
/// ```
#[derive(Clone)]
pub struct ActivityHandle {
    inner: Arc<Inner>,
}

impl ActivityHandle {
    pub(crate) fn new(name: &str, max_steps: Option<u64>, sleep_period_millis: f64) -> Self {
        let (outcome, _rx) = watch::channel(None);
        let handle = Self {
            inner: Arc::new(Inner {
                name: Arc::from(name),
                max_steps: AtomicU64::new(UNBOUNDED),
                sleep_period_bits: AtomicU64::new(0f64.to_bits()),
                state: AtomicU8::new(ActivityState::Created as u8),
                steps: AtomicU64::new(0),
                outcome,
            }),
        };
        handle.set_max_steps(max_steps);
        handle.set_sleep_period_millis(sleep_period_millis);
        handle
    }

    /// Returns the activity name captured at submission.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.inner.name)
    }

    /// Returns the step budget (`None` = unbounded).
    pub fn max_steps(&self) -> Option<u64> {
        match self.inner.max_steps.load(Ordering::Acquire) {
            UNBOUNDED => None,
            n => Some(n),
        }
    }

    /// Sets the step budget; takes effect at the next checkpoint.
    pub fn set_max_steps(&self, max_steps: Option<u64>) {
        self.inner
            .max_steps
            .store(max_steps.unwrap_or(UNBOUNDED), Ordering::Release);
    }

    /// Returns the pacing delay per step in milliseconds.
    pub fn sleep_period_millis(&self) -> f64 {
        f64::from_bits(self.inner.sleep_period_bits.load(Ordering::Acquire))
    }

    /// Sets the pacing delay per step; negative, NaN and infinite values become `0.0`,
    /// anything above one hour is capped.
    pub fn set_sleep_period_millis(&self, millis: f64) {
        self.inner
            .sleep_period_bits
            .store(clamp_sleep_period(millis).to_bits(), Ordering::Release);
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ActivityState {
        ActivityState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Steps completed in the current run (reset by a restart).
    pub fn steps_completed(&self) -> u64 {
        self.inner.steps.load(Ordering::Acquire)
    }

    /// True once the completion result has resolved.
    pub fn is_finished(&self) -> bool {
        self.inner.outcome.borrow().is_some()
    }

    /// Non-blocking peek at the completion result.
    pub fn outcome(&self) -> Option<Result<(), ActivityError>> {
        self.inner.outcome.borrow().clone()
    }

    /// Waits asynchronously for the completion result.
    pub async fn finished(&self) -> Result<(), ActivityError> {
        let mut rx = self.inner.outcome.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(slot) => (*slot).clone().unwrap_or(Err(ActivityError::Interrupted)),
            Err(_closed) => Err(ActivityError::Interrupted),
        }
    }

    /// Blocks the calling thread until the completion result resolves.
    pub fn wait(&self) -> Result<(), ActivityError> {
        futures::executor::block_on(self.finished())
    }

    pub(crate) fn set_state(&self, state: ActivityState) {
        self.inner.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn set_steps(&self, steps: u64) {
        self.inner.steps.store(steps, Ordering::Release);
    }

    /// Resolves the completion result; returns `false` if it was already resolved.
    pub(crate) fn resolve(&self, result: Result<(), ActivityError>) -> bool {
        let state = if result.is_ok() {
            ActivityState::Completed
        } else {
            ActivityState::Failed
        };
        // State flips before waiters are notified.
        self.inner.outcome.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            self.set_state(state);
            *slot = Some(result);
            true
        })
    }
}

impl std::fmt::Debug for ActivityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityHandle")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("steps", &self.steps_completed())
            .field("max_steps", &self.max_steps())
            .field("sleep_period_millis", &self.sleep_period_millis())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::MAX_SLEEP_PERIOD_MILLIS;

    #[test]
    fn test_defaults_and_setters() {
        let h = ActivityHandle::new("mc", None, 0.0);
        assert_eq!(h.name(), "mc");
        assert_eq!(h.state(), ActivityState::Created);
        assert_eq!(h.max_steps(), None);
        assert_eq!(h.sleep_period_millis(), 0.0);

        h.set_max_steps(Some(0));
        assert_eq!(h.max_steps(), Some(0));
        h.set_sleep_period_millis(f64::NAN);
        assert_eq!(h.sleep_period_millis(), 0.0);
        h.set_sleep_period_millis(-1.0);
        assert_eq!(h.sleep_period_millis(), 0.0);
        h.set_sleep_period_millis(0.5);
        assert_eq!(h.clone().sleep_period_millis(), 0.5);
    }

    #[test]
    fn test_huge_sleep_period_is_capped() {
        let h = ActivityHandle::new("md", None, 1e300);
        assert_eq!(h.sleep_period_millis(), MAX_SLEEP_PERIOD_MILLIS);
        h.set_sleep_period_millis(f64::MAX);
        assert_eq!(h.sleep_period_millis(), MAX_SLEEP_PERIOD_MILLIS);
    }

    #[test]
    fn test_resolves_exactly_once() {
        let h = ActivityHandle::new("md", Some(5), 0.0);
        assert!(!h.is_finished());
        assert!(h.resolve(Err(ActivityError::Interrupted)));
        assert!(!h.resolve(Ok(())));

        assert_eq!(h.state(), ActivityState::Failed);
        assert_eq!(h.outcome(), Some(Err(ActivityError::Interrupted)));
        assert_eq!(h.wait(), Err(ActivityError::Interrupted));
    }

    #[tokio::test]
    async fn test_finished_wakes_async_waiter() {
        let h = ActivityHandle::new("md", Some(1), 0.0);
        let waiter = {
            let h = h.clone();
            tokio::spawn(async move { h.finished().await })
        };
        tokio::task::yield_now().await;
        h.resolve(Ok(()));
        assert_eq!(waiter.await.unwrap(), Ok(()));
        assert_eq!(h.state(), ActivityState::Completed);
    }
}
