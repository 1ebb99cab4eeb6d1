//! # Runtime events emitted by the controller and its worker.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Controller events**: facade control (start, pause/resume requests, halt)
//! - **Activity events**: activity lifecycle (queued, starting, paused, completed, failed)
//! - **Action events**: isolated action failures and cancellations
//!
//! The [`Event`] struct carries additional metadata such as timestamps, the activity
//! name, the action label or subscriber name, reasons and step counts.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use simvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ActivityFailed)
//!     .with_activity("md-run")
//!     .with_reason("step 3 failed: nan energy")
//!     .with_steps(3);
//!
//! assert_eq!(ev.kind, EventKind::ActivityFailed);
//! assert_eq!(ev.activity.as_deref(), Some("md-run"));
//! assert_eq!(ev.steps, Some(3));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `subscriber`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber queue was full and events were dropped for that subscriber.
    ///
    /// Published once per overflow episode, when the queue accepts an event again.
    ///
    /// Sets:
    /// - `subscriber`: subscriber name
    /// - `reason`: how many events were dropped
    SubscriberOverflow,

    // === Controller events ===
    /// `start()` flipped the controller to started (published once).
    ControllerStarted,

    /// Pause flag set by `pause()` or `toggle()`.
    PauseRequested,

    /// Pause flag cleared by `unpause()` or `toggle()`.
    ResumeRequested,

    /// `halt()` was called; queued work is being completed.
    HaltRequested,

    /// The worker finished all queued work and exited.
    Halted,

    // === Activity lifecycle events ===
    /// Activity accepted by `add_activity`.
    ///
    /// Sets:
    /// - `activity`: activity name
    ActivityQueued,

    /// Worker picked the activity up and is about to run `pre_activity`.
    ///
    /// Sets:
    /// - `activity`: activity name
    ActivityStarting,

    /// Checkpoint observed the pause flag and is waiting for actions only.
    ///
    /// Sets:
    /// - `activity`: activity name
    /// - `steps`: steps completed so far
    ActivityPaused,

    /// Checkpoint observed the pause flag cleared and resumes stepping.
    ///
    /// Sets:
    /// - `activity`: activity name
    /// - `steps`: steps completed so far
    ActivityResumed,

    /// `restart()` hook ran at a safe point; the step counter was reset.
    ///
    /// Sets:
    /// - `activity`: activity name
    /// - `steps`: steps completed before the restart
    ActivityRestarted,

    /// Activity ran to its step budget and `post_activity` succeeded.
    ///
    /// Sets:
    /// - `activity`: activity name
    /// - `steps`: steps completed
    ActivityCompleted,

    /// Activity ended with an error; the controller moves on.
    ///
    /// Sets:
    /// - `activity`: activity name
    /// - `steps`: steps completed
    /// - `reason`: failure message
    ActivityFailed,

    // === Action events ===
    /// Action callback returned an error or panicked.
    ///
    /// Sets:
    /// - `action`: action label
    /// - `reason`: failure message
    ActionFailed,

    /// Action was canceled before dequeue and skipped.
    ///
    /// Sets:
    /// - `action`: action label
    ActionCanceled,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Name of the activity, if applicable.
    pub activity: Option<Arc<str>>,
    /// Label of the action, for action events.
    pub action: Option<Arc<str>>,
    /// Name of the subscriber, for subscriber events.
    pub subscriber: Option<&'static str>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Steps completed by the activity at the time of the event.
    pub steps: Option<u64>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            activity: None,
            action: None,
            subscriber: None,
            reason: None,
            steps: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an activity name.
    #[inline]
    pub fn with_activity(mut self, name: impl Into<Arc<str>>) -> Self {
        self.activity = Some(name.into());
        self
    }

    /// Attaches an action label.
    #[inline]
    pub fn with_action(mut self, label: impl Into<Arc<str>>) -> Self {
        self.action = Some(label.into());
        self
    }

    /// Attaches a step count.
    #[inline]
    pub fn with_steps(mut self, steps: u64) -> Self {
        self.steps = Some(steps);
        self
    }

    /// Reports `dropped` events lost by one subscriber's queue.
    pub fn subscriber_overflow(subscriber: &'static str, dropped: u64) -> Self {
        let mut ev = Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("dropped {dropped} events"));
        ev.subscriber = Some(subscriber);
        ev
    }

    /// Reports a panic caught in `Subscribe::on_event`.
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        let mut ev = Event::new(EventKind::SubscriberPanicked).with_reason(info);
        ev.subscriber = Some(subscriber);
        ev
    }
}
