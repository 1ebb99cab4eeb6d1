//! # Worker mailbox.
//!
//! A single unbounded FIFO carries everything the worker consumes: actions, activities
//! handed over after `start()`, and the shutdown marker sent by `halt()`. Many producers
//! (any thread), one consumer (the worker, or the caller of `run_activity_blocking`).
//!
//! Keeping activities and actions on one queue preserves submission order between them:
//! an activity queued before `halt()` is always seen before the shutdown marker.

use tokio::sync::mpsc;

use crate::activities::{Activity, ActivityHandle};
use crate::core::action::Action;
use crate::error::ActivityError;

pub(crate) type Inbox = mpsc::UnboundedReceiver<Message>;
pub(crate) type Outbox = mpsc::UnboundedSender<Message>;

pub(crate) fn channel() -> (Outbox, Inbox) {
    mpsc::unbounded_channel()
}

pub(crate) enum Message {
    Action(Action),
    Activity(Queued),
    Shutdown,
}

/// An activity waiting for the worker, with its handle.
///
/// Dropping a `Queued` that never ran rejects its handle, so a handle never hangs
/// when the controller or the worker goes away.
pub(crate) struct Queued {
    pub(crate) activity: Box<dyn Activity>,
    pub(crate) handle: ActivityHandle,
}

impl Queued {
    pub(crate) fn new(activity: Box<dyn Activity>, handle: ActivityHandle) -> Self {
        Self { activity, handle }
    }
}

impl Drop for Queued {
    fn drop(&mut self) {
        if self
            .handle
            .resolve(Err(ActivityError::rejected("controller closed before the activity ran")))
        {
            tracing::debug!(activity = self.handle.name(), "queued activity dropped");
        }
    }
}
