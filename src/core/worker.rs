//! # Worker: the single consumer of the mailbox.
//!
//! One worker per controller drives all stepping and all action execution.
//!
//! ```text
//! Worker::run():
//! loop {
//!   ├─► backlog non-empty?  → run_activity(next)      (FIFO, never concurrent)
//!   ├─► shutdown seen?      → exit
//!   └─► blocking_recv()
//!         ├─ Action    → execute now (idle: no step to wait for)
//!         ├─ Activity  → push to backlog
//!         ├─ Shutdown  → mark, keep draining backlog
//!         └─ closed    → exit
//! }
//! ```
//!
//! Leftover backlog entries are dropped on exit, which rejects their handles.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::activities::ActivityState;
use crate::core::checkpoint::{Fault, Run, guard};
use crate::core::mailbox::{Inbox, Queued};
use crate::core::shared::Shared;
use crate::error::ActivityError;
use crate::events::{Event, EventKind};

pub(crate) struct Worker {
    pub(super) inbox: Inbox,
    pub(super) shared: Arc<Shared>,
    pub(super) backlog: VecDeque<Queued>,
    pub(super) shutdown: bool,
}

impl Worker {
    pub(crate) fn new(inbox: Inbox, shared: Arc<Shared>) -> Self {
        Self {
            inbox,
            shared,
            backlog: VecDeque::new(),
            shutdown: false,
        }
    }

    /// Serves activities and actions until shutdown or until the mailbox closes.
    pub(crate) fn run(mut self) {
        tracing::debug!("worker started");
        loop {
            if let Some(queued) = self.backlog.pop_front() {
                let _ = self.run_activity(queued);
                continue;
            }
            if self.shutdown {
                break;
            }
            match self.inbox.blocking_recv() {
                Some(msg) => {
                    // Without a run only restart can fail, and it resolves its own handle.
                    let _ = self.dispatch(msg, None);
                }
                None => break,
            }
        }
        tracing::debug!(dropped = self.backlog.len(), "worker stopped");
    }

    /// Returns the mailbox and any activities found in it but not run.
    pub(crate) fn into_parts(self) -> (Inbox, VecDeque<Queued>) {
        (self.inbox, self.backlog)
    }

    /// Runs one activity to completion and resolves its handle.
    pub(crate) fn run_activity(&mut self, mut queued: Queued) -> Result<(), ActivityError> {
        let handle = queued.handle.clone();
        let name = handle.name_arc();

        handle.set_steps(0);
        handle.set_state(ActivityState::Running);
        tracing::debug!(activity = %name, max_steps = ?handle.max_steps(), "activity starting");
        self.shared
            .bus
            .publish(Event::new(EventKind::ActivityStarting).with_activity(name.clone()));

        let (result, steps) = self.drive(&mut queued);

        match &result {
            Ok(()) => {
                tracing::debug!(activity = %name, steps, "activity completed");
                self.shared.bus.publish(
                    Event::new(EventKind::ActivityCompleted)
                        .with_activity(name)
                        .with_steps(steps),
                );
            }
            Err(e) => {
                tracing::warn!(
                    activity = %name,
                    steps,
                    error = %e,
                    label = e.as_label(),
                    "activity failed"
                );
                self.shared.bus.publish(
                    Event::new(EventKind::ActivityFailed)
                        .with_activity(name)
                        .with_steps(steps)
                        .with_reason(e.as_message()),
                );
            }
        }
        handle.resolve(result.clone());
        result
    }

    /// Hooks plus the checkpoint loop. Returns the result and the final step count.
    fn drive(&mut self, queued: &mut Queued) -> (Result<(), ActivityError>, u64) {
        let handle = queued.handle.clone();
        let activity = queued.activity.as_mut();

        if let Err(fault) = guard(|| activity.pre_activity()) {
            return (Err(hook_error("pre_activity", fault)), 0);
        }

        let mut run = Run::new(&mut *activity, &handle);
        loop {
            match self.checkpoint(&mut run) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => return (Err(e), run.steps),
            }
        }
        let steps = run.steps;

        match guard(|| activity.post_activity()) {
            Ok(()) => (Ok(()), steps),
            Err(fault) => (Err(hook_error("post_activity", fault)), steps),
        }
    }
}

fn hook_error(hook: &'static str, fault: Fault) -> ActivityError {
    match fault {
        Fault::Error(error) => ActivityError::Hook { hook, error },
        Fault::Panic(info) => ActivityError::Panicked { info },
    }
}
