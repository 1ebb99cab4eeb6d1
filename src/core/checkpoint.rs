//! # Checkpoint: the safe point between two steps.
//!
//! Called once per iteration of the activity loop. It is the only place where queued
//! actions run while an activity is active, so actions never overlap a step.
//!
//! ## Algorithm
//! ```text
//! checkpoint(run):
//!   ├─ budget exhausted?            → return false (loop ends)
//!   ├─ while paused:
//!   │     take ONE message (blocking) → dispatch          (idle without busy-waiting)
//!   ├─ drain all queued messages (non-blocking) → dispatch in FIFO order
//!   ├─ paused again or budget exhausted? → start over, no step this time
//!   ├─ step() exactly once           (never preempted; in_step flag set around it)
//!   └─ pacing: sleep floor(carryover) ms if > 0
//! ```
//!
//! ## Rules
//! - A failing action resolves only its own handle; the loop continues.
//! - A failing step, hook or restart ends the activity.
//! - Queue closed while waiting (or while draining) → [`ActivityError::Interrupted`].
//! - Activities and the shutdown marker found in the queue are deferred to the worker.
//! - Once the activity failed inside a burst, the rest of the burst runs as if idle.

use std::panic::{self, AssertUnwindSafe};
use std::thread;

use tokio::sync::mpsc::error::TryRecvError;

use crate::activities::{Activity, ActivityHandle, ActivityState};
use crate::core::action::{Action, ActionKind, ActionOutcome, Disposition};
use crate::core::mailbox::Message;
use crate::core::pacing::Pacing;
use crate::core::worker::Worker;
use crate::error::{ActionError, ActivityError, panic_info};
use crate::events::{Bus, Event, EventKind};

/// A callback failure: returned error or caught panic.
pub(super) enum Fault {
    Error(String),
    Panic(String),
}

/// Runs an activity hook with panic isolation.
pub(super) fn guard(f: impl FnOnce() -> anyhow::Result<()>) -> Result<(), Fault> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Fault::Error(format!("{e:#}"))),
        Err(payload) => Err(Fault::Panic(panic_info(payload))),
    }
}

/// State of one activity run, owned by the loop.
pub(super) struct Run<'a> {
    pub(super) activity: &'a mut dyn Activity,
    pub(super) handle: &'a ActivityHandle,
    pub(super) steps: u64,
    pacing: Pacing,
    paused: bool,
}

impl<'a> Run<'a> {
    pub(super) fn new(activity: &'a mut dyn Activity, handle: &'a ActivityHandle) -> Self {
        Self {
            activity,
            handle,
            steps: 0,
            pacing: Pacing::default(),
            paused: false,
        }
    }

    /// Budget is re-read on every call; setters from other threads apply here.
    fn exhausted(&self) -> bool {
        self.handle.max_steps().is_some_and(|max| self.steps >= max)
    }

    fn publish(&self, bus: &Bus, kind: EventKind) {
        bus.publish(
            Event::new(kind)
                .with_activity(self.handle.name_arc())
                .with_steps(self.steps),
        );
    }

    fn enter_pause(&mut self, bus: &Bus) {
        if !self.paused {
            self.paused = true;
            self.handle.set_state(ActivityState::Paused);
            tracing::debug!(activity = self.handle.name(), steps = self.steps, "activity paused");
            self.publish(bus, EventKind::ActivityPaused);
        }
    }

    fn leave_pause(&mut self, bus: &Bus) {
        if self.paused {
            self.paused = false;
            self.handle.set_state(ActivityState::Running);
            tracing::debug!(activity = self.handle.name(), steps = self.steps, "activity resumed");
            self.publish(bus, EventKind::ActivityResumed);
        }
    }
}

impl Worker {
    /// One loop iteration. Returns `true` after a step ran, `false` once the budget is spent.
    pub(super) fn checkpoint(&mut self, run: &mut Run<'_>) -> Result<bool, ActivityError> {
        loop {
            if run.exhausted() {
                return Ok(false);
            }

            while self.shared.is_paused() {
                run.enter_pause(&self.shared.bus);
                let msg = self
                    .inbox
                    .blocking_recv()
                    .ok_or(ActivityError::Interrupted)?;
                self.dispatch(msg, Some(&mut *run))?;
            }
            run.leave_pause(&self.shared.bus);

            // After a failed restart the rest of the burst is still dispatched.
            let mut failure = None;
            for msg in self.drain()? {
                let target = if failure.is_none() { Some(&mut *run) } else { None };
                if let Err(e) = self.dispatch(msg, target) {
                    failure = Some(e);
                }
            }
            if let Some(e) = failure {
                return Err(e);
            }

            // An action may have paused us or shrunk the budget.
            if self.shared.is_paused() || run.exhausted() {
                continue;
            }

            self.step(run)?;

            if let Some(delay) = run.pacing.next_sleep(run.handle.sleep_period_millis()) {
                thread::sleep(delay);
            }
            return Ok(true);
        }
    }

    /// Takes everything currently queued without blocking.
    fn drain(&mut self) -> Result<Vec<Message>, ActivityError> {
        let mut burst = Vec::new();
        loop {
            match self.inbox.try_recv() {
                Ok(msg) => burst.push(msg),
                Err(TryRecvError::Empty) => return Ok(burst),
                Err(TryRecvError::Disconnected) if burst.is_empty() => {
                    return Err(ActivityError::Interrupted);
                }
                Err(TryRecvError::Disconnected) => return Ok(burst),
            }
        }
    }

    /// Routes one message; `run` is `None` when no activity is active.
    pub(super) fn dispatch(
        &mut self,
        msg: Message,
        run: Option<&mut Run<'_>>,
    ) -> Result<(), ActivityError> {
        match msg {
            Message::Action(action) => self.execute(action, run),
            Message::Activity(queued) => {
                self.backlog.push_back(queued);
                Ok(())
            }
            Message::Shutdown => {
                self.shutdown = true;
                Ok(())
            }
        }
    }

    fn execute(&mut self, action: Action, run: Option<&mut Run<'_>>) -> Result<(), ActivityError> {
        let disposition = action.disposition();
        let Action { label, kind, .. } = action;
        let bus = &self.shared.bus;

        match kind {
            ActionKind::Call(job) => {
                tracing::trace!(action = %label, ?disposition, "executing action");
                match job(disposition) {
                    ActionOutcome::Done => {}
                    ActionOutcome::Skipped => {
                        bus.publish(Event::new(EventKind::ActionCanceled).with_action(label));
                    }
                    ActionOutcome::Failed(reason) => {
                        tracing::debug!(action = %label, error = %reason, "action failed");
                        bus.publish(
                            Event::new(EventKind::ActionFailed)
                                .with_action(label)
                                .with_reason(reason),
                        );
                    }
                }
                Ok(())
            }
            ActionKind::Restart(reply) => {
                if disposition == Disposition::Skip {
                    let _ = reply.send(Err(ActionError::Canceled));
                    bus.publish(Event::new(EventKind::ActionCanceled).with_action(label));
                    return Ok(());
                }
                let Some(run) = run else {
                    let _ = reply.send(Err(ActionError::NoActivity));
                    return Ok(());
                };
                match guard(|| run.activity.restart()) {
                    Ok(()) => {
                        tracing::debug!(
                            activity = run.handle.name(),
                            steps = run.steps,
                            "activity restarted"
                        );
                        run.publish(bus, EventKind::ActivityRestarted);
                        run.steps = 0;
                        run.handle.set_steps(0);
                        let _ = reply.send(Ok(()));
                        Ok(())
                    }
                    Err(Fault::Error(error)) => {
                        let _ = reply.send(Err(ActionError::Failed {
                            error: error.clone(),
                        }));
                        Err(ActivityError::Restart { error })
                    }
                    Err(Fault::Panic(info)) => {
                        let _ = reply.send(Err(ActionError::Panicked { info: info.clone() }));
                        Err(ActivityError::Panicked { info })
                    }
                }
            }
        }
    }

    fn step(&mut self, run: &mut Run<'_>) -> Result<(), ActivityError> {
        self.shared.set_in_step(true);
        let res = guard(|| run.activity.step());
        self.shared.set_in_step(false);

        match res {
            Ok(()) => {
                run.steps += 1;
                run.handle.set_steps(run.steps);
                Ok(())
            }
            Err(Fault::Error(error)) => Err(ActivityError::Step {
                step: run.steps,
                error,
            }),
            Err(Fault::Panic(info)) => Err(ActivityError::Panicked { info }),
        }
    }
}
