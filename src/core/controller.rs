//! # Controller: the public facade over one simulation worker.
//!
//! The [`Controller`] owns the pause flag, a pending-activity FIFO, the mailbox and
//! (once needed) a dedicated worker thread. Any thread may call into it; only the
//! worker ever steps an activity or executes an action.
//!
//! ## Architecture
//! ```text
//! callers (any thread)
//!   ├─ add_activity ──────────► pending FIFO ──(start)──┐
//!   │                                                   ▼
//!   ├─ submit_action_interrupt ─────────────────► mailbox (unbounded FIFO)
//!   ├─ pause/unpause/toggle ─► flag + no-op wake ──►    │
//!   └─ halt ─► start + unpause + Shutdown ─────────►    │
//!                                                       ▼
//!                                  worker thread: Worker::run()
//!                                    ├─ idle: execute actions as they arrive
//!                                    └─ activity: pre → checkpoint/step loop → post
//!                                                       │
//!                                            ActivityHandle resolves
//! ```
//!
//! ## State machine
//! ```text
//! NotStarted ──start()──► Started{Paused ⇄ Running} ──halt()──► Terminal
//! ```
//! The pause flag starts `true`: `start()` alone never runs a step.
//!
//! ## Rules
//! - Activities run strictly FIFO, never concurrently.
//! - Actions run in submission order, only between steps.
//! - Pause/unpause take effect at the next checkpoint; an in-flight step always completes.
//! - `run_activity_blocking` lends the mailbox to the caller's thread; mixing it with
//!   `start()`/`halt()` is rejected instead of reordering work.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use simvisor::{ActivityFn, Controller, ControllerConfig};
//!
//! let ctl = Controller::new(ControllerConfig::default());
//! let energy = Arc::new(AtomicU64::new(0));
//!
//! let e = Arc::clone(&energy);
//! let md = ctl.add_activity_with(
//!     ActivityFn::new("md", move || {
//!         e.fetch_add(1, Ordering::SeqCst);
//!         Ok(())
//!     }),
//!     Some(100),
//!     0.0,
//! );
//!
//! ctl.start().unwrap();
//! ctl.unpause().wait().unwrap();
//!
//! let e = Arc::clone(&energy);
//! let seen = ctl.submit_action_interrupt(move || Ok(e.load(Ordering::SeqCst)));
//! assert!(seen.wait().unwrap() <= 100);
//!
//! md.wait().unwrap();
//! assert_eq!(energy.load(Ordering::SeqCst), 100);
//! ctl.halt().unwrap();
//! ```

use std::collections::VecDeque;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use futures::executor::block_on;
use tokio::sync::{broadcast, watch};

use crate::activities::{Activity, ActivityHandle, ActivityState, OneShot};
use crate::config::ControllerConfig;
use crate::error::{ActivityError, ControllerError};
use crate::events::{Event, EventKind};

use super::action::{Action, ActionHandle};
use super::builder::ControllerBuilder;
use super::mailbox::{self, Inbox, Message, Outbox, Queued};
use super::pump::EventPump;
use super::shared::Shared;
use super::worker::Worker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    NotStarted,
    Started,
    Terminal,
}

/// Who currently consumes the mailbox.
enum InboxSlot {
    /// Nobody yet.
    Parked(Inbox),
    /// Lent to a `run_activity_blocking` caller.
    Borrowed,
    /// Moved into the worker thread (or lost with a failed spawn).
    Spawned,
}

struct Lifecycle {
    phase: Phase,
    pending: VecDeque<Queued>,
    inbox: InboxSlot,
    worker: Option<JoinHandle<()>>,
    worker_id: Option<ThreadId>,
    pump: Option<EventPump>,
}

/// Schedules activities on one dedicated worker and funnels all interaction through
/// a single ordered queue.
pub struct Controller {
    cfg: ControllerConfig,
    shared: Arc<Shared>,
    outbox: Outbox,
    lifecycle: Mutex<Lifecycle>,
    /// Flips to `true` once the halting caller joined the worker.
    halted: watch::Sender<bool>,
}

impl Controller {
    /// Returns a builder for a controller with subscribers.
    pub fn builder(cfg: ControllerConfig) -> ControllerBuilder {
        ControllerBuilder::new(cfg)
    }

    /// Creates a controller without subscribers.
    pub fn new(cfg: ControllerConfig) -> Arc<Self> {
        Self::builder(cfg).build()
    }

    pub(super) fn new_internal(
        cfg: ControllerConfig,
        shared: Arc<Shared>,
        pump: Option<EventPump>,
    ) -> Self {
        let (outbox, inbox) = mailbox::channel();
        let (halted, _) = watch::channel(false);
        Self {
            cfg,
            shared,
            outbox,
            lifecycle: Mutex::new(Lifecycle {
                phase: Phase::NotStarted,
                pending: VecDeque::new(),
                inbox: InboxSlot::Parked(inbox),
                worker: None,
                worker_id: None,
                pump,
            }),
            halted,
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues an activity with the configured default step budget and pacing.
    pub fn add_activity<A: Activity>(&self, activity: A) -> ActivityHandle {
        self.add_activity_with(
            activity,
            self.cfg.max_steps_limit(),
            self.cfg.sleep_period_clamped(),
        )
    }

    /// Queues an activity with an explicit step budget (`None` = unbounded) and pacing.
    ///
    /// Before `start()` the activity waits in the pending FIFO; afterwards it goes
    /// straight to the worker. After `halt()` the returned handle is already rejected.
    pub fn add_activity_with<A: Activity>(
        &self,
        activity: A,
        max_steps: Option<u64>,
        sleep_period_millis: f64,
    ) -> ActivityHandle {
        let handle = ActivityHandle::new(activity.name(), max_steps, sleep_period_millis);
        let queued = Queued::new(Box::new(activity), handle.clone());

        let mut lc = self.lifecycle();
        if lc.phase == Phase::Terminal {
            handle.resolve(Err(ActivityError::rejected("controller halted")));
            return handle;
        }

        handle.set_state(ActivityState::Queued);
        tracing::debug!(activity = handle.name(), max_steps = ?max_steps, "activity queued");
        self.shared
            .bus
            .publish(Event::new(EventKind::ActivityQueued).with_activity(handle.name_arc()));

        match lc.phase {
            Phase::NotStarted => lc.pending.push_back(queued),
            _ => {
                // A failed send drops the activity, which rejects its handle.
                let _ = self.outbox.send(Message::Activity(queued));
            }
        }
        handle
    }

    /// Hands pending activities to the worker. Stepping still waits for `unpause()`.
    ///
    /// Idempotent. Fails with [`ControllerError::BlockingRunActive`] while
    /// `run_activity_blocking` owns the mailbox.
    pub fn start(&self) -> Result<(), ControllerError> {
        let mut lc = self.lifecycle();
        self.start_locked(&mut lc)
    }

    fn start_locked(&self, lc: &mut Lifecycle) -> Result<(), ControllerError> {
        if lc.phase != Phase::NotStarted {
            return Ok(());
        }
        if matches!(lc.inbox, InboxSlot::Borrowed) {
            return Err(ControllerError::BlockingRunActive);
        }

        lc.phase = Phase::Started;
        tracing::debug!(
            pending = lc.pending.len(),
            paused = self.shared.is_paused(),
            "controller started"
        );
        self.shared
            .bus
            .publish(Event::new(EventKind::ControllerStarted));

        for queued in lc.pending.drain(..) {
            let _ = self.outbox.send(Message::Activity(queued));
        }
        self.ensure_worker(lc)
    }

    fn ensure_worker(&self, lc: &mut Lifecycle) -> Result<(), ControllerError> {
        let inbox = match mem::replace(&mut lc.inbox, InboxSlot::Spawned) {
            InboxSlot::Parked(inbox) => inbox,
            other => {
                lc.inbox = other;
                return Ok(());
            }
        };

        let worker = Worker::new(inbox, Arc::clone(&self.shared));
        let join = thread::Builder::new()
            .name(self.cfg.worker_name.clone())
            .spawn(move || worker.run())
            .map_err(|error| {
                tracing::error!(%error, "failed to spawn worker thread");
                ControllerError::Spawn { error }
            })?;
        lc.worker_id = Some(join.thread().id());
        lc.worker = Some(join);
        Ok(())
    }

    /// Runs one activity on the calling thread with the configured defaults.
    pub fn run_activity_blocking<A: Activity>(&self, activity: A) -> Result<(), ActivityError> {
        self.run_activity_blocking_with(
            activity,
            self.cfg.max_steps_limit(),
            self.cfg.sleep_period_clamped(),
        )
    }

    /// Runs one activity on the calling thread, which acts as the worker for the call.
    ///
    /// The pause flag is honored like on the worker: unpause first, or the call waits
    /// for an `unpause()` from another thread. Actions submitted meanwhile run at this
    /// activity's checkpoints. Rejected once `start()` was called or a worker exists.
    ///
    /// Blocks the thread; do not call it from inside an async runtime.
    pub fn run_activity_blocking_with<A: Activity>(
        &self,
        activity: A,
        max_steps: Option<u64>,
        sleep_period_millis: f64,
    ) -> Result<(), ActivityError> {
        let handle = ActivityHandle::new(activity.name(), max_steps, sleep_period_millis);
        let queued = Queued::new(Box::new(activity), handle.clone());

        let inbox = {
            let mut lc = self.lifecycle();
            let claimed = match (lc.phase, mem::replace(&mut lc.inbox, InboxSlot::Borrowed)) {
                (Phase::NotStarted, InboxSlot::Parked(inbox)) => Ok(inbox),
                (phase, slot) => {
                    lc.inbox = slot;
                    Err(match phase {
                        Phase::Terminal => "controller halted",
                        _ => "the action queue is owned by the worker",
                    })
                }
            };
            match claimed {
                Ok(inbox) => inbox,
                Err(reason) => {
                    tracing::warn!(activity = handle.name(), reason, "blocking run rejected");
                    let err = ActivityError::rejected(reason);
                    handle.resolve(Err(err.clone()));
                    return Err(err);
                }
            }
        };

        let mut worker = Worker::new(inbox, Arc::clone(&self.shared));
        let result = worker.run_activity(queued);
        let (inbox, backlog) = worker.into_parts();

        let mut lc = self.lifecycle();
        let has_mail = !inbox.is_empty();
        lc.inbox = InboxSlot::Parked(inbox);
        for queued in backlog.into_iter().rev() {
            lc.pending.push_front(queued);
        }
        if has_mail {
            // Actions submitted after the last checkpoint still need a consumer.
            let _ = self.ensure_worker(&mut lc);
        }
        result
    }

    /// Sets the pause flag; the returned handle resolves once the worker observed it.
    pub fn pause(&self) -> ActionHandle<()> {
        self.shared.set_paused(true);
        tracing::debug!("pause requested");
        self.shared.bus.publish(Event::new(EventKind::PauseRequested));
        self.wake("pause")
    }

    /// Clears the pause flag; the returned handle resolves once the worker observed it.
    pub fn unpause(&self) -> ActionHandle<()> {
        self.shared.set_paused(false);
        tracing::debug!("resume requested");
        self.shared
            .bus
            .publish(Event::new(EventKind::ResumeRequested));
        self.wake("unpause")
    }

    /// Flips the pause flag.
    pub fn toggle(&self) -> ActionHandle<()> {
        let kind = if self.shared.toggle_paused() {
            EventKind::PauseRequested
        } else {
            EventKind::ResumeRequested
        };
        tracing::debug!(?kind, "toggle requested");
        self.shared.bus.publish(Event::new(kind));
        self.wake("toggle")
    }

    /// Enqueues a no-op so a consumer blocked on the mailbox re-reads the pause flag.
    fn wake(&self, label: &'static str) -> ActionHandle<()> {
        let lc = self.lifecycle();
        if matches!(lc.inbox, InboxSlot::Parked(_)) {
            return ActionHandle::ready(Ok(()));
        }
        let (action, handle) = Action::call(label, || Ok(()));
        let _ = self.outbox.send(Message::Action(action));
        handle
    }

    /// Runs `f` on the worker at the next safe point of whichever activity is active,
    /// or immediately if the worker is idle.
    pub fn submit_action_interrupt<F, T>(&self, f: F) -> ActionHandle<T>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit_action_named("interrupt", f)
    }

    /// Same as [`submit_action_interrupt`](Self::submit_action_interrupt), with a label
    /// used in logs and action events.
    pub fn submit_action_named<F, T>(&self, label: impl Into<Arc<str>>, f: F) -> ActionHandle<T>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (action, handle) = Action::call(label, f);
        self.enqueue(action);
        handle
    }

    /// Queues `f` as a one-step activity, in FIFO order with the other activities.
    pub fn add_action_sequential<F>(&self, f: F) -> ActivityHandle
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.add_activity_with(OneShot::new(f), Some(1), 0.0)
    }

    /// Calls the running activity's `restart()` hook at the next safe point.
    ///
    /// Resolves with [`ActionError::NoActivity`](crate::ActionError::NoActivity) when
    /// nothing is running. A failing hook fails the activity as well.
    pub fn restart_current_activity(&self) -> ActionHandle<()> {
        let (action, handle) = Action::restart();
        self.enqueue(action);
        handle
    }

    fn enqueue(&self, action: Action) {
        let mut lc = self.lifecycle();
        if lc.phase == Phase::Terminal {
            tracing::debug!(action = %action.label, "action submitted after halt");
            return;
        }
        if self.outbox.send(Message::Action(action)).is_err() {
            return;
        }
        let _ = self.ensure_worker(&mut lc);
    }

    /// Starts, unpauses and shuts down the worker, blocking until every queued and
    /// in-flight activity finished.
    ///
    /// Idempotent: later calls wait for the first one to finish joining the worker and
    /// then return `Ok(())`; only the first caller reports a worker panic. Cannot be
    /// called from the worker thread itself ([`ControllerError::HaltFromWorker`]).
    pub fn halt(&self) -> Result<(), ControllerError> {
        let (worker, pump) = {
            let mut lc = self.lifecycle();
            if lc.worker_id == Some(thread::current().id()) {
                return Err(ControllerError::HaltFromWorker);
            }
            if lc.phase == Phase::Terminal {
                let mut halted = self.halted.subscribe();
                drop(lc);
                let _ = block_on(halted.wait_for(|done| *done));
                return Ok(());
            }

            self.start_locked(&mut lc)?;
            self.shared.set_paused(false);
            lc.phase = Phase::Terminal;

            tracing::debug!("halt requested");
            let _ = self.outbox.send(Message::Shutdown);
            self.shared.bus.publish(Event::new(EventKind::HaltRequested));
            (lc.worker.take(), lc.pump.take())
        };

        let joined = match worker {
            Some(worker) => worker.join().map_err(|_| ControllerError::WorkerPanicked),
            None => Ok(()),
        };

        tracing::debug!("controller halted");
        self.shared.bus.publish(Event::new(EventKind::Halted));
        if let Some(pump) = pump {
            pump.stop();
        }
        self.halted.send_replace(true);
        joined
    }

    /// Alias of [`halt`](Self::halt).
    pub fn complete_activities(&self) -> Result<(), ControllerError> {
        self.halt()
    }

    /// Current value of the pause flag.
    pub fn is_paused(&self) -> bool {
        self.shared.is_paused()
    }

    /// True only while a step body is executing.
    pub fn is_running_activity_step(&self) -> bool {
        self.shared.in_step()
    }

    /// Returns the configuration the controller was built with.
    pub fn config(&self) -> &ControllerConfig {
        &self.cfg
    }

    /// Subscribes to the event bus; only events published afterwards are received.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.shared.bus.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::ActivityFn;
    use crate::error::ActionError;
    use crate::subscribers::Subscribe;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    fn controller() -> Arc<Controller> {
        Controller::new(ControllerConfig::default())
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn counter(
        name: &'static str,
    ) -> (
        ActivityFn<impl FnMut() -> anyhow::Result<()> + Send + 'static>,
        Arc<AtomicU64>,
    ) {
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let act = ActivityFn::new(name, move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (act, count)
    }

    fn wait_for_event(rx: &mut broadcast::Receiver<Event>, kind: EventKind) {
        loop {
            match rx.blocking_recv() {
                Ok(ev) if ev.kind == kind => return,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(e) => panic!("bus closed before {kind:?}: {e}"),
            }
        }
    }

    /// Blocks in `step()` until the test sends on the gate.
    struct Gated {
        gate: mpsc::Receiver<()>,
    }

    impl Activity for Gated {
        fn name(&self) -> &str {
            "gated"
        }
        fn step(&mut self) -> anyhow::Result<()> {
            let _ = self.gate.recv();
            Ok(())
        }
        fn restart(&mut self) -> anyhow::Result<()> {
            anyhow::bail!("cannot rewind")
        }
    }

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        log: Log,
    }

    impl Recorder {
        fn push(&self, what: &str) {
            self.log.lock().unwrap().push(format!("{}:{what}", self.name));
        }
    }

    impl Activity for Recorder {
        fn name(&self) -> &str {
            self.name
        }
        fn pre_activity(&mut self) -> anyhow::Result<()> {
            self.push("pre");
            Ok(())
        }
        fn step(&mut self) -> anyhow::Result<()> {
            self.push("step");
            Ok(())
        }
        fn post_activity(&mut self) -> anyhow::Result<()> {
            self.push("post");
            Ok(())
        }
    }

    #[test]
    fn test_counter_runs_to_budget_after_unpause() {
        let ctl = controller();
        let (act, count) = counter("counter");
        let handle = ctl.add_activity_with(act, Some(5), 0.0);

        ctl.start().unwrap();
        ctl.unpause().wait().unwrap();
        assert_eq!(handle.wait(), Ok(()));
        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert_eq!(handle.state(), ActivityState::Completed);
        assert_eq!(handle.steps_completed(), 5);
        ctl.halt().unwrap();
    }

    #[test]
    fn test_pacing_spreads_steps_over_time() {
        let ctl = controller();
        let (act, count) = counter("paced");
        let handle = ctl.add_activity_with(act, Some(200), 0.5);

        let began = Instant::now();
        ctl.start().unwrap();
        ctl.unpause().wait().unwrap();
        assert_eq!(handle.wait(), Ok(()));
        let elapsed = began.elapsed();

        assert_eq!(count.load(Ordering::SeqCst), 200);
        // 200 x 0.5ms = 100 whole-millisecond sleeps.
        assert!(elapsed >= Duration::from_millis(100), "took {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
        ctl.halt().unwrap();
    }

    #[test]
    fn test_live_retune_applies_on_next_iteration() {
        let ctl = controller();
        let (act, _) = counter("retuned");
        let handle = ctl.add_activity_with(act, None, 0.0);
        ctl.start().unwrap();
        ctl.unpause().wait().unwrap();
        wait_until(|| handle.steps_completed() >= 10);

        handle.set_sleep_period_millis(20.0);
        let from = handle.steps_completed();
        let began = Instant::now();
        wait_until(|| handle.steps_completed() >= from + 5);
        // At most one step can still use the old period.
        assert!(began.elapsed() >= Duration::from_millis(60), "took {:?}", began.elapsed());

        handle.set_sleep_period_millis(0.0);
        let cap = handle.steps_completed();
        handle.set_max_steps(Some(cap));
        assert_eq!(handle.wait(), Ok(()));
        assert!(handle.steps_completed() <= cap + 1);
        ctl.halt().unwrap();
    }

    #[test]
    fn test_start_alone_stays_paused() {
        let ctl = controller();
        let (act, count) = counter("md");
        let handle = ctl.add_activity_with(act, Some(10), 0.0);

        ctl.start().unwrap();
        wait_until(|| handle.state() == ActivityState::Paused);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(ctl.is_paused());

        ctl.unpause().wait().unwrap();
        assert_eq!(handle.wait(), Ok(()));
        assert_eq!(count.load(Ordering::SeqCst), 10);
        ctl.halt().unwrap();
    }

    #[test]
    fn test_activities_run_fifo_without_overlap() {
        let ctl = controller();
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let handles: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                let act = Recorder {
                    name,
                    log: Arc::clone(&log),
                };
                ctl.add_activity_with(act, Some(1), 0.0)
            })
            .collect();

        ctl.start().unwrap();
        ctl.unpause().wait().unwrap();
        for h in &handles {
            assert_eq!(h.wait(), Ok(()));
        }
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "a:pre", "a:step", "a:post", "b:pre", "b:step", "b:post", "c:pre", "c:step",
                "c:post"
            ]
        );
        ctl.halt().unwrap();
    }

    #[test]
    fn test_actions_never_overlap_steps() {
        let ctl = controller();
        let in_step = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&in_step);
        let handle = ctl.add_activity_with(
            ActivityFn::new("busy", move || {
                flag.store(true, Ordering::SeqCst);
                thread::sleep(Duration::from_micros(200));
                flag.store(false, Ordering::SeqCst);
                Ok(())
            }),
            None,
            0.0,
        );
        ctl.start().unwrap();
        ctl.unpause().wait().unwrap();

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let ctl = Arc::clone(&ctl);
                let in_step = Arc::clone(&in_step);
                thread::spawn(move || {
                    (0..25)
                        .map(|_| {
                            let in_step = Arc::clone(&in_step);
                            ctl.submit_action_interrupt(move || Ok(!in_step.load(Ordering::SeqCst)))
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for producer in producers {
            for action in producer.join().unwrap() {
                assert_eq!(action.wait(), Ok(true));
            }
        }
        assert!(handle.steps_completed() > 0);
        handle.set_max_steps(Some(0));
        assert_eq!(handle.wait(), Ok(()));
        ctl.halt().unwrap();
    }

    #[test]
    fn test_action_waits_for_running_step() {
        let ctl = controller();
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let step_done = Arc::new(AtomicBool::new(false));

        let done = Arc::clone(&step_done);
        let handle = ctl.add_activity_with(
            ActivityFn::new("slow", move || {
                entered_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                done.store(true, Ordering::SeqCst);
                Ok(())
            }),
            Some(1),
            0.0,
        );
        ctl.start().unwrap();
        ctl.unpause().wait().unwrap();
        entered_rx.recv().unwrap();
        assert!(ctl.is_running_activity_step());

        let done = Arc::clone(&step_done);
        let mut action = ctl.submit_action_interrupt(move || Ok(done.load(Ordering::SeqCst)));
        thread::sleep(Duration::from_millis(20));
        assert!(action.try_result().is_none());

        release_tx.send(()).unwrap();
        assert_eq!(action.wait(), Ok(true));
        assert_eq!(handle.wait(), Ok(()));
        assert!(!ctl.is_running_activity_step());
        ctl.halt().unwrap();
    }

    #[test]
    fn test_pause_blocks_steps_but_not_actions() {
        let ctl = controller();
        let (act, count) = counter("mc");
        let handle = ctl.add_activity_with(act, None, 0.0);
        ctl.start().unwrap();
        ctl.unpause().wait().unwrap();
        wait_until(|| count.load(Ordering::SeqCst) > 0);

        assert_eq!(ctl.pause().wait(), Ok(()));
        let frozen = count.load(Ordering::SeqCst);
        for _ in 0..10 {
            let c = Arc::clone(&count);
            let seen = ctl.submit_action_interrupt(move || Ok(c.load(Ordering::SeqCst)));
            assert_eq!(seen.wait(), Ok(frozen));
        }
        thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), frozen);
        assert_eq!(handle.state(), ActivityState::Paused);

        ctl.unpause().wait().unwrap();
        wait_until(|| count.load(Ordering::SeqCst) > frozen);
        handle.set_max_steps(Some(0));
        assert_eq!(handle.wait(), Ok(()));
        ctl.halt().unwrap();
    }

    #[test]
    fn test_failing_action_does_not_affect_next() {
        let ctl = controller();
        let failing = ctl.submit_action_interrupt(|| -> anyhow::Result<()> {
            anyhow::bail!("bad temperature")
        });
        let panicking = ctl.submit_action_interrupt(|| -> anyhow::Result<()> { panic!("boom") });
        let fine = ctl.submit_action_interrupt(|| Ok(7));

        assert_eq!(
            failing.wait(),
            Err(ActionError::Failed {
                error: "bad temperature".into()
            })
        );
        assert_eq!(
            panicking.wait(),
            Err(ActionError::Panicked {
                info: "boom".into()
            })
        );
        assert_eq!(fine.wait(), Ok(7));
        ctl.halt().unwrap();
    }

    #[test]
    fn test_idle_actions_run_immediately_in_order() {
        let ctl = controller();
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let handles: Vec<_> = (1..=3)
            .map(|i| {
                let log = Arc::clone(&log);
                ctl.submit_action_interrupt(move || {
                    let mut log = log.lock().unwrap();
                    log.push(format!("a{i}"));
                    Ok(log.len())
                })
            })
            .collect();

        let positions: Vec<_> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
        assert_eq!(positions, vec![1, 2, 3]);
        assert_eq!(*log.lock().unwrap(), vec!["a1", "a2", "a3"]);
        ctl.halt().unwrap();
    }

    #[test]
    fn test_canceled_action_is_skipped() {
        let ctl = controller();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let blocker = ctl.submit_action_interrupt(move || {
            release_rx.recv()?;
            Ok(())
        });

        let ran = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&ran);
        let victim = ctl.submit_action_interrupt(move || {
            r.store(true, Ordering::SeqCst);
            Ok(())
        });
        victim.cancel();
        assert!(victim.is_canceled());

        release_tx.send(()).unwrap();
        assert_eq!(blocker.wait(), Ok(()));
        assert_eq!(victim.wait(), Err(ActionError::Canceled));
        assert!(!ran.load(Ordering::SeqCst));
        ctl.halt().unwrap();
    }

    struct Rewindable {
        position: Arc<AtomicU64>,
        restarts: Arc<AtomicUsize>,
        fail_restart: bool,
    }

    impl Activity for Rewindable {
        fn name(&self) -> &str {
            "rewindable"
        }
        fn step(&mut self) -> anyhow::Result<()> {
            self.position.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn restart(&mut self) -> anyhow::Result<()> {
            anyhow::ensure!(!self.fail_restart, "cannot rewind");
            self.restarts.fetch_add(1, Ordering::SeqCst);
            self.position.store(0, Ordering::SeqCst);
            Ok(())
        }
    }

    fn rewindable(fail_restart: bool) -> (Rewindable, Arc<AtomicU64>, Arc<AtomicUsize>) {
        let position = Arc::new(AtomicU64::new(0));
        let restarts = Arc::new(AtomicUsize::new(0));
        let act = Rewindable {
            position: Arc::clone(&position),
            restarts: Arc::clone(&restarts),
            fail_restart,
        };
        (act, position, restarts)
    }

    #[test]
    fn test_restart_resets_step_counter() {
        let ctl = controller();
        let (act, position, restarts) = rewindable(false);
        let handle = ctl.add_activity_with(act, None, 0.0);
        ctl.start().unwrap();
        ctl.unpause().wait().unwrap();
        wait_until(|| handle.steps_completed() >= 3);

        ctl.pause().wait().unwrap();
        assert_eq!(ctl.restart_current_activity().wait(), Ok(()));
        assert_eq!(restarts.load(Ordering::SeqCst), 1);
        assert_eq!(handle.steps_completed(), 0);
        assert_eq!(position.load(Ordering::SeqCst), 0);

        handle.set_max_steps(Some(2));
        ctl.unpause().wait().unwrap();
        assert_eq!(handle.wait(), Ok(()));
        assert_eq!(handle.steps_completed(), 2);
        assert_eq!(position.load(Ordering::SeqCst), 2);
        ctl.halt().unwrap();
    }

    #[test]
    fn test_restart_without_activity() {
        let ctl = controller();
        assert_eq!(
            ctl.restart_current_activity().wait(),
            Err(ActionError::NoActivity)
        );
        ctl.halt().unwrap();
    }

    #[test]
    fn test_failing_restart_fails_activity() {
        let ctl = controller();
        let (act, _, _) = rewindable(true);
        let handle = ctl.add_activity_with(act, None, 0.0);
        ctl.start().unwrap();
        wait_until(|| handle.state() == ActivityState::Paused);

        assert_eq!(
            ctl.restart_current_activity().wait(),
            Err(ActionError::Failed {
                error: "cannot rewind".into()
            })
        );
        assert_eq!(
            handle.wait(),
            Err(ActivityError::Restart {
                error: "cannot rewind".into()
            })
        );
        ctl.halt().unwrap();
    }

    #[test]
    fn test_failed_restart_keeps_rest_of_burst() {
        let ctl = controller();
        let (gate_tx, gate_rx) = mpsc::channel();
        let stuck = ctl.add_activity_with(Gated { gate: gate_rx }, None, 0.0);
        let mut events = ctl.events();
        ctl.start().unwrap();
        ctl.unpause().wait().unwrap();
        wait_until(|| ctl.is_running_activity_step());

        // All of these land in one burst behind the blocked step.
        let restart = ctl.restart_current_activity();
        let (act, count) = counter("after");
        let after = ctl.add_activity_with(act, Some(2), 0.0);
        let tagged = ctl.submit_action_interrupt(|| Ok(7));
        let halting = {
            let ctl = Arc::clone(&ctl);
            thread::spawn(move || ctl.halt())
        };
        wait_for_event(&mut events, EventKind::HaltRequested);
        gate_tx.send(()).unwrap();

        halting.join().unwrap().unwrap();
        assert_eq!(
            restart.wait(),
            Err(ActionError::Failed {
                error: "cannot rewind".into()
            })
        );
        assert_eq!(
            stuck.wait(),
            Err(ActivityError::Restart {
                error: "cannot rewind".into()
            })
        );
        assert_eq!(tagged.wait(), Ok(7));
        assert_eq!(after.wait(), Ok(()));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_activity_does_not_stop_queue() {
        let ctl = controller();
        let calls = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&calls);
        let broken = ctl.add_activity_with(
            ActivityFn::new("broken", move || {
                if c.fetch_add(1, Ordering::SeqCst) == 2 {
                    anyhow::bail!("nan energy");
                }
                Ok(())
            }),
            Some(10),
            0.0,
        );
        let exploding = ctl.add_activity_with(
            ActivityFn::new("exploding", || panic!("segfault")),
            Some(1),
            0.0,
        );
        let (act, count) = counter("healthy");
        let healthy = ctl.add_activity_with(act, Some(3), 0.0);

        ctl.halt().unwrap();
        assert_eq!(
            broken.wait(),
            Err(ActivityError::Step {
                step: 2,
                error: "nan energy".into()
            })
        );
        assert_eq!(
            exploding.wait(),
            Err(ActivityError::Panicked {
                info: "segfault".into()
            })
        );
        assert_eq!(healthy.wait(), Ok(()));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_sequential_action_keeps_fifo_slot() {
        let ctl = controller();
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let first = ctl.add_activity_with(
            Recorder {
                name: "a",
                log: Arc::clone(&log),
            },
            Some(1),
            0.0,
        );
        let l = Arc::clone(&log);
        let seq = ctl.add_action_sequential(move || {
            l.lock().unwrap().push("seq".into());
            Ok(())
        });
        let last = ctl.add_activity_with(
            Recorder {
                name: "b",
                log: Arc::clone(&log),
            },
            Some(1),
            0.0,
        );
        assert_eq!(seq.name(), "sequential-action");

        ctl.complete_activities().unwrap();
        for h in [&first, &seq, &last] {
            assert_eq!(h.outcome(), Some(Ok(())));
        }
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:pre", "a:step", "a:post", "seq", "b:pre", "b:step", "b:post"]
        );
    }

    #[test]
    fn test_halt_completes_queue_and_rejects_afterwards() {
        let ctl = controller();
        let (act, count) = counter("queued");
        let handle = ctl.add_activity_with(act, Some(4), 0.0);
        assert_eq!(handle.state(), ActivityState::Queued);

        ctl.halt().unwrap();
        assert_eq!(handle.outcome(), Some(Ok(())));
        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert!(!ctl.is_paused());

        ctl.halt().unwrap();
        let (late, late_count) = counter("late");
        let rejected = ctl.add_activity(late);
        assert!(matches!(
            rejected.outcome(),
            Some(Err(ActivityError::Rejected { .. }))
        ));
        assert_eq!(late_count.load(Ordering::SeqCst), 0);
        assert_eq!(
            ctl.submit_action_interrupt(|| Ok(())).wait(),
            Err(ActionError::Closed)
        );
    }

    #[test]
    fn test_halt_from_worker_is_refused() {
        let ctl = controller();
        let inner = Arc::clone(&ctl);
        let refused = ctl.submit_action_interrupt(move || {
            Ok(matches!(inner.halt(), Err(ControllerError::HaltFromWorker)))
        });
        assert_eq!(refused.wait(), Ok(true));
        ctl.halt().unwrap();
    }

    #[test]
    fn test_second_halt_waits_for_first() {
        let ctl = controller();
        let (gate_tx, gate_rx) = mpsc::channel();
        let handle = ctl.add_activity_with(Gated { gate: gate_rx }, Some(1), 0.0);
        let mut events = ctl.events();
        ctl.start().unwrap();
        ctl.unpause().wait().unwrap();
        wait_until(|| ctl.is_running_activity_step());

        let first = {
            let ctl = Arc::clone(&ctl);
            thread::spawn(move || ctl.halt())
        };
        wait_for_event(&mut events, EventKind::HaltRequested);

        let (done_tx, done_rx) = mpsc::channel();
        let second = {
            let ctl = Arc::clone(&ctl);
            let handle = handle.clone();
            thread::spawn(move || {
                let res = ctl.halt();
                done_tx.send(handle.is_finished()).unwrap();
                res
            })
        };
        assert!(done_rx.recv_timeout(Duration::from_millis(50)).is_err());

        gate_tx.send(()).unwrap();
        assert!(done_rx.recv_timeout(Duration::from_secs(5)).unwrap());
        first.join().unwrap().unwrap();
        second.join().unwrap().unwrap();
        assert_eq!(handle.outcome(), Some(Ok(())));
    }

    #[test]
    fn test_pause_controls_without_worker() {
        let ctl = controller();
        assert!(ctl.is_paused());
        let mut woke = ctl.unpause();
        assert_eq!(woke.try_result(), Some(Ok(())));
        assert!(!ctl.is_paused());

        assert_eq!(ctl.toggle().wait(), Ok(()));
        assert!(ctl.is_paused());
        assert_eq!(ctl.toggle().wait(), Ok(()));
        assert!(!ctl.is_paused());
        ctl.halt().unwrap();
    }

    #[test]
    fn test_blocking_run_uses_caller_thread() {
        let ctl = controller();
        let caller = thread::current().id();
        let on_caller = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&on_caller);
        let steps = Arc::new(AtomicU64::new(0));
        let s = Arc::clone(&steps);

        ctl.unpause().wait().unwrap();
        let result = ctl.run_activity_blocking_with(
            ActivityFn::new("batch", move || {
                if thread::current().id() != caller {
                    flag.store(false, Ordering::SeqCst);
                }
                s.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            Some(4),
            0.0,
        );
        assert_eq!(result, Ok(()));
        assert_eq!(steps.load(Ordering::SeqCst), 4);
        assert!(on_caller.load(Ordering::SeqCst));

        let (act, count) = counter("after");
        let handle = ctl.add_activity_with(act, Some(2), 0.0);
        ctl.halt().unwrap();
        assert_eq!(handle.outcome(), Some(Ok(())));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_blocking_run_rejects_mixing_with_worker() {
        let ctl = controller();
        ctl.start().unwrap();
        let (act, count) = counter("late-batch");
        let result = ctl.run_activity_blocking_with(act, Some(1), 0.0);
        assert!(matches!(result, Err(ActivityError::Rejected { .. })));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let inner = controller();
        let nested = Arc::clone(&inner);
        let (tx, rx) = mpsc::channel();
        inner.unpause().wait().unwrap();
        let result = inner.run_activity_blocking_with(
            ActivityFn::new("nested-start", move || {
                tx.send(matches!(
                    nested.start(),
                    Err(ControllerError::BlockingRunActive)
                ))?;
                Ok(())
            }),
            Some(1),
            0.0,
        );
        assert_eq!(result, Ok(()));
        assert!(rx.recv().unwrap());

        ctl.halt().unwrap();
        inner.halt().unwrap();
    }

    #[test]
    fn test_drop_rejects_pending_and_interrupts_running() {
        let ctl = controller();
        let (act, _) = counter("never");
        let pending = ctl.add_activity(act);
        drop(ctl);
        assert!(matches!(
            pending.wait(),
            Err(ActivityError::Rejected { .. })
        ));

        let ctl = controller();
        let (act, _) = counter("parked");
        let running = ctl.add_activity(act);
        ctl.start().unwrap();
        wait_until(|| running.state() == ActivityState::Paused);
        drop(ctl);
        assert_eq!(running.wait(), Err(ActivityError::Interrupted));
    }

    #[test]
    fn test_events_follow_activity_lifecycle() {
        let ctl = controller();
        let mut rx = ctl.events();
        let (act, _) = counter("observed");
        ctl.add_activity_with(act, Some(2), 0.0);
        ctl.halt().unwrap();

        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        let pos = |kind: EventKind| events.iter().position(|ev| ev.kind == kind).unwrap();

        assert_eq!(events.first().map(|ev| ev.kind), Some(EventKind::ActivityQueued));
        assert_eq!(events.last().map(|ev| ev.kind), Some(EventKind::Halted));
        assert!(pos(EventKind::ControllerStarted) < pos(EventKind::ActivityStarting));
        assert!(pos(EventKind::ActivityStarting) < pos(EventKind::ActivityCompleted));
        assert!(pos(EventKind::HaltRequested) < pos(EventKind::Halted));

        let completed = &events[pos(EventKind::ActivityCompleted)];
        assert_eq!(completed.activity.as_deref(), Some("observed"));
        assert_eq!(completed.steps, Some(2));
    }

    struct Collect(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Collect {
        async fn on_event(&self, ev: &Event) {
            self.0.lock().unwrap().push(ev.kind);
        }
        fn name(&self) -> &'static str {
            "collect"
        }
    }

    #[test]
    fn test_subscribers_see_every_event_before_halt_returns() {
        let collect = Arc::new(Collect(Mutex::new(Vec::new())));
        let subs: Vec<Arc<dyn Subscribe>> = vec![collect.clone()];
        let ctl = Controller::builder(ControllerConfig::default())
            .with_subscribers(subs)
            .build();

        let (act, _) = counter("watched");
        ctl.add_activity_with(act, Some(1), 0.0);
        ctl.halt().unwrap();

        let seen = collect.0.lock().unwrap();
        assert_eq!(seen.first(), Some(&EventKind::ActivityQueued));
        assert_eq!(seen.last(), Some(&EventKind::Halted));
        assert!(seen.contains(&EventKind::ActivityCompleted));
    }
}
