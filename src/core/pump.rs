//! # Event pump: the events thread.
//!
//! Subscribers are async, the controller is not. The pump owns one thread running a
//! current-thread tokio runtime. It reads the [`Bus`] and hands every event to one
//! outlet per subscriber: a bounded queue drained by that subscriber's own task.
//!
//! ```text
//! Bus ──► pump loop ─┬─► outlet "log"     [queue] ──► task ──► on_event()
//!                    ├─► outlet "metrics" [queue] ──► task ──► on_event()
//!                    └─► ...
//!
//! stop(): drain the bus, close every queue, await every task
//! ```
//!
//! ## Rules
//! - Per-subscriber FIFO; no ordering between subscribers.
//! - Events a subscriber does not [`accept`](Subscribe::accepts) are never queued for it.
//! - A full queue (or a pump lagging behind the bus) drops events for that subscriber
//!   only. Drops are counted and reported as one `SubscriberOverflow` once the queue
//!   accepts an event again.
//! - A panic in `on_event` is published as `SubscriberPanicked`; the task keeps serving.
//! - `stop()` returns after every event published before it was handed to its
//!   subscribers, so `halt()` callers know `Halted` was seen.
//!
//! Events are subscribed to before the thread starts, so nothing published after
//! `spawn` returns is missed.

use std::io;
use std::mem;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use futures::FutureExt;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::mpsc;
use tokio::task;
use tokio_util::sync::CancellationToken;

use crate::error::panic_info;
use crate::events::{Bus, Event};
use crate::subscribers::Subscribe;

/// One subscriber's queue and delivery task.
struct Outlet {
    sub: Arc<dyn Subscribe>,
    tx: mpsc::Sender<Arc<Event>>,
    task: task::JoinHandle<()>,
    /// Drops since the last successful enqueue.
    dropped: u64,
}

impl Outlet {
    /// Spawns the delivery task; must be called inside the pump's runtime.
    fn open(sub: Arc<dyn Subscribe>, bus: Bus) -> Self {
        let (tx, mut rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));
        let receiver = Arc::clone(&sub);

        let task = tokio::spawn(async move {
            let name = receiver.name();
            while let Some(ev) = rx.recv().await {
                let delivery = AssertUnwindSafe(receiver.on_event(ev.as_ref())).catch_unwind();
                if let Err(payload) = delivery.await {
                    let info = panic_info(payload);
                    tracing::warn!(subscriber = name, %info, "subscriber panicked");
                    bus.publish(Event::subscriber_panicked(name, info));
                }
            }
        });

        Self {
            sub,
            tx,
            task,
            dropped: 0,
        }
    }

    fn deliver(&mut self, ev: &Arc<Event>, bus: &Bus) {
        if !self.sub.accepts(ev.kind) {
            return;
        }
        if self.tx.try_send(Arc::clone(ev)).is_err() {
            self.dropped += 1;
            return;
        }
        if self.dropped > 0 {
            let dropped = mem::take(&mut self.dropped);
            tracing::warn!(subscriber = self.sub.name(), dropped, "subscriber dropped events");
            bus.publish(Event::subscriber_overflow(self.sub.name(), dropped));
        }
    }

    /// Closes the queue and waits until the task handled everything in it.
    async fn close(self) {
        let name = self.sub.name();
        if self.dropped > 0 {
            tracing::warn!(subscriber = name, dropped = self.dropped, "events dropped at shutdown");
        }
        drop(self.tx);
        if self.task.await.is_err() {
            tracing::error!(subscriber = name, "subscriber task aborted");
        }
    }
}

fn fan_out(outlets: &mut [Outlet], ev: Event, bus: &Bus) {
    let ev = Arc::new(ev);
    for outlet in outlets {
        outlet.deliver(&ev, bus);
    }
}

pub(crate) struct EventPump {
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl EventPump {
    pub(crate) fn spawn(
        name: String,
        subscribers: Vec<Arc<dyn Subscribe>>,
        bus: Bus,
    ) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let token = CancellationToken::new();
        let mut rx = bus.subscribe();
        let cancel = token.clone();

        let join = thread::Builder::new().name(name).spawn(move || {
            runtime.block_on(async move {
                let mut outlets: Vec<Outlet> = subscribers
                    .into_iter()
                    .map(|sub| Outlet::open(sub, bus.clone()))
                    .collect();

                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        msg = rx.recv() => match msg {
                            Ok(ev) => fan_out(&mut outlets, ev, &bus),
                            Err(RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped, "event pump lagged behind the bus");
                                for outlet in &mut outlets {
                                    outlet.dropped += skipped;
                                }
                            }
                            Err(RecvError::Closed) => break,
                        },
                    }
                }

                loop {
                    match rx.try_recv() {
                        Ok(ev) => fan_out(&mut outlets, ev, &bus),
                        Err(TryRecvError::Lagged(skipped)) => {
                            for outlet in &mut outlets {
                                outlet.dropped += skipped;
                            }
                        }
                        Err(_) => break,
                    }
                }
                for outlet in outlets {
                    outlet.close().await;
                }
            });
        })?;

        Ok(Self {
            token,
            join: Some(join),
        })
    }

    /// Flushes buffered events to subscribers and waits for them to finish.
    pub(crate) fn stop(mut self) {
        self.token.cancel();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::error!("event pump thread panicked");
            }
        }
    }
}

impl Drop for EventPump {
    /// Signals the pump without waiting for it.
    fn drop(&mut self) {
        self.token.cancel();
    }
}
