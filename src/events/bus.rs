//! # The controller's event channel.
//!
//! Everything that happens to a controller is published once on its [`Bus`]: the
//! facade (start, pause requests, halt), the worker (activity lifecycle, failed
//! actions) and the event pump (subscriber trouble). Receivers are the event pump and
//! any `Controller::events()` caller.
//!
//! Publishing never blocks, so the simulation worker never waits on an observer. A
//! receiver that falls more than `bus_capacity` events behind loses the oldest ones
//! (`RecvError::Lagged`); the pump turns that into per-subscriber overflow reports.

use tokio::sync::broadcast;

use super::event::Event;

#[derive(Clone, Debug)]
pub(crate) struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub(crate) fn publish(&self, ev: Event) {
        tracing::trace!(seq = ev.seq, kind = ?ev.kind, "event");
        let _ = self.tx.send(ev);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
