//! # Observing a controller.
//!
//! [`Subscribe`] is how code outside the simulation watches it: progress bars, metric
//! exporters, a GUI status line. Subscribers never run on the simulation worker; the
//! controller's events thread hands each one its own bounded queue.
//!
//! A subscriber can narrow what it receives with [`Subscribe::accepts`]. Filtering
//! happens before queueing, so a subscriber that only cares about failures is never
//! flooded by pause/resume chatter and never overflows because of it.
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use async_trait::async_trait;
//! use simvisor::{Event, EventKind, Subscribe};
//!
//! #[derive(Default)]
//! struct FailedRuns(AtomicU64);
//!
//! #[async_trait]
//! impl Subscribe for FailedRuns {
//!     async fn on_event(&self, _ev: &Event) {
//!         self.0.fetch_add(1, Ordering::Relaxed);
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "failed-runs"
//!     }
//!
//!     fn accepts(&self, kind: EventKind) -> bool {
//!         kind == EventKind::ActivityFailed
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};

/// Receives controller events on the events thread.
///
/// `on_event` runs inside a current-thread Tokio runtime shared by all subscribers:
/// await instead of blocking. A panic is caught and reported as
/// `EventKind::SubscriberPanicked`; the subscriber keeps receiving events.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event. Events arrive in publication order.
    async fn on_event(&self, event: &Event);

    /// Name used in logs and in `Subscriber*` events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Whether events of this kind should be queued for this subscriber at all.
    fn accepts(&self, kind: EventKind) -> bool {
        let _ = kind;
        true
    }

    /// Queue length before events are dropped for this subscriber (at least 1).
    fn queue_capacity(&self) -> usize {
        1024
    }
}
