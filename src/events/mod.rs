//! Runtime events: types and the broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`]: event classification and payload metadata
//! - `Bus`: crate-internal broadcast channel every event goes through
//!
//! ## Quick reference
//! - **Publishers**: `Controller` (start/pause/resume/halt, queued activities), the
//!   worker's activity loop and checkpoint, the event pump (subscriber overflow/panic).
//! - **Consumers**: the event pump feeding subscribers, and `Controller::events()`.

mod bus;
mod event;

pub(crate) use bus::Bus;
pub use event::{Event, EventKind};
