//! Runtime core: controller facade, worker and checkpoint engine.
//!
//! The public API from this module is [`Controller`] (plus its builder and the
//! [`ActionHandle`] returned by action submission). Everything else is internal:
//! - `worker`: single consumer of the mailbox; runs activities FIFO and idle actions;
//! - `checkpoint`: the safe point between steps (actions, pause flag, one step, pacing);
//! - `mailbox`: the unbounded action/activity queue and its message types;
//! - `action`: one-shot actions with cancel flags;
//! - `pacing`: fractional sleep carryover;
//! - `shared`: pause and in-step flags handed to whichever thread runs an activity;
//! - `pump`: events thread forwarding the bus to subscribers.

mod action;
mod builder;
mod checkpoint;
mod controller;
mod mailbox;
mod pacing;
mod pump;
mod shared;
mod worker;

pub use action::ActionHandle;
pub use builder::ControllerBuilder;
pub use controller::Controller;
