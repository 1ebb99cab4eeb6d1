//! # simvisor
//!
//! **Simvisor** is a single-worker simulation controller for Rust.
//!
//! It runs long-lived, repeatable [`Activity`]s (thousands of Monte Carlo or MD steps)
//! on one dedicated worker thread, while any other thread can pause, resume, inspect
//! and mutate simulation state through a single ordered queue of one-shot actions.
//! Actions only ever run between two steps, so the queue itself is the whole
//! synchronization story: no locks around simulation state.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  GUI / REST handler / test         GUI / REST handler / test
//!        │ add_activity                    │ submit_action_interrupt
//!        │ start / halt                    │ pause / unpause / toggle
//!        ▼                                 ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Controller (facade)                                              │
//! │  - pending FIFO (activities before start)                         │
//! │  - pause flag (starts TRUE) + in-step flag                        │
//! │  - mailbox: one unbounded FIFO for actions, activities, shutdown  │
//! │  - event bus (broadcast)                                          │
//! └──────┬───────────────────────────────────────────────────┬────────┘
//!        ▼                                                   │
//! ┌──────────────────────────────┐                           │
//! │ worker thread                │                           │
//! │  idle: run actions at once   │      publishes events     │
//! │  activity:                   │ ───────────────────────►  │
//! │    pre_activity              │                           ▼
//! │    loop { checkpoint; step } │              ┌────────────────────────┐
//! │    post_activity             │              │ events thread          │
//! └──────────────────────────────┘              │ bus ─► outlet per sub  │
//!                                               │   ├─► LogWriter        │
//!                                               │   └─► custom Subscribe │
//!                                               └────────────────────────┘
//! ```
//!
//! ### Checkpoint
//! ```text
//! loop {
//!   ├─► budget exhausted? ─► post_activity, resolve handle
//!   ├─► while paused: take ONE action (blocking), run it
//!   ├─► drain queued actions (non-blocking), run them in FIFO order
//!   ├─► paused by one of them? ─► back to the top, no step
//!   ├─► step() once (never preempted)
//!   └─► sleep floor(carryover) ms (fractional pacing)
//! }
//! ```
//!
//! ## Features
//! | Area              | Description                                                        | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------------|---------------------------------------------|
//! | **Controller**    | Queue activities, pause/resume, inject actions, halt.              | [`Controller`], [`ControllerBuilder`]       |
//! | **Activities**    | Callback-owned loop: pre / step / post / restart.                  | [`Activity`], [`ActivityFn`]                |
//! | **Handles**       | Live step budget and pacing, state, completion result.             | [`ActivityHandle`], [`ActionHandle`]        |
//! | **Subscriber API**| Hook into lifecycle events (logging, metrics, custom subscribers). | [`Subscribe`], [`Event`], [`EventKind`]     |
//! | **Errors**        | Typed errors for actions, activities and the controller.          | [`ActionError`], [`ActivityError`], [`ControllerError`] |
//! | **Configuration** | Centralize controller settings.                                    | [`ControllerConfig`]                        |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicI64, Ordering};
//! use simvisor::{ActivityFn, Controller, ControllerConfig};
//!
//! // Build subscribers (optional)
//! #[cfg(feature = "logging")]
//! let subs: Vec<Arc<dyn simvisor::Subscribe>> = vec![Arc::new(simvisor::LogWriter::new())];
//! #[cfg(not(feature = "logging"))]
//! let subs: Vec<Arc<dyn simvisor::Subscribe>> = Vec::new();
//!
//! let ctl = Controller::builder(ControllerConfig::default())
//!     .with_subscribers(subs)
//!     .build();
//!
//! // Simulation state lives in the activity; actions reach it through the queue.
//! let temperature = Arc::new(AtomicI64::new(300));
//! let t = Arc::clone(&temperature);
//! let md = ctl.add_activity_with(
//!     ActivityFn::new("md", move || {
//!         let _kelvin = t.load(Ordering::Relaxed);
//!         Ok(())
//!     }),
//!     Some(1_000),
//!     0.0,
//! );
//!
//! ctl.start()?;
//! ctl.unpause().wait()?;
//!
//! let t = Arc::clone(&temperature);
//! ctl.submit_action_interrupt(move || {
//!     t.store(350, Ordering::Relaxed);
//!     Ok(())
//! })
//! .wait()?;
//!
//! ctl.halt()?;
//! assert!(md.outcome().is_some_and(|r| r.is_ok()));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
mod activities;
mod config;
mod core;
mod error;
mod events;
mod subscribers;

// ---- Public re-exports ----

pub use activities::{Activity, ActivityFn, ActivityHandle, ActivityState};
pub use config::ControllerConfig;
pub use crate::core::{ActionHandle, Controller, ControllerBuilder};
pub use error::{ActionError, ActivityError, ControllerError};
pub use events::{Event, EventKind};
pub use subscribers::Subscribe;

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
