//! Flags shared between the controller facade and whichever thread runs activities.
//!
//! This is the explicit context object handed to the worker (or the caller of
//! `run_activity_blocking`); there is no global state.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::events::Bus;

pub(crate) struct Shared {
    /// Starts `true`: nothing steps until someone unpauses.
    paused: AtomicBool,
    /// True only while a step body executes.
    in_step: AtomicBool,
    pub(crate) bus: Bus,
}

impl Shared {
    pub(crate) fn new(bus: Bus) -> Self {
        Self {
            paused: AtomicBool::new(true),
            in_step: AtomicBool::new(false),
            bus,
        }
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    /// Flips the pause flag; returns the new value.
    pub(crate) fn toggle_paused(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::SeqCst)
    }

    pub(crate) fn in_step(&self) -> bool {
        self.in_step.load(Ordering::SeqCst)
    }

    pub(crate) fn set_in_step(&self, value: bool) {
        self.in_step.store(value, Ordering::SeqCst);
    }
}
