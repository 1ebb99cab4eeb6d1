//! # Function-backed activities (`ActivityFn`, `OneShot`)
//!
//! [`ActivityFn`] wraps a closure `F: FnMut() -> anyhow::Result<()>` that is called once
//! per step. State that must survive between steps lives in the closure's captures.
//!
//! `OneShot` is the crate-internal activity behind `Controller::add_action_sequential`:
//! it runs an `FnOnce` as its single step.
//!
//! ## Example
//! ```rust
//! use simvisor::{Activity, ActivityFn};
//!
//! let mut energy = 0.0_f64;
//! let mut act = ActivityFn::new("relax", move || {
//!     energy -= 0.5;
//!     Ok(())
//! });
//!
//! assert_eq!(act.name(), "relax");
//! act.step().unwrap();
//! ```

use std::borrow::Cow;

use crate::activities::activity::Activity;

/// Function-backed activity implementation.
pub struct ActivityFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> ActivityFn<F>
where
    F: FnMut() -> anyhow::Result<()> + Send + 'static,
{
    /// Creates a new function-backed activity.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Activity for ActivityFn<F>
where
    F: FnMut() -> anyhow::Result<()> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn step(&mut self) -> anyhow::Result<()> {
        (self.f)()
    }
}

/// Activity whose only step runs a one-shot callback.
pub(crate) struct OneShot<F> {
    f: Option<F>,
}

impl<F> OneShot<F> {
    pub(crate) fn new(f: F) -> Self {
        Self { f: Some(f) }
    }
}

impl<F> Activity for OneShot<F>
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    fn name(&self) -> &str {
        "sequential-action"
    }

    fn step(&mut self) -> anyhow::Result<()> {
        match self.f.take() {
            Some(f) => f(),
            None => Ok(()),
        }
    }

    fn restart(&mut self) -> anyhow::Result<()> {
        anyhow::ensure!(self.f.is_some(), "one-shot action already consumed");
        Ok(())
    }
}
