//! # Activity abstraction.
//!
//! An [`Activity`] is a repeatable unit of simulation work (one MC or MD run).
//! The controller owns the loop; the activity only supplies callbacks:
//!
//! ```text
//! pre_activity()
//! loop {
//!     checkpoint ─► drain actions / honor pause ─► step() ─► sleep pacing
//! } until max_steps reached
//! post_activity()
//!
//! restart() runs between two steps when requested through
//! `Controller::restart_current_activity`.
//! ```
//!
//! Because the scheduler owns the loop, an activity cannot forget to yield:
//! every `step` is bracketed by safe points where actions run.

/// # Repeatable, pausable unit of work.
///
/// All hooks run on the controller's worker thread (or on the caller's thread for
/// `run_activity_blocking`). A hook that returns `Err` or panics fails this activity only.
///
/// # Example
/// ```
/// use simvisor::Activity;
///
/// struct Walker { position: i64 }
///
/// impl Activity for Walker {
///     fn name(&self) -> &str { "walker" }
///
///     fn step(&mut self) -> anyhow::Result<()> {
///         self.position += 1;
///         Ok(())
///     }
///
///     fn restart(&mut self) -> anyhow::Result<()> {
///         self.position = 0;
///         Ok(())
///     }
/// }
/// ```
pub trait Activity: Send + 'static {
    /// Returns a stable, human-readable activity name.
    fn name(&self) -> &str;

    /// Runs once before the first step.
    fn pre_activity(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Advances the simulation by exactly one step. Never preempted.
    fn step(&mut self) -> anyhow::Result<()>;

    /// Runs once after the step budget is exhausted.
    fn post_activity(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Resets the activity to its initial state; called only at a safe point.
    fn restart(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
