//! # LogWriter — tracing-backed event writer
//!
//! A minimal subscriber that renders incoming [`Event`]s as `tracing` records.
//! Use it for tests, demos or as a starting point for your own subscriber.
//!
//! ## Example output (with a fmt subscriber installed)
//! ```text
//! INFO simvisor: [queued] activity="md-run"
//! INFO simvisor: [starting] activity="md-run"
//! INFO simvisor: [paused] activity="md-run" steps=120
//! INFO simvisor: [completed] activity="md-run" steps=1000
//! INFO simvisor: [action-failed] action="set-temperature" err="negative temperature"
//! INFO simvisor: [halted]
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let activity = e.activity.as_deref().unwrap_or("-");
        let action = e.action.as_deref().unwrap_or("-");
        let subscriber = e.subscriber.unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::ControllerStarted => tracing::info!("[started]"),
            EventKind::PauseRequested => tracing::info!("[pause-requested]"),
            EventKind::ResumeRequested => tracing::info!("[resume-requested]"),
            EventKind::HaltRequested => tracing::info!("[halt-requested]"),
            EventKind::Halted => tracing::info!("[halted]"),
            EventKind::ActivityQueued => tracing::info!(activity, "[queued]"),
            EventKind::ActivityStarting => tracing::info!(activity, "[starting]"),
            EventKind::ActivityPaused => tracing::info!(activity, steps = e.steps, "[paused]"),
            EventKind::ActivityResumed => tracing::info!(activity, steps = e.steps, "[resumed]"),
            EventKind::ActivityRestarted => {
                tracing::info!(activity, steps = e.steps, "[restarted]")
            }
            EventKind::ActivityCompleted => {
                tracing::info!(activity, steps = e.steps, "[completed]")
            }
            EventKind::ActivityFailed => {
                tracing::info!(activity, steps = e.steps, err = reason, "[failed]")
            }
            EventKind::ActionFailed => tracing::info!(action, err = reason, "[action-failed]"),
            EventKind::ActionCanceled => tracing::info!(action, "[action-canceled]"),
            EventKind::SubscriberOverflow => {
                tracing::info!(subscriber, reason, "[subscriber-overflow]")
            }
            EventKind::SubscriberPanicked => {
                tracing::info!(subscriber, info = reason, "[subscriber-panicked]")
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
