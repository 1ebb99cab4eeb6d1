//! Error types used by the simvisor controller, its activities and actions.
//!
//! This module defines three error enums:
//!
//! - [`ActionError`] — failures of a single one-shot action (isolated, never fatal to the worker).
//! - [`ActivityError`] — failures that end one activity (the controller keeps serving the next one).
//! - [`ControllerError`] — failures of the controller facade itself.
//!
//! All of them provide helper methods (`as_label`, `as_message`) for logging/metrics.

use std::any::Any;

use thiserror::Error;

/// # Errors produced while running an action.
///
/// An action failure resolves only that action's [`ActionHandle`](crate::ActionHandle);
/// the checkpoint loop and the enclosing activity continue.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// The action callback returned an error.
    #[error("action failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// The action callback panicked.
    #[error("action panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// The action was canceled before it was dequeued and never executed.
    #[error("action canceled before execution")]
    Canceled,

    /// A restart was requested while no activity was running.
    #[error("no activity is running")]
    NoActivity,

    /// The worker is gone; the action can no longer run.
    #[error("controller closed")]
    Closed,
}

impl ActionError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use simvisor::ActionError;
    ///
    /// assert_eq!(ActionError::Canceled.as_label(), "action_canceled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ActionError::Failed { .. } => "action_failed",
            ActionError::Panicked { .. } => "action_panicked",
            ActionError::Canceled => "action_canceled",
            ActionError::NoActivity => "action_no_activity",
            ActionError::Closed => "action_closed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ActionError::Failed { error } => format!("error: {error}"),
            ActionError::Panicked { info } => format!("panic: {info}"),
            ActionError::Canceled => "canceled before dequeue".to_string(),
            ActionError::NoActivity => "no running activity".to_string(),
            ActionError::Closed => "controller closed".to_string(),
        }
    }
}

/// # Errors that end an activity.
///
/// Every [`ActivityHandle`](crate::ActivityHandle) resolves exactly once; when it
/// resolves with one of these, only that activity stopped. No automatic retry happens.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActivityError {
    /// `pre_activity` or `post_activity` returned an error.
    #[error("{hook} failed: {error}")]
    Hook {
        /// Name of the hook that failed.
        hook: &'static str,
        /// The underlying error message.
        error: String,
    },

    /// A step returned an error.
    #[error("step {step} failed: {error}")]
    Step {
        /// Index of the failing step (0-based, within the current run).
        step: u64,
        /// The underlying error message.
        error: String,
    },

    /// The `restart` hook returned an error.
    #[error("restart failed: {error}")]
    Restart {
        /// The underlying error message.
        error: String,
    },

    /// A step or hook panicked.
    #[error("activity panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// The action queue closed while the activity was waiting on it (or running).
    #[error("interrupted while waiting for actions")]
    Interrupted,

    /// The activity was never run.
    #[error("activity rejected: {reason}")]
    Rejected {
        /// Why the controller refused to run it.
        reason: String,
    },
}

impl ActivityError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use simvisor::ActivityError;
    ///
    /// let err = ActivityError::Step { step: 3, error: "nan energy".into() };
    /// assert_eq!(err.as_label(), "activity_step_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ActivityError::Hook { .. } => "activity_hook_failed",
            ActivityError::Step { .. } => "activity_step_failed",
            ActivityError::Restart { .. } => "activity_restart_failed",
            ActivityError::Panicked { .. } => "activity_panicked",
            ActivityError::Interrupted => "activity_interrupted",
            ActivityError::Rejected { .. } => "activity_rejected",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ActivityError::Hook { hook, error } => format!("{hook}: {error}"),
            ActivityError::Step { step, error } => format!("step {step}: {error}"),
            ActivityError::Restart { error } => format!("restart: {error}"),
            ActivityError::Panicked { info } => format!("panic: {info}"),
            ActivityError::Interrupted => "interrupted".to_string(),
            ActivityError::Rejected { reason } => format!("rejected: {reason}"),
        }
    }

    pub(crate) fn rejected(reason: impl Into<String>) -> Self {
        ActivityError::Rejected {
            reason: reason.into(),
        }
    }
}

/// # Errors produced by the controller facade.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ControllerError {
    /// `run_activity_blocking` currently owns the action queue; the async path must wait.
    #[error("a blocking activity run owns the action queue")]
    BlockingRunActive,

    /// The worker thread could not be spawned.
    #[error("failed to spawn worker thread: {error}")]
    Spawn {
        /// The underlying I/O error.
        #[source]
        error: std::io::Error,
    },

    /// The worker thread panicked outside of activity/action isolation.
    #[error("worker thread panicked")]
    WorkerPanicked,

    /// `halt()` was called from the worker thread, which cannot wait for itself.
    #[error("halt called from the worker thread")]
    HaltFromWorker,
}

impl ControllerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ControllerError::BlockingRunActive => "controller_blocking_run_active",
            ControllerError::Spawn { .. } => "controller_spawn_failed",
            ControllerError::WorkerPanicked => "controller_worker_panicked",
            ControllerError::HaltFromWorker => "controller_halt_from_worker",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ControllerError::BlockingRunActive => "blocking run active".to_string(),
            ControllerError::Spawn { error } => format!("spawn: {error}"),
            ControllerError::WorkerPanicked => "worker panicked".to_string(),
            ControllerError::HaltFromWorker => "halt from worker thread".to_string(),
        }
    }
}

/// Renders a caught panic payload as text.
pub(crate) fn panic_info(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
