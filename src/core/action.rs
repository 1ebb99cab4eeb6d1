//! # One-shot actions and their handles.
//!
//! An [`Action`] is a callback that must run on the worker thread at a safe point.
//! Producers get an [`ActionHandle`] that resolves once the action ran (or was skipped).
//!
//! ## Rules
//! - The cancel flag is checked **just before** execution: a canceled action is
//!   skipped and resolves with [`ActionError::Canceled`]; it never runs.
//! - An executing action cannot be preempted; `cancel()` after dequeue has no effect.
//! - Errors and panics resolve only this action's handle.
//! - If the action is dropped without running (worker gone), the handle resolves
//!   with [`ActionError::Closed`].

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::{ActionError, panic_info};

/// Whether a dequeued call should run or be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    Run,
    Skip,
}

/// What happened to a call, for logs and events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ActionOutcome {
    Done,
    Skipped,
    Failed(String),
}

type Job = Box<dyn FnOnce(Disposition) -> ActionOutcome + Send>;

pub(crate) enum ActionKind {
    /// Arbitrary callback supplied by a producer.
    Call(Job),
    /// Invoke the running activity's `restart` hook.
    Restart(oneshot::Sender<Result<(), ActionError>>),
}

/// Queued one-shot unit of work.
pub(crate) struct Action {
    pub(crate) label: Arc<str>,
    pub(crate) cancel: CancellationToken,
    pub(crate) kind: ActionKind,
}

impl Action {
    /// Wraps a producer callback; the handle receives its return value.
    pub(crate) fn call<F, T>(label: impl Into<Arc<str>>, f: F) -> (Self, ActionHandle<T>)
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let cancel = CancellationToken::new();

        let job = move |disposition: Disposition| {
            let (result, outcome) = match disposition {
                Disposition::Skip => (Err(ActionError::Canceled), ActionOutcome::Skipped),
                Disposition::Run => match panic::catch_unwind(AssertUnwindSafe(f)) {
                    Ok(Ok(value)) => (Ok(value), ActionOutcome::Done),
                    Ok(Err(e)) => {
                        let error = format!("{e:#}");
                        (
                            Err(ActionError::Failed {
                                error: error.clone(),
                            }),
                            ActionOutcome::Failed(error),
                        )
                    }
                    Err(payload) => {
                        let info = panic_info(payload);
                        let outcome = ActionOutcome::Failed(format!("panic: {info}"));
                        (Err(ActionError::Panicked { info }), outcome)
                    }
                },
            };
            let _ = tx.send(result);
            outcome
        };

        let action = Self {
            label: label.into(),
            cancel: cancel.clone(),
            kind: ActionKind::Call(Box::new(job)),
        };
        (action, ActionHandle { rx, cancel })
    }

    /// Requests a restart of whichever activity is running when this is dequeued.
    pub(crate) fn restart() -> (Self, ActionHandle<()>) {
        let (tx, rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let action = Self {
            label: Arc::from("restart"),
            cancel: cancel.clone(),
            kind: ActionKind::Restart(tx),
        };
        (action, ActionHandle { rx, cancel })
    }

    /// `Skip` if the action was canceled before dequeue.
    pub(crate) fn disposition(&self) -> Disposition {
        if self.cancel.is_cancelled() {
            Disposition::Skip
        } else {
            Disposition::Run
        }
    }
}

/// Completion handle of a submitted action.
///
/// Resolve it with [`wait`](ActionHandle::wait) from a plain thread, or `.await` it from
/// async code. Dropping the handle does not cancel the action.
///
/// ## Example
/// ```rust
/// use simvisor::{ActionError, Controller, ControllerConfig};
///
/// let ctl = Controller::new(ControllerConfig::default());
/// let answer = ctl.submit_action_interrupt(|| Ok(6 * 7));
/// assert_eq!(answer.wait(), Ok(42));
///
/// let failing = ctl.submit_action_interrupt(|| -> anyhow::Result<()> { anyhow::bail!("nope") });
/// assert!(matches!(failing.wait(), Err(ActionError::Failed { .. })));
/// ```
#[must_use = "an action handle carries the action's result"]
pub struct ActionHandle<T> {
    rx: oneshot::Receiver<Result<T, ActionError>>,
    cancel: CancellationToken,
}

impl<T> ActionHandle<T> {
    /// Returns a handle that is already resolved.
    pub(crate) fn ready(result: Result<T, ActionError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self {
            rx,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancels the action if it has not been dequeued yet.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once [`cancel`](Self::cancel) was called.
    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Non-blocking check for the result.
    pub fn try_result(&mut self) -> Option<Result<T, ActionError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(ActionError::Closed)),
        }
    }

    /// Blocks the calling thread until the action resolves.
    pub fn wait(self) -> Result<T, ActionError> {
        futures::executor::block_on(self)
    }
}

impl<T> Future for ActionHandle<T> {
    type Output = Result<T, ActionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ActionError::Closed)))
    }
}

impl<T> std::fmt::Debug for ActionHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionHandle")
            .field("canceled", &self.is_canceled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(action: Action) -> ActionOutcome {
        let disposition = action.disposition();
        match action.kind {
            ActionKind::Call(job) => job(disposition),
            ActionKind::Restart(_) => unreachable!("call actions only"),
        }
    }

    #[test]
    fn test_canceled_action_is_skipped() {
        let (action, handle) = Action::call("never", || -> anyhow::Result<()> {
            panic!("must not run");
        });
        handle.cancel();
        assert_eq!(run(action), ActionOutcome::Skipped);
        assert_eq!(handle.wait(), Err(ActionError::Canceled));
    }

    #[test]
    fn test_error_and_panic_are_isolated() {
        let (failing, failing_handle) =
            Action::call("fail", || -> anyhow::Result<u8> { anyhow::bail!("bad input") });
        let (panicking, panicking_handle) =
            Action::call("panic", || -> anyhow::Result<u8> { panic!("kaboom") });

        assert_eq!(run(failing), ActionOutcome::Failed("bad input".into()));
        assert_eq!(run(panicking), ActionOutcome::Failed("panic: kaboom".into()));
        assert_eq!(
            failing_handle.wait(),
            Err(ActionError::Failed {
                error: "bad input".into()
            })
        );
        assert_eq!(
            panicking_handle.wait(),
            Err(ActionError::Panicked {
                info: "kaboom".into()
            })
        );
    }

    #[test]
    fn test_dropped_action_resolves_closed() {
        let (action, mut handle) = Action::call("dropped", || Ok(1));
        assert!(handle.try_result().is_none());
        drop(action);
        assert_eq!(handle.try_result(), Some(Err(ActionError::Closed)));
    }

    #[tokio::test]
    async fn test_handle_is_awaitable() {
        let (action, handle) = Action::call("value", || Ok("ok"));
        assert_eq!(run(action), ActionOutcome::Done);
        assert_eq!(handle.await, Ok("ok"));
    }
}
