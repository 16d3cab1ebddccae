//! What a reconcile pass asks of the dispatcher.

use std::time::Duration;

/// Scheduling request returned by a successful reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Action {
    requeue: bool,
    requeue_after: Option<Duration>,
}

impl Action {
    /// Nothing left to do until something changes.
    pub const fn done() -> Self {
        Self {
            requeue: false,
            requeue_after: None,
        }
    }

    /// Run again soon, subject to the key's backoff.
    pub const fn requeue() -> Self {
        Self {
            requeue: true,
            requeue_after: None,
        }
    }

    /// Run again after a fixed delay.
    pub const fn requeue_after(delay: Duration) -> Self {
        Self {
            requeue: true,
            requeue_after: Some(delay),
        }
    }

    /// Returns true if another pass was requested.
    pub const fn is_requeue(&self) -> bool {
        self.requeue
    }

    /// Returns the fixed delay, if one was requested.
    pub const fn delay(&self) -> Option<Duration> {
        self.requeue_after
    }
}

/// How the dispatcher should treat a failed pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Surface the error and retry with backoff.
    Retry,

    /// Retry with backoff without surfacing the error; the condition is
    /// expected to clear on its own (e.g. a dependency not yet created).
    RetryQuiet,

    /// Surface the error and stop retrying; only an outside change can fix it.
    Terminal,
}

impl Disposition {
    /// Returns true if the key should be scheduled again.
    pub fn should_requeue(&self) -> bool {
        !matches!(self, Disposition::Terminal)
    }

    /// Returns true if the error should be reported to operators.
    pub fn is_surfaced(&self) -> bool {
        !matches!(self, Disposition::RetryQuiet)
    }
}

/// Errors that know how the dispatcher should react to them.
pub trait ErrorPolicy {
    /// Classify this error.
    fn disposition(&self) -> Disposition;
}

/// The `(requeue, requeue_after, error)` view of a reconcile result.
#[derive(Debug)]
pub struct Outcome<E> {
    pub requeue: bool,
    pub requeue_after: Option<Duration>,
    pub error: Option<E>,
}

impl<E: ErrorPolicy> Outcome<E> {
    /// Flattens a reconcile result into the tuple contract.
    pub fn from_result(result: Result<Action, E>) -> Self {
        match result {
            Ok(action) => Self {
                requeue: action.is_requeue(),
                requeue_after: action.delay(),
                error: None,
            },
            Err(error) => Self {
                requeue: error.disposition().should_requeue(),
                requeue_after: None,
                error: Some(error),
            },
        }
    }
}
