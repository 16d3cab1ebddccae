//! Reconciliation loop primitives.
//!
//! This library provides the building blocks of a level-triggered controller
//! that converges desired state to actual state. Key concepts:
//!
//! - **Reconcile key**: stable identity of the object a pass works on.
//! - **Action**: what a successful pass asks of the scheduler (done,
//!   requeue, requeue after a delay).
//! - **Disposition**: how a failed pass is retried (surfaced, quiet or
//!   terminal).
//! - **Tracker**: which keys must run again when a referenced object changes.
//! - **Conditions**: tri-state status fields rolled up into one aggregate.
//!
//! # Invariants
//!
//! - A key is reconciled by at most one worker at a time
//! - Failed keys back off exponentially, capped; success resets the backoff
//! - Terminal failures are reported once and never retried automatically

use std::time::Duration;

pub mod action;
pub mod backoff;
pub mod conditions;
pub mod dispatch;
pub mod queue;
pub mod tracker;

pub use action::{Action, Disposition, ErrorPolicy, Outcome};
pub use backoff::{BackoffPolicy, RetryTracker};
pub use conditions::{Condition, ConditionManager, ConditionSet, ConditionStatus};
pub use dispatch::{Dispatcher, DispatcherConfig, Reconciler};
pub use queue::WorkQueue;
pub use tracker::{Tracker, TrackingSession};

/// Default interval between full resyncs of every primary object.
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of reconcile workers.
pub const DEFAULT_WORKERS: usize = 2;
