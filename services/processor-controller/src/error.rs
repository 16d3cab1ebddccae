//! Reconcile errors and their retry classification.

use procon_id::{FunctionKey, ProcessorKey, StreamKey, WorkloadKey};
use procon_reconcile::{Disposition, ErrorPolicy};
use thiserror::Error;

use crate::materialize::MaterializeError;
use crate::store::StoreError;

/// Result type for reconcile passes.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Why a reconcile pass did not converge.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A referenced function or stream does not exist (yet).
    #[error("dependency not found: {0}")]
    DependencyNotFound(DependencyKey),

    #[error("stream {0} has no address yet")]
    StreamNotReady(StreamKey),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("processor {processor} does not own workload {workload}")]
    OwnershipConflict {
        processor: ProcessorKey,
        workload: WorkloadKey,
    },

    #[error("failed to write status of processor {processor}: {source}")]
    StatusWrite {
        processor: ProcessorKey,
        #[source]
        source: StoreError,
    },

    #[error("failed to materialize workload: {0}")]
    Materialize(#[from] MaterializeError),
}

/// A dependency that could not be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyKey {
    Function(FunctionKey),
    Stream(StreamKey),
}

impl std::fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyKey::Function(key) => write!(f, "function {key}"),
            DependencyKey::Stream(key) => write!(f, "stream {key}"),
        }
    }
}

impl ReconcileError {
    /// Returns true for status writes that lost an optimistic-concurrency
    /// race.
    pub fn is_status_write_conflict(&self) -> bool {
        matches!(self, ReconcileError::StatusWrite { source, .. } if source.is_conflict())
    }
}

impl ErrorPolicy for ReconcileError {
    fn disposition(&self) -> Disposition {
        match self {
            ReconcileError::DependencyNotFound(_) | ReconcileError::StreamNotReady(_) => {
                Disposition::RetryQuiet
            }
            ReconcileError::Store(e) | ReconcileError::StatusWrite { source: e, .. }
                if e.is_conflict() =>
            {
                Disposition::RetryQuiet
            }
            ReconcileError::Store(_) | ReconcileError::StatusWrite { .. } => Disposition::Retry,
            ReconcileError::OwnershipConflict { .. } | ReconcileError::Materialize(_) => {
                Disposition::Terminal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procon_id::{ObjectKey, ResourceKind, ResourceVersion};
    use rstest::rstest;

    fn conflict() -> StoreError {
        StoreError::Conflict {
            key: ObjectKey::new(ResourceKind::Processor, "default", "p1"),
            expected: ResourceVersion::new(1),
            actual: ResourceVersion::new(2),
        }
    }

    #[rstest]
    #[case::function_missing(
        ReconcileError::DependencyNotFound(DependencyKey::Function(FunctionKey::new("default", "f1"))),
        Disposition::RetryQuiet
    )]
    #[case::stream_pending(
        ReconcileError::StreamNotReady(StreamKey::new("default", "in")),
        Disposition::RetryQuiet
    )]
    #[case::store_fault(
        ReconcileError::Store(StoreError::Unavailable("down".to_string())),
        Disposition::Retry
    )]
    #[case::store_conflict(ReconcileError::Store(conflict()), Disposition::RetryQuiet)]
    #[case::status_conflict(
        ReconcileError::StatusWrite { processor: ProcessorKey::new("default", "p1"), source: conflict() },
        Disposition::RetryQuiet
    )]
    #[case::status_fault(
        ReconcileError::StatusWrite {
            processor: ProcessorKey::new("default", "p1"),
            source: StoreError::Unavailable("down".to_string()),
        },
        Disposition::Retry
    )]
    #[case::not_owned(
        ReconcileError::OwnershipConflict {
            processor: ProcessorKey::new("default", "p1"),
            workload: WorkloadKey::new("default", "p1-processor"),
        },
        Disposition::Terminal
    )]
    #[case::cycle(
        ReconcileError::Materialize(MaterializeError::StreamCycle { stream: "s".to_string() }),
        Disposition::Terminal
    )]
    fn test_disposition(#[case] error: ReconcileError, #[case] expected: Disposition) {
        assert_eq!(error.disposition(), expected);
    }

    #[test]
    fn test_status_write_conflict() {
        let error = ReconcileError::StatusWrite {
            processor: ProcessorKey::new("default", "p1"),
            source: conflict(),
        };
        assert!(error.is_status_write_conflict());
        assert!(error.to_string().starts_with("failed to write status of processor default/p1"));
    }

    #[test]
    fn test_dependency_display() {
        let error =
            ReconcileError::DependencyNotFound(DependencyKey::Function(FunctionKey::new("default", "f1")));
        assert_eq!(error.to_string(), "dependency not found: function default/f1");
    }
}
