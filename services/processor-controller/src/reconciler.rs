//! The Processor reconciler.
//!
//! One pass reads a Processor, resolves its Function and Streams (recording
//! dependency edges as it goes), converges the owned Workload and writes
//! the derived status back. Nothing is kept between passes except the
//! dependency edges in the tracker.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use procon_id::{FunctionKey, ObjectKey, ProcessorKey, ResourceKind, StreamKey, WorkloadKey};
use procon_reconcile::{Action, Outcome, Reconciler, Tracker, TrackingSession};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::api::{Function, Processor, ProcessorStatus, Resource, Workload, WorkloadSpec};
use crate::diff::diff;
use crate::error::{DependencyKey, ReconcileError, ReconcileResult};
use crate::materialize::{workload_name, Materializer, ResolvedStream};
use crate::store::{StoreError, Stores};

/// Dependency edges: referenced object → processors that read it.
pub type DependencyTracker = Tracker<ObjectKey, ProcessorKey>;

type Session<'a> = TrackingSession<'a, ObjectKey, ProcessorKey>;

/// The kinds a controller must watch to drive this reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRegistration {
    /// Changes enqueue the object's own key.
    pub primary: ResourceKind,

    /// Changes enqueue the controlling owner.
    pub owned: Vec<ResourceKind>,

    /// Changes enqueue every dependent recorded in the tracker.
    pub tracked: Vec<ResourceKind>,
}

/// Converges Processors into Workloads.
pub struct ProcessorReconciler {
    stores: Stores,
    tracker: Arc<DependencyTracker>,
    materializer: Materializer,
}

impl ProcessorReconciler {
    pub fn new(stores: Stores, tracker: Arc<DependencyTracker>, materializer: Materializer) -> Self {
        Self {
            stores,
            tracker,
            materializer,
        }
    }

    /// Declares which kinds feed this reconciler and how.
    pub fn registration() -> WatchRegistration {
        WatchRegistration {
            primary: ResourceKind::Processor,
            owned: vec![ResourceKind::Workload],
            tracked: vec![
                ResourceKind::Function,
                ResourceKind::Stream,
                ResourceKind::Workload,
            ],
        }
    }

    pub fn tracker(&self) -> &Arc<DependencyTracker> {
        &self.tracker
    }

    /// Runs one pass and flattens the result into an [`Outcome`].
    pub async fn outcome(&self, key: &ProcessorKey) -> Outcome<ReconcileError> {
        Outcome::from_result(self.reconcile_processor(key).await)
    }

    /// Runs one pass for `key`.
    #[instrument(skip(self), fields(processor = %key))]
    pub async fn reconcile_processor(&self, key: &ProcessorKey) -> ReconcileResult<Action> {
        let original = match self.stores.processors.get(key).await {
            Ok(processor) => processor,
            Err(e) if e.is_not_found() => {
                debug!("Processor no longer exists, forgetting dependencies");
                self.tracker.forget(key);
                return Ok(Action::done());
            }
            Err(e) => return Err(e.into()),
        };

        if original.metadata.is_deleting() {
            debug!("Processor is being deleted");
            return Ok(Action::done());
        }

        let mut processor = original.clone();
        processor.set_defaults();

        let result = self.converge(&mut processor).await;

        processor
            .status
            .carry_transition_times(&original.status);
        if processor.status != original.status {
            self.stores
                .processors
                .update_status(&processor)
                .await
                .map_err(|source| ReconcileError::StatusWrite {
                    processor: key.clone(),
                    source,
                })?;
            debug!(ready = processor.status.is_ready(), "Processor status updated");
        }

        result
    }

    async fn converge(&self, processor: &mut Processor) -> ReconcileResult<Action> {
        processor.status.initialize_conditions();
        processor.status.clear_stream_addresses();

        let function_key = processor.function_key();
        let input_keys = processor.input_keys();
        let output_keys = processor.output_keys();

        let mut session = self.tracker.session(processor.key());
        let function = self
            .resolve_function(&function_key, &mut processor.status, &mut session)
            .await?;
        let inputs = self
            .resolve_streams(&input_keys, &mut processor.status, &mut session)
            .await?;
        let outputs = self
            .resolve_streams(&output_keys, &mut processor.status, &mut session)
            .await?;

        // Tracked as well as owned: a workload this processor does not
        // control still has to wake it when it changes or goes away.
        let workload_key =
            WorkloadKey::new(processor.metadata.namespace.clone(), workload_name(processor));
        session.track(workload_key.object_key());
        session.commit();

        processor.status.mark_streams_ready();
        processor.status.set_stream_addresses(&inputs, &outputs);

        let existing = match self.stores.workloads.get(&workload_key).await {
            Ok(workload) => Some(workload),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                processor.status.mark_deployment_failed(&e);
                return Err(e.into());
            }
        };

        if let Some(existing) = &existing {
            if !existing.metadata.is_controlled_by(&processor.metadata) {
                processor
                    .status
                    .mark_deployment_not_owned(workload_key.name());
                return Err(ReconcileError::OwnershipConflict {
                    processor: processor.key(),
                    workload: workload_key,
                });
            }
        }

        let desired = match self
            .materializer
            .materialize(processor, &function, &inputs, &outputs)
        {
            Ok(desired) => desired,
            Err(e) => {
                processor.status.mark_deployment_failed(&e);
                return Err(e.into());
            }
        };

        match desired {
            Some(desired) => {
                let workload = match self.apply_workload(desired, existing).await {
                    Ok(workload) => workload,
                    Err(e) => {
                        processor.status.mark_deployment_failed(&e);
                        return Err(e.into());
                    }
                };
                processor.status.deployment_name = workload.metadata.name.clone();
                processor.status.propagate_workload_status(&workload);
            }
            None => {
                debug!(function = %function_key, "Function has no image yet");
                processor.status.mark_image_pending(&function_key);
            }
        }

        processor.status.observed_generation = processor.metadata.generation;
        Ok(Action::done())
    }

    async fn resolve_function(
        &self,
        key: &FunctionKey,
        status: &mut ProcessorStatus,
        session: &mut Session<'_>,
    ) -> ReconcileResult<Function> {
        session.track(key.object_key());

        match self.stores.functions.get(key).await {
            Ok(function) => {
                status.propagate_function_status(&function.status);
                Ok(function)
            }
            Err(e) if e.is_not_found() => {
                status.mark_function_not_found(key);
                Err(ReconcileError::DependencyNotFound(DependencyKey::Function(
                    key.clone(),
                )))
            }
            Err(e) => {
                status.mark_function_resolve_failed(key, &e);
                Err(e.into())
            }
        }
    }

    /// Resolves streams in order. The first failure aborts the whole list.
    async fn resolve_streams(
        &self,
        keys: &[StreamKey],
        status: &mut ProcessorStatus,
        session: &mut Session<'_>,
    ) -> ReconcileResult<Vec<ResolvedStream>> {
        let mut resolved = Vec::with_capacity(keys.len());

        for key in keys {
            session.track(key.object_key());

            let stream = match self.stores.streams.get(key).await {
                Ok(stream) => stream,
                Err(e) if e.is_not_found() => {
                    status.mark_stream_not_found(key);
                    return Err(ReconcileError::DependencyNotFound(DependencyKey::Stream(
                        key.clone(),
                    )));
                }
                Err(e) => {
                    status.mark_stream_resolve_failed(key, &e);
                    return Err(e.into());
                }
            };

            let Some(address) = stream.status.address.clone() else {
                status.mark_stream_not_ready(key);
                return Err(ReconcileError::StreamNotReady(key.clone()));
            };

            resolved.push(ResolvedStream {
                key: key.clone(),
                address,
                content_type: stream.spec.effective_content_type().to_string(),
            });
        }

        Ok(resolved)
    }

    /// Creates or updates the workload so it matches `desired`.
    ///
    /// The existing replica count always wins, and only spec and labels are
    /// written; every other metadata field of the stored object is kept.
    async fn apply_workload(
        &self,
        mut desired: Workload,
        existing: Option<Workload>,
    ) -> Result<Workload, StoreError> {
        let Some(existing) = existing else {
            let created = self.stores.workloads.create(&desired).await?;
            info!(workload = %created.key(), "Created workload");
            return Ok(created);
        };

        desired.spec.replicas = existing.spec.replicas;
        if desired.spec == existing.spec && desired.metadata.labels == existing.metadata.labels {
            return Ok(existing);
        }

        match diff(&WorkloadView::of(&desired), &WorkloadView::of(&existing)) {
            Ok(lines) => info!(
                workload = %existing.key(),
                diff = %lines.join("\n"),
                "Reconciling workload diff (-desired, +observed)"
            ),
            Err(e) => warn!(workload = %existing.key(), error = %e, "Failed to diff workload"),
        }

        let mut updated = existing;
        updated.spec = desired.spec;
        updated.metadata.labels = desired.metadata.labels;
        self.stores.workloads.update(&updated).await
    }
}

/// The parts of a workload the reconciler owns.
#[derive(Serialize)]
struct WorkloadView<'a> {
    labels: &'a BTreeMap<String, String>,
    spec: &'a WorkloadSpec,
}

impl<'a> WorkloadView<'a> {
    fn of(workload: &'a Workload) -> Self {
        Self {
            labels: &workload.metadata.labels,
            spec: &workload.spec,
        }
    }
}

#[async_trait]
impl Reconciler for ProcessorReconciler {
    type Key = ProcessorKey;
    type Error = ReconcileError;

    async fn reconcile(&self, key: &ProcessorKey) -> Result<Action, ReconcileError> {
        self.reconcile_processor(key).await
    }
}
