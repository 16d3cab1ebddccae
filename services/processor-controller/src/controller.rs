//! Controller wiring: watches → work queue → dispatcher.
//!
//! Processor events enqueue their own key, Workload events enqueue the
//! controlling Processor, and Function, Stream or Workload events enqueue
//! every Processor the tracker recorded as reading them. A periodic resync lists
//! every Processor so nothing stays stale if a watch event is lost.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use procon_events::WatchEvent;
use procon_id::{ProcessorKey, ResourceKind};
use procon_reconcile::{BackoffPolicy, Dispatcher, DispatcherConfig, WorkQueue};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::api::{LabelSelector, Processor, Resource, Workload};
use crate::materialize::Materializer;
use crate::reconciler::{DependencyTracker, ProcessorReconciler};
use crate::store::{StoreError, Stores};

/// Controller configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of concurrent reconcile workers.
    pub workers: usize,

    /// Backoff for failed keys.
    pub backoff: BackoffPolicy,

    /// Interval between full resyncs.
    pub resync_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: procon_reconcile::DEFAULT_WORKERS,
            backoff: BackoffPolicy::default(),
            resync_interval: procon_reconcile::DEFAULT_RESYNC_INTERVAL,
        }
    }
}

/// Runs the Processor reconciler against a set of stores.
pub struct ProcessorController {
    stores: Stores,
    tracker: Arc<DependencyTracker>,
    dispatcher: Arc<Dispatcher<ProcessorReconciler>>,
    queue: Arc<WorkQueue<ProcessorKey>>,
    resync_interval: Duration,
}

impl ProcessorController {
    pub fn new(stores: Stores, materializer: Materializer, config: ControllerConfig) -> Self {
        let tracker = Arc::new(DependencyTracker::new());
        let reconciler = Arc::new(ProcessorReconciler::new(
            stores.clone(),
            Arc::clone(&tracker),
            materializer,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            reconciler,
            DispatcherConfig {
                workers: config.workers,
                backoff: config.backoff,
            },
        ));
        let queue = dispatcher.queue();

        Self {
            stores,
            tracker,
            dispatcher,
            queue,
            resync_interval: config.resync_interval,
        }
    }

    pub fn queue(&self) -> &Arc<WorkQueue<ProcessorKey>> {
        &self.queue
    }

    pub fn tracker(&self) -> &Arc<DependencyTracker> {
        &self.tracker
    }

    /// A Processor changed: reconcile it. Deletions are reconciled too, so
    /// the pass can drop the processor's dependency edges.
    pub fn on_processor_event(&self, event: &WatchEvent<Processor>) {
        debug!(processor = %event.key, event = %event.event_type, "Processor changed");
        self.queue.add(event.object.key());
    }

    /// A Workload changed: reconcile its controlling Processor and any
    /// Processor that found it in the way.
    pub fn on_workload_event(&self, event: &WatchEvent<Workload>) {
        let meta = &event.object.metadata;
        if let Some(owner) = meta
            .controller()
            .filter(|owner| owner.kind == ResourceKind::Processor)
        {
            let key = ProcessorKey::new(meta.namespace.clone(), owner.name.clone());
            debug!(workload = %event.key, processor = %key, "Owned workload changed");
            self.queue.add(key);
        }

        self.on_dependency_event(event);
    }

    /// A tracked dependency changed: reconcile every Processor reading it.
    pub fn on_dependency_event<R: Resource>(&self, event: &WatchEvent<R>) {
        let dependents = self.tracker.lookup(&event.key);
        if !dependents.is_empty() {
            debug!(
                dependency = %event.key,
                dependents = dependents.len(),
                "Dependency changed"
            );
        }
        for key in dependents {
            self.queue.add(key);
        }
    }

    /// Enqueues every Processor. Returns how many were enqueued.
    pub async fn resync(&self) -> Result<usize, StoreError> {
        let processors = self
            .stores
            .processors
            .list(&LabelSelector::everything())
            .await?;
        let count = processors.len();
        for processor in processors {
            self.queue.add(processor.key());
        }
        Ok(count)
    }

    /// Runs watches, resync and the dispatcher until shutdown is signaled.
    #[instrument(skip_all)]
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let registration = ProcessorReconciler::registration();
        info!(
            primary = %registration.primary,
            owned = ?registration.owned,
            tracked = ?registration.tracked,
            resync_interval_secs = self.resync_interval.as_secs(),
            "Starting processor controller"
        );

        let mut processors = self.stores.processors.watch();
        let mut workloads = self.stores.workloads.watch();
        let mut functions = self.stores.functions.watch();
        let mut streams = self.stores.streams.watch();

        let dispatcher = tokio::spawn(Arc::clone(&self.dispatcher).run(shutdown.clone()));

        // The first tick fires immediately and doubles as the initial list.
        let mut resync = tokio::time::interval(self.resync_interval);

        loop {
            tokio::select! {
                Some(event) = processors.next() => self.on_processor_event(&event),
                Some(event) = workloads.next() => self.on_workload_event(&event),
                Some(event) = functions.next() => self.on_dependency_event(&event),
                Some(event) = streams.next() => self.on_dependency_event(&event),
                _ = resync.tick() => {
                    match self.resync().await {
                        Ok(count) => debug!(count, "Resynced processors"),
                        Err(e) => warn!(error = %e, "Resync failed"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Processor controller shutting down");
                        break;
                    }
                }
            }
        }

        if let Err(e) = dispatcher.await {
            warn!(error = %e, "Dispatcher task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ObjectMeta, OwnerReference, ProcessorSpec};
    use crate::store::MemoryStores;
    use procon_id::{ObjectKey, ResourceVersion, Uid};

    fn controller(stores: &MemoryStores) -> ProcessorController {
        ProcessorController::new(
            stores.stores(),
            Materializer::new("procon/processor"),
            ControllerConfig::default(),
        )
    }

    fn processor(name: &str) -> Processor {
        Processor {
            metadata: ObjectMeta::new("default", name),
            spec: ProcessorSpec {
                function_ref: "f1".to_string(),
                inputs: vec!["in".to_string()],
                ..ProcessorSpec::default()
            },
            ..Processor::default()
        }
    }

    #[test]
    fn test_workload_event_enqueues_owner() {
        let stores = MemoryStores::new();
        let controller = controller(&stores);

        let mut owner = ObjectMeta::new("default", "p1");
        owner.uid = Some(Uid::new());
        let mut workload = Workload {
            metadata: ObjectMeta::new("default", "p1-processor"),
            ..Workload::default()
        };
        workload.metadata.owner_references =
            vec![OwnerReference::controller_of(ResourceKind::Processor, &owner).unwrap()];

        controller.on_workload_event(&WatchEvent::modified(
            workload.key().object_key(),
            ResourceVersion::new(1),
            workload,
        ));
        assert_eq!(controller.queue().len(), 1);
    }

    #[test]
    fn test_unowned_workload_event_is_ignored() {
        let stores = MemoryStores::new();
        let controller = controller(&stores);
        let workload = Workload {
            metadata: ObjectMeta::new("default", "standalone"),
            ..Workload::default()
        };

        controller.on_workload_event(&WatchEvent::added(
            workload.key().object_key(),
            ResourceVersion::new(1),
            workload,
        ));
        assert!(controller.queue().is_empty());
    }

    #[test]
    fn test_unowned_workload_event_wakes_blocked_processor() {
        let stores = MemoryStores::new();
        let controller = controller(&stores);
        let workload = Workload {
            metadata: ObjectMeta::new("default", "p1-processor"),
            ..Workload::default()
        };
        controller
            .tracker()
            .track(workload.key().object_key(), ProcessorKey::new("default", "p1"));

        controller.on_workload_event(&WatchEvent::deleted(
            workload.key().object_key(),
            ResourceVersion::new(5),
            workload,
        ));
        assert_eq!(controller.queue().len(), 1);
    }

    #[test]
    fn test_dependency_event_enqueues_tracked_dependents() {
        let stores = MemoryStores::new();
        let controller = controller(&stores);
        let stream_key = ObjectKey::new(ResourceKind::Stream, "default", "in");
        controller
            .tracker()
            .track(stream_key.clone(), ProcessorKey::new("default", "p1"));
        controller
            .tracker()
            .track(stream_key.clone(), ProcessorKey::new("default", "p2"));

        let stream = crate::api::Stream {
            metadata: ObjectMeta::new("default", "in"),
            ..crate::api::Stream::default()
        };
        controller.on_dependency_event(&WatchEvent::modified(
            stream_key,
            ResourceVersion::new(3),
            stream,
        ));
        assert_eq!(controller.queue().len(), 2);

        let other = crate::api::Stream {
            metadata: ObjectMeta::new("default", "other"),
            ..crate::api::Stream::default()
        };
        controller.on_dependency_event(&WatchEvent::modified(
            other.key().object_key(),
            ResourceVersion::new(4),
            other,
        ));
        assert_eq!(controller.queue().len(), 2);
    }

    #[tokio::test]
    async fn test_resync_enqueues_every_processor() {
        let stores = MemoryStores::new();
        stores.processors.seed(processor("p1"));
        stores.processors.seed(processor("p2"));
        let controller = controller(&stores);

        assert_eq!(controller.resync().await.unwrap(), 2);
        assert_eq!(controller.queue().len(), 2);

        // Already queued keys are not duplicated.
        controller.resync().await.unwrap();
        assert_eq!(controller.queue().len(), 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let stores = MemoryStores::new();
        let controller = Arc::new(controller(&stores));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(Arc::clone(&controller).run(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(controller.queue().is_shutting_down());
    }
}
