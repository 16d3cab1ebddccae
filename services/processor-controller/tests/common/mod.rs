//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use procon_controller::api::{
    Function, FunctionConditionType, FunctionSpec, FunctionStatus, ObjectMeta, Processor,
    ProcessorSpec, Resource, Stream, StreamSpec, StreamStatus, Workload,
};
use procon_controller::error::ReconcileError;
use procon_controller::materialize::Materializer;
use procon_controller::reconciler::{DependencyTracker, ProcessorReconciler};
use procon_controller::store::MemoryStores;
use procon_id::{FunctionKey, ProcessorKey, StreamKey, WorkloadKey};
use procon_reconcile::{Action, Condition, ConditionStatus};

pub const NAMESPACE: &str = "default";

pub const PROCESSOR_IMAGE: &str = "ghcr.io/procon-dev/processor:test";

/// In-memory stores plus a reconciler wired to them.
pub struct World {
    pub stores: MemoryStores,
    pub tracker: Arc<DependencyTracker>,
    pub reconciler: ProcessorReconciler,
}

impl World {
    pub fn new() -> Self {
        let stores = MemoryStores::with_action_log();
        let tracker = Arc::new(DependencyTracker::new());
        let reconciler = ProcessorReconciler::new(
            stores.stores(),
            Arc::clone(&tracker),
            Materializer::new(PROCESSOR_IMAGE),
        );
        Self {
            stores,
            tracker,
            reconciler,
        }
    }

    pub fn seed_function(&self, name: &str, image: Option<&str>) -> Function {
        self.stores.functions.seed(function(name, image))
    }

    pub fn seed_stream(&self, name: &str, address: Option<&str>, content_type: &str) -> Stream {
        self.stores.streams.seed(stream(name, address, content_type))
    }

    pub fn seed_processor(
        &self,
        name: &str,
        function_ref: &str,
        inputs: &[&str],
        outputs: &[&str],
    ) -> Processor {
        self.stores
            .processors
            .seed(processor(name, function_ref, inputs, outputs))
    }

    pub async fn reconcile(&self, name: &str) -> Result<Action, ReconcileError> {
        self.reconciler
            .reconcile_processor(&ProcessorKey::new(NAMESPACE, name))
            .await
    }

    pub fn processor(&self, name: &str) -> Processor {
        self.stores
            .processors
            .peek(&ProcessorKey::new(NAMESPACE, name))
            .expect("processor exists")
    }

    pub fn workload(&self, processor: &str) -> Option<Workload> {
        self.stores
            .workloads
            .peek(&WorkloadKey::new(NAMESPACE, format!("{processor}-processor")))
    }

    /// Reports the processor's workload as fully rolled out, the way its own
    /// controller would.
    pub fn roll_out(&self, processor: &str) -> Workload {
        let workload = self.workload(processor).expect("workload exists");
        let generation = workload.metadata.generation;
        let desired = workload.spec.desired_replicas();
        self.stores
            .workloads
            .patch_status(&workload.key(), |status| {
                status.observed_generation = generation;
                status.replicas = desired;
                status.ready_replicas = desired;
                status.available_replicas = desired;
                status.updated_replicas = desired;
            })
            .expect("workload exists")
    }

    pub fn set_function_image(&self, name: &str, image: &str) {
        self.stores
            .functions
            .patch_status(&FunctionKey::new(NAMESPACE, name), |status| {
                status.latest_image = Some(image.to_string());
            })
            .expect("function exists");
    }

    pub fn set_stream_address(&self, name: &str, address: &str) {
        self.stores
            .streams
            .patch_status(&StreamKey::new(NAMESPACE, name), |status| {
                status.address = Some(address.to_string());
            })
            .expect("stream exists");
    }
}

pub fn function(name: &str, image: Option<&str>) -> Function {
    let ready = if image.is_some() {
        ConditionStatus::True
    } else {
        ConditionStatus::Unknown
    };
    Function {
        metadata: ObjectMeta::new(NAMESPACE, name),
        spec: FunctionSpec {
            image: format!("registry.example.com/{name}"),
        },
        status: FunctionStatus {
            conditions: vec![Condition::new(FunctionConditionType::Ready, ready, "", "")],
            latest_image: image.map(str::to_string),
            ..FunctionStatus::default()
        },
    }
}

pub fn stream(name: &str, address: Option<&str>, content_type: &str) -> Stream {
    Stream {
        metadata: ObjectMeta::new(NAMESPACE, name),
        spec: StreamSpec {
            provider: "franz".to_string(),
            content_type: content_type.to_string(),
        },
        status: StreamStatus {
            address: address.map(str::to_string),
            ..StreamStatus::default()
        },
    }
}

pub fn processor(name: &str, function_ref: &str, inputs: &[&str], outputs: &[&str]) -> Processor {
    Processor {
        metadata: ObjectMeta::new(NAMESPACE, name),
        spec: ProcessorSpec {
            function_ref: function_ref.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            template: None,
        },
        ..Processor::default()
    }
}

/// Polls `check` until it holds or five seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
