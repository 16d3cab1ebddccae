//! Desired-state materialization: Processor → Workload.
//!
//! Pure and deterministic. Identical inputs always produce an identical
//! workload, so the reconciler can compare it field by field against what
//! is stored.

use std::collections::BTreeMap;

use procon_id::{ResourceKind, StreamKey};
use thiserror::Error;

use crate::api::{
    Container, EnvVar, Function, ObjectMeta, OwnerReference, Processor, Workload, WorkloadSpec,
    WorkloadTemplate,
};

/// Label carrying the owning processor's name.
pub const PROCESSOR_LABEL: &str = "streaming.procon.dev/processor";

/// Label carrying the function's name.
pub const FUNCTION_LABEL: &str = "streaming.procon.dev/function";

/// Name of the sidecar container moving data between streams and function.
pub const PROCESSOR_CONTAINER: &str = "processor";

/// Name of the container running the user function.
pub const FUNCTION_CONTAINER: &str = "function";

/// Address the sidecar uses to reach the function container.
pub const FUNCTION_ADDRESS: &str = "localhost:8081";

/// Protocol the function invoker speaks.
pub const INVOKER_PROTOCOL: &str = "streaming";

/// The name of the workload a processor owns.
pub fn workload_name(processor: &Processor) -> String {
    format!("{}-processor", processor.metadata.name)
}

/// A stream with everything the workload needs to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStream {
    pub key: StreamKey,
    pub address: String,
    pub content_type: String,
}

/// Materialization errors. Both are permanent for the current spec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaterializeError {
    #[error("stream {stream} is both an input and an output")]
    StreamCycle { stream: String },

    #[error("processor {processor} has no uid; it must be read from the store first")]
    MissingUid { processor: String },
}

/// Builds workloads for processors.
#[derive(Debug, Clone)]
pub struct Materializer {
    processor_image: String,
}

impl Materializer {
    /// `processor_image` is the sidecar image every workload runs.
    pub fn new(processor_image: impl Into<String>) -> Self {
        Self {
            processor_image: processor_image.into(),
        }
    }

    pub fn processor_image(&self) -> &str {
        &self.processor_image
    }

    /// Returns the workload `processor` should own, or `None` while the
    /// function has no image to run.
    pub fn materialize(
        &self,
        processor: &Processor,
        function: &Function,
        inputs: &[ResolvedStream],
        outputs: &[ResolvedStream],
    ) -> Result<Option<Workload>, MaterializeError> {
        if let Some(stream) = processor
            .spec
            .inputs
            .iter()
            .find(|name| processor.spec.outputs.contains(name))
        {
            return Err(MaterializeError::StreamCycle {
                stream: stream.clone(),
            });
        }

        let Some(image) = function.status.latest_image.as_deref() else {
            return Ok(None);
        };

        let owner = OwnerReference::controller_of(ResourceKind::Processor, &processor.metadata)
            .ok_or_else(|| MaterializeError::MissingUid {
                processor: processor.metadata.name.clone(),
            })?;

        let template = processor.spec.template.clone().unwrap_or_default();

        let mut labels = template.labels;
        labels.insert(PROCESSOR_LABEL.to_string(), processor.metadata.name.clone());
        labels.insert(FUNCTION_LABEL.to_string(), processor.spec.function_ref.clone());

        let selector = BTreeMap::from([(
            PROCESSOR_LABEL.to_string(),
            processor.metadata.name.clone(),
        )]);

        let sidecar = Container {
            name: PROCESSOR_CONTAINER.to_string(),
            image: self.processor_image.clone(),
            env: vec![
                EnvVar::new("INPUTS", join(inputs, |s| &s.address)),
                EnvVar::new("OUTPUTS", join(outputs, |s| &s.address)),
                EnvVar::new("OUTPUT_CONTENT_TYPES", join(outputs, |s| &s.content_type)),
                EnvVar::new("FUNCTION", FUNCTION_ADDRESS),
                EnvVar::new("GROUP", processor.metadata.name.clone()),
            ],
        };

        let mut function_env = vec![EnvVar::new("FUNCTION_INVOKER_PROTOCOL", INVOKER_PROTOCOL)];
        function_env.extend(template.env);
        let function_container = Container {
            name: FUNCTION_CONTAINER.to_string(),
            image: image.to_string(),
            env: function_env,
        };

        let mut metadata = ObjectMeta::new(
            processor.metadata.namespace.clone(),
            workload_name(processor),
        );
        metadata.labels = labels.clone();
        metadata.owner_references = vec![owner];

        Ok(Some(Workload {
            metadata,
            spec: WorkloadSpec {
                replicas: None,
                selector,
                template: WorkloadTemplate {
                    labels,
                    containers: vec![sidecar, function_container],
                },
            },
            status: Default::default(),
        }))
    }
}

fn join(streams: &[ResolvedStream], field: impl Fn(&ResolvedStream) -> &String) -> String {
    streams
        .iter()
        .map(|s| field(s).as_str())
        .collect::<Vec<_>>()
        .join(",")
}
