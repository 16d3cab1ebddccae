//! Processors: a function bound to ordered input and output streams.
//!
//! Besides the record itself this module holds the Processor status model:
//! the `Ready` condition set and the transitions a reconcile pass applies to
//! it.

use std::collections::BTreeMap;
use std::fmt;

use procon_id::{validate_name, FunctionKey, Generation, ProcessorKey, StreamKey, TypedKey};
use procon_reconcile::conditions::{self, find, Condition, ConditionManager, ConditionSet};
use procon_reconcile::ConditionStatus;
use serde::{Deserialize, Serialize};

use super::function::FunctionStatus;
use super::workload::{Workload, WorkloadConditionType};
use super::{EnvVar, FieldError, FieldErrors, ObjectMeta};
use crate::materialize::ResolvedStream;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Processor {
    pub metadata: ObjectMeta,

    pub spec: ProcessorSpec,

    #[serde(default)]
    pub status: ProcessorStatus,
}

impl_resource!(Processor, ProcessorKey, ProcessorSpec, ProcessorStatus);

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorSpec {
    /// Name of the Function in the processor's namespace.
    #[serde(default)]
    pub function_ref: String,

    /// Stream names, in the order the function sees them.
    #[serde(default)]
    pub inputs: Vec<String>,

    #[serde(default)]
    pub outputs: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<ProcessorTemplate>,
}

/// Extra pod settings layered onto the generated workload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorTemplate {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Passed to the function container.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

impl Processor {
    /// Key of the referenced Function.
    pub fn function_key(&self) -> FunctionKey {
        FunctionKey::from_parts(&self.metadata.namespace, &self.spec.function_ref)
    }

    /// Keys of the input streams, in order.
    pub fn input_keys(&self) -> Vec<StreamKey> {
        self.stream_keys(&self.spec.inputs)
    }

    /// Keys of the output streams, in order.
    pub fn output_keys(&self) -> Vec<StreamKey> {
        self.stream_keys(&self.spec.outputs)
    }

    fn stream_keys(&self, names: &[String]) -> Vec<StreamKey> {
        names
            .iter()
            .map(|name| StreamKey::from_parts(&self.metadata.namespace, name))
            .collect()
    }

    /// Fills in optional spec fields.
    pub fn set_defaults(&mut self) {
        if self.spec.template.is_none() {
            self.spec.template = Some(ProcessorTemplate::default());
        }
    }

    /// Checks names and required fields, collecting every problem.
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();

        check_name(&mut errors, "metadata.name", &self.metadata.name);
        if !self.metadata.namespace.is_empty() {
            if let Err(e) = validate_name(&self.metadata.namespace) {
                errors.push(FieldError::invalid("metadata.namespace", e));
            }
        }

        check_name(&mut errors, "spec.functionRef", &self.spec.function_ref);

        if self.spec.inputs.is_empty() {
            errors.push(FieldError::missing("spec.inputs"));
        }
        for (i, name) in self.spec.inputs.iter().enumerate() {
            check_name(&mut errors, &format!("spec.inputs[{i}]"), name);
        }
        for (i, name) in self.spec.outputs.iter().enumerate() {
            check_name(&mut errors, &format!("spec.outputs[{i}]"), name);
        }

        errors.into_result()
    }
}

fn check_name(errors: &mut FieldErrors, path: &str, name: &str) {
    if name.is_empty() {
        errors.push(FieldError::missing(path));
    } else if let Err(e) = validate_name(name) {
        errors.push(FieldError::invalid(path, e));
    }
}

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProcessorConditionType {
    /// Aggregate of the three conditions below.
    Ready,
    FunctionReady,
    StreamsReady,
    DeploymentReady,
    /// Set when a same-named workload belongs to someone else.
    DeploymentNotOwned,
}

/// `Ready` is the AND of the function, streams and deployment conditions.
pub static PROCESSOR_CONDITIONS: ConditionSet<ProcessorConditionType> = ConditionSet::new(
    ProcessorConditionType::Ready,
    &[
        ProcessorConditionType::FunctionReady,
        ProcessorConditionType::StreamsReady,
        ProcessorConditionType::DeploymentReady,
    ],
);

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition<ProcessorConditionType>>,

    /// Generation the rest of this status describes.
    #[serde(default)]
    pub observed_generation: Generation,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub deployment_name: String,

    /// Parallel to `spec.inputs`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_addresses: Vec<String>,

    /// Parallel to `spec.outputs`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_addresses: Vec<String>,

    /// Parallel to `spec.outputs`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_content_types: Vec<String>,
}

impl ProcessorStatus {
    fn manage(&mut self) -> ConditionManager<'_, ProcessorConditionType> {
        PROCESSOR_CONDITIONS.manage(&mut self.conditions)
    }

    pub fn condition(&self, type_: ProcessorConditionType) -> Option<&Condition<ProcessorConditionType>> {
        find(&self.conditions, type_)
    }

    /// Status of a condition, Unknown when absent.
    pub fn condition_status(&self, type_: ProcessorConditionType) -> ConditionStatus {
        self.condition(type_)
            .map(|c| c.status)
            .unwrap_or(ConditionStatus::Unknown)
    }

    pub fn is_ready(&self) -> bool {
        self.condition_status(ProcessorConditionType::Ready).is_true()
    }

    /// Resets the `Ready` set to Unknown and drops the not-owned marker.
    pub fn initialize_conditions(&mut self) {
        let mut manager = self.manage();
        manager.initialize();
        manager.clear_marker(ProcessorConditionType::DeploymentNotOwned);
    }

    /// Mirrors the Function's own Ready condition.
    pub fn propagate_function_status(&mut self, status: &FunctionStatus) {
        let mut manager = self.manage();
        match status.ready() {
            Some(c) if c.status.is_true() => {
                manager.mark_true(ProcessorConditionType::FunctionReady)
            }
            Some(c) if c.status.is_false() => manager.mark_false(
                ProcessorConditionType::FunctionReady,
                or(&c.reason, "FunctionFailed"),
                c.message.clone(),
            ),
            Some(c) => manager.mark_unknown(
                ProcessorConditionType::FunctionReady,
                or(&c.reason, "FunctionPending"),
                c.message.clone(),
            ),
            None => manager.mark_unknown(
                ProcessorConditionType::FunctionReady,
                "FunctionPending",
                "function has not reported readiness",
            ),
        }
    }

    pub fn mark_function_not_found(&mut self, key: &FunctionKey) {
        self.manage().mark_false(
            ProcessorConditionType::FunctionReady,
            "NotFound",
            format!("Unable to find function {:?}", key.name()),
        );
    }

    pub fn mark_function_resolve_failed(&mut self, key: &FunctionKey, error: &dyn fmt::Display) {
        self.manage().mark_false(
            ProcessorConditionType::FunctionReady,
            "ResolveFailed",
            format!("Unable to read function {:?}: {error}", key.name()),
        );
    }

    pub fn mark_streams_ready(&mut self) {
        self.manage().mark_true(ProcessorConditionType::StreamsReady);
    }

    pub fn mark_stream_not_found(&mut self, key: &StreamKey) {
        self.manage().mark_false(
            ProcessorConditionType::StreamsReady,
            "NotFound",
            format!("Unable to find stream {:?}", key.name()),
        );
    }

    pub fn mark_stream_not_ready(&mut self, key: &StreamKey) {
        self.manage().mark_false(
            ProcessorConditionType::StreamsReady,
            "AddressPending",
            format!("Stream {:?} has no address yet", key.name()),
        );
    }

    pub fn mark_stream_resolve_failed(&mut self, key: &StreamKey, error: &dyn fmt::Display) {
        self.manage().mark_false(
            ProcessorConditionType::StreamsReady,
            "ResolveFailed",
            format!("Unable to read stream {:?}: {error}", key.name()),
        );
    }

    /// Drops the address arrays. A pass clears them before resolving so a
    /// failed resolve never leaves arrays computed for an older spec.
    pub fn clear_stream_addresses(&mut self) {
        self.input_addresses.clear();
        self.output_addresses.clear();
        self.output_content_types.clear();
    }

    /// Records resolved stream addresses. Only called once every stream
    /// resolved, so the arrays always line up with `spec.inputs` and
    /// `spec.outputs`.
    pub fn set_stream_addresses(&mut self, inputs: &[ResolvedStream], outputs: &[ResolvedStream]) {
        self.input_addresses = inputs.iter().map(|s| s.address.clone()).collect();
        self.output_addresses = outputs.iter().map(|s| s.address.clone()).collect();
        self.output_content_types = outputs.iter().map(|s| s.content_type.clone()).collect();
    }

    /// The function has no built image yet, so there is nothing to deploy.
    pub fn mark_image_pending(&mut self, key: &FunctionKey) {
        self.manage().mark_unknown(
            ProcessorConditionType::DeploymentReady,
            "ImagePending",
            format!("Function {:?} has not published an image", key.name()),
        );
    }

    /// Derives `DeploymentReady` from the workload's rollout state.
    ///
    /// An `Available` condition on the workload wins when it is False.
    /// Otherwise the workload is ready once its controller observed the
    /// current generation and enough replicas are both updated and
    /// available.
    pub fn propagate_workload_status(&mut self, workload: &Workload) {
        let status = &workload.status;
        let desired = workload.spec.desired_replicas();
        let mut manager = self.manage();

        if let Some(c) = find(&status.conditions, WorkloadConditionType::Available) {
            if c.status.is_false() {
                manager.mark_false(
                    ProcessorConditionType::DeploymentReady,
                    or(&c.reason, "Unavailable"),
                    c.message.clone(),
                );
                return;
            }
        }

        if status.observed_generation < workload.metadata.generation {
            manager.mark_unknown(
                ProcessorConditionType::DeploymentReady,
                "RolloutInProgress",
                "waiting for the workload controller to observe the latest generation",
            );
        } else if status.updated_replicas >= desired && status.available_replicas >= desired {
            manager.mark_true(ProcessorConditionType::DeploymentReady);
        } else {
            manager.mark_unknown(
                ProcessorConditionType::DeploymentReady,
                "RolloutInProgress",
                format!(
                    "{} of {} updated replicas available",
                    status.available_replicas.min(status.updated_replicas),
                    desired
                ),
            );
        }
    }

    pub fn mark_deployment_failed(&mut self, error: &dyn fmt::Display) {
        self.manage().mark_false(
            ProcessorConditionType::DeploymentReady,
            "DeploymentFailed",
            error.to_string(),
        );
    }

    /// A workload with our name exists but is controlled by someone else.
    pub fn mark_deployment_not_owned(&mut self, name: &str) {
        let message = format!("There is an existing Workload {name:?} that we do not own.");
        let mut manager = self.manage();
        manager.mark_false(
            ProcessorConditionType::DeploymentReady,
            "NotOwned",
            message.clone(),
        );
        manager.set_marker(
            ProcessorConditionType::DeploymentNotOwned,
            ConditionStatus::True,
            "NotOwned",
            message,
        );
    }

    /// Keeps the persisted timestamp of every condition whose status did
    /// not change since `previous`.
    pub fn carry_transition_times(&mut self, previous: &ProcessorStatus) {
        conditions::carry_transition_times(&mut self.conditions, &previous.conditions);
    }
}

fn or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}
