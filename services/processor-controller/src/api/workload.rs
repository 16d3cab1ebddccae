//! The child object a Processor is materialized into.

use std::collections::BTreeMap;

use procon_id::WorkloadKey;
use procon_reconcile::Condition;
use serde::{Deserialize, Serialize};

use super::ObjectMeta;

/// A replicated set of identical pods.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    pub metadata: ObjectMeta,

    pub spec: WorkloadSpec,

    #[serde(default)]
    pub status: WorkloadStatus,
}

impl_resource!(Workload, WorkloadKey, WorkloadSpec, WorkloadStatus);

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    /// Desired replica count. Unset means one; owned by whoever scales the
    /// workload, not by the controller that creates it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Labels selecting the pods of this workload.
    #[serde(default)]
    pub selector: BTreeMap<String, String>,

    pub template: WorkloadTemplate,
}

impl WorkloadSpec {
    /// Replica count the rollout is measured against.
    pub fn desired_replicas(&self) -> i32 {
        self.replicas.unwrap_or(1).max(0)
    }
}

/// Pod template.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadTemplate {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,

    pub image: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

impl Container {
    /// Looks up an env var value by name.
    pub fn env_value(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value.as_str())
    }
}

/// A single environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WorkloadConditionType {
    Available,
    Progressing,
}

/// Observed rollout state, written by the workload's own controller.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadStatus {
    #[serde(default)]
    pub observed_generation: procon_id::Generation,

    #[serde(default)]
    pub replicas: i32,

    #[serde(default)]
    pub ready_replicas: i32,

    #[serde(default)]
    pub available_replicas: i32,

    #[serde(default)]
    pub updated_replicas: i32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition<WorkloadConditionType>>,
}

impl Workload {
    /// Looks up the container with the given name.
    pub fn container(&self, name: &str) -> Option<&Container> {
        self.spec.template.containers.iter().find(|c| c.name == name)
    }
}
