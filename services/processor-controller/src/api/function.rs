//! Functions: user code built into an image elsewhere.

use procon_id::FunctionKey;
use procon_reconcile::conditions::{find, Condition};
use serde::{Deserialize, Serialize};

use super::ObjectMeta;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    pub metadata: ObjectMeta,

    pub spec: FunctionSpec,

    #[serde(default)]
    pub status: FunctionStatus,
}

impl_resource!(Function, FunctionKey, FunctionSpec, FunctionStatus);

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSpec {
    /// Image repository the build pushes to.
    pub image: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FunctionConditionType {
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition<FunctionConditionType>>,

    /// Digest-qualified image of the most recent successful build.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_image: Option<String>,

    #[serde(default)]
    pub observed_generation: procon_id::Generation,
}

impl FunctionStatus {
    pub fn ready(&self) -> Option<&Condition<FunctionConditionType>> {
        find(&self.conditions, FunctionConditionType::Ready)
    }
}
