//! Streams: named data channels processors read from and write to.

use procon_id::StreamKey;
use procon_reconcile::conditions::{find, Condition};
use serde::{Deserialize, Serialize};

use super::ObjectMeta;

/// Content type assumed when a stream declares none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub metadata: ObjectMeta,

    pub spec: StreamSpec,

    #[serde(default)]
    pub status: StreamStatus,
}

impl_resource!(Stream, StreamKey, StreamSpec, StreamStatus);

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSpec {
    /// Name of the provider serving this stream.
    pub provider: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_type: String,
}

impl StreamSpec {
    /// The declared content type, or [`DEFAULT_CONTENT_TYPE`].
    pub fn effective_content_type(&self) -> &str {
        if self.content_type.is_empty() {
            DEFAULT_CONTENT_TYPE
        } else {
            &self.content_type
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StreamConditionType {
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition<StreamConditionType>>,

    /// Provider address, published once the provider has set the stream up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl StreamStatus {
    pub fn ready(&self) -> Option<&Condition<StreamConditionType>> {
        find(&self.conditions, StreamConditionType::Ready)
    }
}
