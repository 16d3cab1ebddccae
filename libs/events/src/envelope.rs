//! Watch event envelope - the common wrapper for all change notifications.

use chrono::{DateTime, Utc};
use procon_id::{ObjectKey, ResourceVersion};
use serde::{Deserialize, Serialize};

/// What happened to the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
}

impl std::fmt::Display for WatchEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WatchEventType::Added => "ADDED",
            WatchEventType::Modified => "MODIFIED",
            WatchEventType::Deleted => "DELETED",
        };
        f.write_str(s)
    }
}

/// A single change notification for one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchEvent<T> {
    /// What happened.
    #[serde(rename = "type")]
    pub event_type: WatchEventType,

    /// Which object it happened to.
    pub key: ObjectKey,

    /// Resource version of the object after the change.
    pub resource_version: ResourceVersion,

    /// When the store emitted the event.
    pub observed_at: DateTime<Utc>,

    /// The object after the change, or its last state for deletions.
    pub object: T,
}

impl<T> WatchEvent<T> {
    /// Creates a new event stamped with the current time.
    pub fn new(
        event_type: WatchEventType,
        key: ObjectKey,
        resource_version: ResourceVersion,
        object: T,
    ) -> Self {
        Self {
            event_type,
            key,
            resource_version,
            observed_at: Utc::now(),
            object,
        }
    }

    /// Creates an `Added` event.
    pub fn added(key: ObjectKey, resource_version: ResourceVersion, object: T) -> Self {
        Self::new(WatchEventType::Added, key, resource_version, object)
    }

    /// Creates a `Modified` event.
    pub fn modified(key: ObjectKey, resource_version: ResourceVersion, object: T) -> Self {
        Self::new(WatchEventType::Modified, key, resource_version, object)
    }

    /// Creates a `Deleted` event.
    pub fn deleted(key: ObjectKey, resource_version: ResourceVersion, object: T) -> Self {
        Self::new(WatchEventType::Deleted, key, resource_version, object)
    }

    /// Returns true for deletions.
    pub fn is_deleted(&self) -> bool {
        self.event_type == WatchEventType::Deleted
    }
}
