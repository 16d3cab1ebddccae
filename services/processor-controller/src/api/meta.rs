//! Object metadata shared by every resource kind.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use procon_id::{Generation, ResourceKind, ResourceVersion, Uid};
use serde::{Deserialize, Serialize};

/// Identity, versioning and ownership of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub namespace: String,

    pub name: String,

    /// Assigned by the store on create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uid>,

    /// Bumped by the store whenever spec changes.
    #[serde(default)]
    pub generation: Generation,

    /// Bumped by the store on every write.
    #[serde(default)]
    pub resource_version: ResourceVersion,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,

    /// Set once deletion has been requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// The owner reference flagged as controller, if any.
    pub fn controller(&self) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|r| r.controller)
    }

    /// Returns true if `owner` is this object's controller.
    ///
    /// Matching is by UID: an owner that was deleted and recreated under the
    /// same name does not control objects created for its predecessor.
    pub fn is_controlled_by(&self, owner: &ObjectMeta) -> bool {
        match (owner.uid, self.controller()) {
            (Some(uid), Some(reference)) => reference.uid == uid,
            _ => false,
        }
    }

    /// Returns true once deletion has been requested.
    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }
}

/// Back-reference from a child object to the object owning its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub kind: ResourceKind,
    pub name: String,
    pub uid: Uid,
    #[serde(default)]
    pub controller: bool,
    #[serde(default)]
    pub block_owner_deletion: bool,
}

impl OwnerReference {
    /// A controlling reference to `owner`, or `None` if it has no UID yet.
    pub fn controller_of(kind: ResourceKind, owner: &ObjectMeta) -> Option<Self> {
        owner.uid.map(|uid| Self {
            kind,
            name: owner.name.clone(),
            uid,
            controller: true,
            block_owner_deletion: true,
        })
    }
}

/// Equality-based label selector. An empty selector matches everything.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    /// Selects every object.
    pub fn everything() -> Self {
        Self::default()
    }

    /// Adds a required label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.match_labels.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_controlled_by_matches_uid() {
        let mut owner = ObjectMeta::new("default", "p1");
        owner.uid = Some(Uid::new());

        let mut child = ObjectMeta::new("default", "p1-processor");
        child.owner_references =
            vec![OwnerReference::controller_of(ResourceKind::Processor, &owner).unwrap()];
        assert!(child.is_controlled_by(&owner));

        let mut recreated = owner.clone();
        recreated.uid = Some(Uid::new());
        assert!(!child.is_controlled_by(&recreated));
    }

    #[test]
    fn test_non_controller_reference_does_not_control() {
        let mut owner = ObjectMeta::new("default", "p1");
        owner.uid = Some(Uid::new());

        let mut reference = OwnerReference::controller_of(ResourceKind::Processor, &owner).unwrap();
        reference.controller = false;
        let mut child = ObjectMeta::new("default", "p1-processor");
        child.owner_references = vec![reference];

        assert!(child.controller().is_none());
        assert!(!child.is_controlled_by(&owner));
    }

    #[test]
    fn test_owner_without_uid_controls_nothing() {
        let owner = ObjectMeta::new("default", "p1");
        assert!(OwnerReference::controller_of(ResourceKind::Processor, &owner).is_none());
        assert!(!ObjectMeta::new("default", "x").is_controlled_by(&owner));
    }

    #[test]
    fn test_label_selector() {
        let labels = BTreeMap::from([
            ("app".to_string(), "demo".to_string()),
            ("tier".to_string(), "stream".to_string()),
        ]);

        assert!(LabelSelector::everything().matches(&labels));
        assert!(LabelSelector::everything()
            .with_label("app", "demo")
            .matches(&labels));
        assert!(!LabelSelector::everything()
            .with_label("app", "other")
            .matches(&labels));
    }
}
