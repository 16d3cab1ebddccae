//! Typed identity definitions for controller resources.

use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::{define_id, define_key, IdError};

/// Maximum length of a namespace or name.
pub const MAX_NAME_LEN: usize = 63;

// =============================================================================
// Resource Kinds
// =============================================================================

/// The kinds of resources the controller knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Processor,
    Function,
    Stream,
    Workload,
}

impl ResourceKind {
    /// Returns the canonical name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Processor => "Processor",
            ResourceKind::Function => "Function",
            ResourceKind::Stream => "Stream",
            ResourceKind::Workload => "Workload",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Keys
// =============================================================================

/// Common behavior of every kind-bound key.
pub trait TypedKey: Clone + Eq + Ord + Hash + fmt::Display + fmt::Debug + Send + Sync + 'static {
    /// The kind this key addresses.
    const KIND: ResourceKind;

    /// Builds a key from its parts without validation.
    fn from_parts(namespace: &str, name: &str) -> Self;

    /// Returns the namespace part.
    fn namespace(&self) -> &str;

    /// Returns the name part.
    fn name(&self) -> &str;
}

define_key!(ProcessorKey, ResourceKind::Processor);
define_key!(FunctionKey, ResourceKind::Function);
define_key!(StreamKey, ResourceKind::Stream);
define_key!(WorkloadKey, ResourceKind::Workload);

/// A key with its kind erased.
///
/// Used where objects of several kinds share one index, such as the
/// dependency tracker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    /// Creates a new object key.
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// Validates a namespace or name against DNS label rules.
pub fn validate_name(name: &str) -> Result<(), IdError> {
    let invalid = |message: &str| IdError::InvalidName {
        name: name.to_string(),
        message: message.to_string(),
    };

    if name.is_empty() {
        return Err(IdError::Empty);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("must be no more than 63 characters"));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err(invalid("must consist of lowercase alphanumerics or '-'"));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid("must start and end with an alphanumeric"));
    }
    Ok(())
}

// =============================================================================
// UIDs
// =============================================================================

define_id!(Uid, "uid");

// =============================================================================
// Generation
// =============================================================================

/// Spec generation counter, bumped by the store whenever spec changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(i64);

impl Generation {
    /// The generation of a freshly created object.
    pub const FIRST: Self = Self(1);

    /// Creates a new Generation from an i64.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the underlying i64 value.
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }

    /// Returns the next generation.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Generation {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl serde::Serialize for Generation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Generation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = i64::deserialize(deserializer)?;
        Ok(Self(value))
    }
}

// =============================================================================
// Resource Version
// =============================================================================

/// Opaque write counter used for optimistic concurrency.
///
/// Zero means "unset": writes carrying it skip the version check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ResourceVersion(u64);

impl ResourceVersion {
    /// Creates a new ResourceVersion from a u64.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying u64 value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Returns true if no version has been assigned.
    #[must_use]
    pub const fn is_unset(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl serde::Serialize for ResourceVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ResourceVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<u64>().map(Self).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_uid_roundtrip() {
        let uid = Uid::new();
        let s = uid.to_string();
        assert!(s.starts_with("uid_"));
        let parsed: Uid = s.parse().unwrap();
        assert_eq!(uid, parsed);
    }

    #[test]
    fn test_uid_invalid_prefix() {
        let result: Result<Uid, _> = "org_01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert!(matches!(
            result.unwrap_err(),
            IdError::InvalidPrefix { .. }
        ));
    }

    #[test]
    fn test_uid_invalid_ulid() {
        let result: Result<Uid, _> = "uid_invalid".parse();
        assert!(matches!(result.unwrap_err(), IdError::InvalidUlid(_)));
    }

    #[test]
    fn test_key_parse() {
        let key: ProcessorKey = "default/p1".parse().unwrap();
        assert_eq!(key.namespace(), "default");
        assert_eq!(key.name(), "p1");
        assert_eq!(key.to_string(), "default/p1");
    }

    #[test]
    fn test_key_missing_separator() {
        let result: Result<FunctionKey, _> = "f1".parse();
        assert!(matches!(result.unwrap_err(), IdError::MissingSeparator('/')));
    }

    #[test]
    fn test_key_empty() {
        let result: Result<StreamKey, _> = "".parse();
        assert!(result.unwrap_err().is_empty());
    }

    #[test]
    fn test_key_rejects_invalid_name() {
        let result: Result<StreamKey, _> = "default/Bad_Name".parse();
        assert!(result.unwrap_err().is_name_error());
    }

    #[test]
    fn test_object_key_roundtrip_through_kind() {
        let key = FunctionKey::new("default", "f1");
        let object = key.object_key();
        assert_eq!(object.kind, ResourceKind::Function);
        assert_eq!(object.namespace, key.namespace());
        assert_eq!(object.name, key.name());
    }

    #[test]
    fn test_keys_of_different_kinds_do_not_collide() {
        let function: ObjectKey = FunctionKey::new("default", "x").into();
        let stream: ObjectKey = StreamKey::new("default", "x").into();
        assert_ne!(function, stream);
    }

    #[test]
    fn test_key_json_roundtrip() {
        let key = WorkloadKey::new("ns", "p1-processor");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"ns/p1-processor\"");
        let parsed: WorkloadKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("in1").is_ok());
        assert!(validate_name("-in1").is_err());
        assert!(validate_name("in1-").is_err());
        assert!(validate_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_generation_next() {
        let generation = Generation::FIRST;
        assert_eq!(generation.value(), 1);
        assert_eq!(generation.next().value(), 2);
    }

    #[test]
    fn test_resource_version_json() {
        let rv = ResourceVersion::new(42);
        let json = serde_json::to_string(&rv).unwrap();
        assert_eq!(json, "\"42\"");
        let parsed: ResourceVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(rv, parsed);
        assert!(ResourceVersion::default().is_unset());
    }

    proptest! {
        #[test]
        fn prop_key_roundtrip(ns in "[a-z][a-z0-9-]{0,20}[a-z0-9]", name in "[a-z0-9]{1,30}") {
            let key = ProcessorKey::new(ns.clone(), name.clone());
            let parsed: ProcessorKey = key.to_string().parse().unwrap();
            prop_assert_eq!(parsed, key);
        }
    }
}
