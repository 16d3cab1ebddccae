//! Macros for defining typed identity types.

/// Macro to define a ULID-backed identifier with a specific prefix.
///
/// This generates a newtype wrapper around ULID with:
/// - A `PREFIX` constant
/// - `new()` to generate a fresh ID
/// - `parse()` to parse from string
/// - `Display`, `FromStr`, `Serialize` and `Deserialize` implementations
///
/// # Example
///
/// ```ignore
/// define_id!(Uid, "uid");
///
/// let uid = Uid::new();
/// let parsed: Uid = "uid_01HV4Z2WQXKJNM8GPQY6VBKC3D".parse()?;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        /// A ULID-backed identifier.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name($crate::Ulid);

        impl $name {
            /// The prefix for this ID type.
            pub const PREFIX: &'static str = $prefix;

            /// Creates a new ID with a fresh ULID.
            #[must_use]
            pub fn new() -> Self {
                Self($crate::Ulid::new())
            }

            /// Creates an ID from a raw ULID.
            #[must_use]
            pub const fn from_ulid(ulid: $crate::Ulid) -> Self {
                Self(ulid)
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn ulid(&self) -> $crate::Ulid {
                self.0
            }

            /// Parses an ID from a string in the format `{prefix}_{ulid}`.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                if s.is_empty() {
                    return Err($crate::IdError::Empty);
                }

                let Some((prefix, ulid_str)) = s.split_once('_') else {
                    return Err($crate::IdError::MissingSeparator('_'));
                };

                if prefix != Self::PREFIX {
                    return Err($crate::IdError::InvalidPrefix {
                        expected: Self::PREFIX,
                        actual: prefix.to_string(),
                    });
                }

                let ulid = ulid_str
                    .parse::<$crate::Ulid>()
                    .map_err(|e| $crate::IdError::InvalidUlid(e.to_string()))?;

                Ok(Self(ulid))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}_{}", Self::PREFIX, self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.collect_str(self)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

/// Macro to define a namespaced key bound to one resource kind.
///
/// This generates a `{namespace}/{name}` key type with:
/// - `new()` (unchecked) and `parse()` (validated) constructors
/// - `namespace()`, `name()` and `object_key()` accessors
/// - a [`TypedKey`](crate::TypedKey) implementation
/// - `Display`, `FromStr`, `Serialize` and `Deserialize` implementations
///
/// # Example
///
/// ```ignore
/// define_key!(ProcessorKey, ResourceKind::Processor);
///
/// let key = ProcessorKey::new("default", "p1");
/// let parsed: ProcessorKey = "default/p1".parse()?;
/// ```
#[macro_export]
macro_rules! define_key {
    ($name:ident, $kind:expr) => {
        /// A namespaced key for one resource kind.
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name {
            namespace: String,
            name: String,
        }

        impl $name {
            /// Creates a key without validating its parts.
            #[must_use]
            pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
                Self {
                    namespace: namespace.into(),
                    name: name.into(),
                }
            }

            /// Parses a key from `{namespace}/{name}`, validating both parts.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                if s.is_empty() {
                    return Err($crate::IdError::Empty);
                }

                let Some((namespace, name)) = s.split_once('/') else {
                    return Err($crate::IdError::MissingSeparator('/'));
                };

                $crate::validate_name(namespace)?;
                $crate::validate_name(name)?;

                Ok(Self::new(namespace, name))
            }

            /// Returns the namespace part.
            #[must_use]
            pub fn namespace(&self) -> &str {
                &self.namespace
            }

            /// Returns the name part.
            #[must_use]
            pub fn name(&self) -> &str {
                &self.name
            }

            /// Erases the kind into an untyped [`ObjectKey`](crate::ObjectKey).
            #[must_use]
            pub fn object_key(&self) -> $crate::ObjectKey {
                $crate::ObjectKey::new($kind, &self.namespace, &self.name)
            }
        }

        impl $crate::TypedKey for $name {
            const KIND: $crate::ResourceKind = $kind;

            fn from_parts(namespace: &str, name: &str) -> Self {
                Self {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                }
            }

            fn namespace(&self) -> &str {
                &self.namespace
            }

            fn name(&self) -> &str {
                &self.name
            }
        }

        impl From<$name> for $crate::ObjectKey {
            fn from(key: $name) -> Self {
                $crate::ObjectKey::new($kind, key.namespace, key.name)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}/{}", self.namespace, self.name)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.collect_str(self)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}
