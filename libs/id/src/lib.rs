//! # procon-id
//!
//! Identity types for the resources the processor controller reads and writes.
//!
//! ## Design Principles
//!
//! - Every resource is addressed by `namespace/name`; the key type carries the
//!   resource kind so a `FunctionKey` can never be passed where a
//!   `ProcessorKey` is expected
//! - UIDs are system-generated and distinguish two objects that reused a name
//! - Keys and UIDs roundtrip through their canonical string form
//!
//! ## Formats
//!
//! - Keys: `{namespace}/{name}`, e.g. `default/p1`
//! - UIDs: `uid_{ulid}`, e.g. `uid_01HV4Z2WQXKJNM8GPQY6VBKC3D`
//!
//! Names follow DNS label rules (lowercase alphanumerics and `-`, at most 63
//! characters, starting and ending with an alphanumeric).

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
