//! Error types for key parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating identities.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The input string is empty.
    #[error("identifier cannot be empty")]
    Empty,

    /// The UID has an invalid prefix.
    #[error("invalid UID prefix: expected '{expected}', got '{actual}'")]
    InvalidPrefix {
        expected: &'static str,
        actual: String,
    },

    /// The input is missing its separator (`/` for keys, `_` for UIDs).
    #[error("identifier missing '{0}' separator")]
    MissingSeparator(char),

    /// The ULID portion of a UID is invalid.
    #[error("invalid ULID: {0}")]
    InvalidUlid(String),

    /// A namespace or name is not a valid DNS label.
    #[error("invalid name '{name}': {message}")]
    InvalidName { name: String, message: String },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }

    /// Returns true if this error is about a malformed name.
    pub fn is_name_error(&self) -> bool {
        matches!(self, IdError::InvalidName { .. })
    }
}
