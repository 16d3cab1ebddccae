//! Field-level validation errors.

use std::fmt;

use thiserror::Error;

/// A problem with one field, addressed by its dotted JSON path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("missing field: {path}")]
    Missing { path: String },

    #[error("invalid value at {path}: {message}")]
    Invalid { path: String, message: String },
}

impl FieldError {
    pub fn missing(path: impl Into<String>) -> Self {
        FieldError::Missing { path: path.into() }
    }

    pub fn invalid(path: impl Into<String>, message: impl fmt::Display) -> Self {
        FieldError::Invalid {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Dotted path of the offending field.
    pub fn path(&self) -> &str {
        match self {
            FieldError::Missing { path } | FieldError::Invalid { path, .. } => path,
        }
    }
}

/// Every problem found in one object.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Returns true if some error addresses `path`.
    pub fn has_path(&self, path: &str) -> bool {
        self.0.iter().any(|e| e.path() == path)
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}
