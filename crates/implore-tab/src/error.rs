//! Error types for implore-tab
//!
//! Structural failures (allocation, validation, marshalling misuse) abort the
//! whole call and are recorded on the table as an [`ErrorRecord`]. Per-row
//! lookup conditions are not errors; see [`crate::RowStatus`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for table operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TabError {
    /// Storage could not be sized or reserved
    #[error("Allocation failed: {message}")]
    Allocation { message: String },

    /// Raw fields are malformed
    #[error("Invalid table parameters: {message}")]
    Validation { message: String },

    /// A derived field was requested before the table was derived
    #[error("Field {field} is not available until the table is derived")]
    NotReady { field: &'static str },

    /// No registry entry for this field code
    #[error("Unknown field code: {code}")]
    UnknownField { code: i32 },

    /// Indices or value do not match the field's declared shape
    #[error("Shape mismatch for {field}: {message}")]
    Shape { field: &'static str, message: String },

    /// Derived fields can only be produced by derive
    #[error("Field {field} is read-only")]
    ReadOnlyField { field: &'static str },
}

impl TabError {
    pub fn allocation(message: impl Into<String>) -> Self {
        TabError::Allocation {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        TabError::Validation {
            message: message.into(),
        }
    }

    pub fn shape(field: &'static str, message: impl Into<String>) -> Self {
        TabError::Shape {
            field,
            message: message.into(),
        }
    }

    /// The closed category this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            TabError::Allocation { .. } => ErrorKind::Allocation,
            TabError::Validation { .. } => ErrorKind::Validation,
            TabError::NotReady { .. } => ErrorKind::NotReady,
            TabError::UnknownField { .. } => ErrorKind::UnknownField,
            TabError::Shape { .. } => ErrorKind::Shape,
            TabError::ReadOnlyField { .. } => ErrorKind::ReadOnlyField,
        }
    }

    /// Whether the caller can fix its inputs and try again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TabError::Validation { .. } | TabError::NotReady { .. }
        )
    }
}

/// Error categories, with stable integer codes for the field protocol
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Enum))]
pub enum ErrorKind {
    Allocation,
    Validation,
    NotReady,
    UnknownField,
    Shape,
    ReadOnlyField,
}

impl ErrorKind {
    pub fn code(&self) -> i32 {
        match self {
            ErrorKind::Allocation => 2,
            ErrorKind::Validation => 3,
            ErrorKind::NotReady => 4,
            ErrorKind::UnknownField => 5,
            ErrorKind::Shape => 6,
            ErrorKind::ReadOnlyField => 7,
        }
    }
}

/// Diagnostic record attached to a table by its last failing operation.
///
/// Rendering is left to the host; this crate only fills it in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Record))]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&TabError> for ErrorRecord {
    fn from(err: &TabError) -> Self {
        ErrorRecord {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for table operations
pub type TabResult<T> = Result<T, TabError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TabError::validation("index vector 1 is not monotonic");
        assert!(err.to_string().contains("not monotonic"));

        let err = TabError::UnknownField { code: 999 };
        assert!(err.to_string().contains("999"));
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(TabError::allocation("x").kind(), ErrorKind::Allocation);
        assert_eq!(
            TabError::shape("sense", "bad axis").kind(),
            ErrorKind::Shape
        );
        assert_eq!(
            TabError::NotReady { field: "extrema" }.kind(),
            ErrorKind::NotReady
        );
    }

    #[test]
    fn test_retryable() {
        assert!(TabError::validation("x").is_retryable());
        assert!(TabError::NotReady { field: "delta" }.is_retryable());
        assert!(!TabError::UnknownField { code: 1 }.is_retryable());
        assert!(!TabError::allocation("x").is_retryable());
    }

    #[test]
    fn test_error_record_from_error() {
        let err = TabError::shape("coord", "index 12 out of range");
        let record = ErrorRecord::from(&err);
        assert_eq!(record.kind, ErrorKind::Shape);
        assert!(record.message.contains("coord"));
    }
}
