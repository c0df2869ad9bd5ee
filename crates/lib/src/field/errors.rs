//! Error types for field storage and (de)serialization.
//!
//! Only programmer errors live here. A value of the wrong shape or a reference
//! that has not loaded yet is reported through [`FieldResult`](crate::FieldResult),
//! never through `FieldError`.

use thiserror::Error;

/// Structured error types for field operations.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum FieldError {
    /// An embedded object was assigned into a second container while still owned by the first.
    #[error("Can't put the same object in multiple containers at the same time (key '{key}')")]
    OwnershipViolation {
        /// Key (or list position) of the rejected assignment
        key: String,
    },

    /// A value's type tag has no registered serialization mapping.
    #[error("Type '{type_name}' not registered for serialization")]
    UnregisteredType {
        /// The unregistered type tag
        type_name: String,
    },

    /// A serialized object carried no `__type` discriminator.
    #[error("No property '__type' found in serialized field")]
    MissingTypeTag,

    /// A type tag was registered twice.
    #[error("Type '{type_name}' has already been registered")]
    DuplicateType {
        /// The duplicated type tag
        type_name: String,
    },

    /// A registered factory rejected its input.
    #[error("Failed to deserialize '{type_tag}': {reason}")]
    DeserializationFailed {
        /// Tag of the type being reconstructed
        type_tag: String,
        /// Description of the malformed input
        reason: String,
    },

    /// A script field's source could not be compiled.
    #[error("Couldn't compile script '{source_text}': {reason}")]
    ScriptCompileFailed {
        /// Original script text
        source_text: String,
        /// Compiler diagnostic
        reason: String,
    },

    /// A write was attempted while the instance is in read-only mode.
    #[error("Documents can't be modified in read-only mode (key '{key}')")]
    ReadOnly {
        /// Key of the rejected write
        key: String,
    },

    /// A list position was outside the list.
    #[error("Index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds {
        /// Requested position
        index: usize,
        /// Current list length
        len: usize,
    },

    /// A value is not legal in field storage.
    #[error("Invalid field value: {reason}")]
    InvalidValue {
        /// Why the value was rejected
        reason: String,
    },
}

impl FieldError {
    /// Check if this error is an ownership violation.
    pub fn is_ownership_violation(&self) -> bool {
        matches!(self, FieldError::OwnershipViolation { .. })
    }

    /// Check if this error is a serialization registry failure.
    pub fn is_unregistered_type(&self) -> bool {
        matches!(
            self,
            FieldError::UnregisteredType { .. } | FieldError::MissingTypeTag
        )
    }

    /// Check if this error is related to deserialization.
    pub fn is_deserialization_error(&self) -> bool {
        matches!(
            self,
            FieldError::DeserializationFailed { .. }
                | FieldError::MissingTypeTag
                | FieldError::UnregisteredType { .. }
                | FieldError::ScriptCompileFailed { .. }
        )
    }

    /// Check if this error was caused by read-only mode.
    pub fn is_read_only(&self) -> bool {
        matches!(self, FieldError::ReadOnly { .. })
    }

    /// Get the key if this error concerns a specific field key.
    pub fn key(&self) -> Option<&str> {
        match self {
            FieldError::OwnershipViolation { key } | FieldError::ReadOnly { key } => Some(key),
            _ => None,
        }
    }
}

impl From<FieldError> for crate::Error {
    fn from(err: FieldError) -> Self {
        crate::Error::Field(err)
    }
}
