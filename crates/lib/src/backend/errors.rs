//! Error types for backing-store transports.

use thiserror::Error;

use crate::id::FieldId;

/// Errors reported by a [`Backend`](super::Backend) implementation.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BackendError {
    /// No stored field has the requested id.
    #[error("Field not found: {id}")]
    NotFound {
        /// The id that was looked up
        id: FieldId,
    },

    /// Stored state does not have the expected shape.
    #[error("Corrupt backend state: {reason}")]
    CorruptState {
        /// Description of the problem
        reason: String,
    },

    /// The transport has been shut down.
    #[error("Backend connection closed")]
    Closed,
}

impl BackendError {
    /// Check if this error indicates a missing field.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound { .. })
    }

    /// Check if this error indicates corrupted storage.
    pub fn is_integrity_error(&self) -> bool {
        matches!(self, BackendError::CorruptState { .. })
    }
}

impl From<BackendError> for crate::Error {
    fn from(err: BackendError) -> Self {
        crate::Error::Backend(err)
    }
}
