//! Error types for sigmap-engine
//!
//! Validation, not-found and conflict errors are typed so callers can
//! render them; store failures travel as `Persistence` and always propagate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AssignmentError>;

/// Auto-assignment error
#[derive(Debug, Error)]
pub enum AssignmentError {
    /// Missing or malformed identifier, non-boolean confirmation flag
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown equipment, signature or assignment
    #[error("Not found: {0}")]
    NotFound(String),

    /// Feedback already recorded, rollback disabled, no active assignment
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Unexpected failure inside scoring or normalization
    #[error("Internal error: {0}")]
    Internal(String),

    /// Store failure; state was not durably recorded
    #[error("Persistence error: {0}")]
    Persistence(sigmap_common::Error),
}

impl AssignmentError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AssignmentError::InvalidInput(_) => "INVALID_INPUT",
            AssignmentError::NotFound(_) => "NOT_FOUND",
            AssignmentError::Conflict(_) => "CONFLICT",
            AssignmentError::Internal(_) => "INTERNAL_ERROR",
            AssignmentError::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }
}

impl From<sigmap_common::Error> for AssignmentError {
    fn from(err: sigmap_common::Error) -> Self {
        match err {
            sigmap_common::Error::NotFound(msg) => AssignmentError::NotFound(msg),
            sigmap_common::Error::Conflict(msg) => AssignmentError::Conflict(msg),
            sigmap_common::Error::InvalidInput(msg) => AssignmentError::InvalidInput(msg),
            other => AssignmentError::Persistence(other),
        }
    }
}
