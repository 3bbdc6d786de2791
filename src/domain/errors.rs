//! Domain errors for the synthloop control loop.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur while driving a run.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Invalid thresholds or limits. Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A collaborator (executor, approval signal, summarizer) failed or
    /// returned a malformed response.
    #[error("Collaborator failure ({collaborator}): {message}")]
    CollaboratorFailure { collaborator: String, message: String },

    /// A checkpoint could not be deserialized or failed validation on resume.
    #[error("Corrupt checkpoint {checkpoint_id}: {reason}")]
    CorruptCheckpoint { checkpoint_id: String, reason: String },

    /// The budget safety valve itself is broken. Never recovered.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition { from: String, to: String, reason: String },

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(Uuid),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl DomainError {
    /// Build a collaborator failure for the named collaborator.
    pub fn collaborator(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CollaboratorFailure {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    /// Whether the coordinator may retry the failed operation.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::CollaboratorFailure { .. })
    }
}

/// Result alias used across the domain and services.
pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
