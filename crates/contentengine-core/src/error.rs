//! Error types for ContentEngine.

use thiserror::Error;

use crate::types::Stage;

/// Main error type for ContentEngine operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// One or more required folder-states could not be resolved.
    #[error("Required folders not found: {}", missing.join(", "))]
    Configuration { missing: Vec<String> },

    /// The run request itself is unusable.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The model call for a variant failed or returned unusable content.
    #[error("Generation failed for variant {variant}: {message}")]
    Generation { variant: u32, message: String },

    /// Writing a variant artifact failed.
    #[error("Persisting variant {variant} failed: {message}")]
    Persistence { variant: u32, message: String },

    /// Moving a completed image out of `new` failed.
    #[error("Transition failed for image {image}: {message}")]
    Transition { image: String, message: String },

    /// An output group with the derived name belongs to another image.
    #[error("Output group '{group}' collides with existing content: {message}")]
    OutputCollision { group: String, message: String },

    /// Storage collaborator error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Model collaborator transport or protocol error.
    #[error("Model error: {0}")]
    Model(String),

    /// A collaborator refused the request; repeating it will not help.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Operation timed out.
    #[error("Operation timed out after {duration_ms}ms: {operation}")]
    Timeout { duration_ms: u64, operation: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The run was cancelled by its caller.
    #[error("Run cancelled")]
    Cancelled,

    /// Internal error (should not happen).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Returns true if retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Timeout { .. } | EngineError::Storage(_) | EngineError::Model(_)
        )
    }

    /// Returns true if this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::Configuration { .. } | EngineError::InvalidRequest(_)
        )
    }

    /// The pipeline stage this error is attributed to, if it is stage-specific.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            EngineError::Generation { .. } => Some(Stage::Generate),
            EngineError::Persistence { .. } => Some(Stage::Persist),
            EngineError::Transition { .. } => Some(Stage::Transition),
            EngineError::OutputCollision { .. } => Some(Stage::Prepare),
            _ => None,
        }
    }

    /// Wrap a collaborator error as a generation failure for `variant`.
    pub fn generation(variant: u32, err: impl std::fmt::Display) -> Self {
        EngineError::Generation {
            variant,
            message: err.to_string(),
        }
    }

    /// Wrap a collaborator error as a persistence failure for `variant`.
    pub fn persistence(variant: u32, err: impl std::fmt::Display) -> Self {
        EngineError::Persistence {
            variant,
            message: err.to_string(),
        }
    }
}

/// Convenience Result type for ContentEngine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}
