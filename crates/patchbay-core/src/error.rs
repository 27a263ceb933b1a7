//! Error types for Patchbay core.

use thiserror::Error;

/// Core error type for Patchbay operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Node type already registered: {0}")]
    DuplicateNodeType(String),

    #[error("Pipeline not found: {0}")]
    PipelineNotFound(i64),

    #[error("Node not found: {0}")]
    NodeNotFound(i64),

    #[error("Slot not found: {0}")]
    SlotNotFound(i64),

    #[error("Job not found: {0}")]
    JobNotFound(i64),

    #[error("Edge {edge} references slot {slot} outside of the pipeline")]
    DanglingSlot { edge: i64, slot: i64 },

    #[error("Slot name '{0}' appears more than once in the node schema")]
    DuplicateSlotName(String),

    #[error("Invalid configuration for field '{field}': {message}")]
    InvalidConfig { field: String, message: String },

    #[error("Pipeline {0} is active")]
    PipelineActive(String),

    #[error("Pipeline {0} is stale")]
    PipelineStale(String),

    #[error("Job {0} already finished")]
    JobFinished(i64),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error for a single field.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig { field: field.into(), message: message.into() }
    }

    /// Whether this error was caused by client input rather than a failure on our side.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownNodeType(_)
                | Self::DanglingSlot { .. }
                | Self::DuplicateSlotName(_)
                | Self::InvalidConfig { .. }
        )
    }
}

/// Result type alias for Patchbay core operations.
pub type Result<T> = std::result::Result<T, Error>;
