//! PulseAudio error types.

use thiserror::Error;

/// PulseAudio error type.
#[derive(Debug, Error)]
pub enum PulseError {
    #[error("Failed to run pactl: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("pactl {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Module {0} is not loaded")]
    NoSuchModule(u32),

    #[error("Unexpected pactl output: {0}")]
    Parse(String),

    #[error("Invalid node state: {0}")]
    InvalidState(String),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Result type for PulseAudio operations.
pub type PulseResult<T> = Result<T, PulseError>;

impl From<PulseError> for patchbay_core::Error {
    fn from(err: PulseError) -> Self {
        Self::Backend(err.to_string())
    }
}
