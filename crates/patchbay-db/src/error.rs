//! Database error types.

use thiserror::Error;

/// Database error type.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not determine data directory")]
    NoDataDir,

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] patchbay_core::Error),
}

impl DbError {
    /// Turn SQLite constraint violations into [`DbError::Conflict`].
    pub(crate) fn conflict_on_constraint(err: rusqlite::Error, what: impl FnOnce() -> String) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
                Self::Conflict(what())
            }
            other => Self::Sqlite(other),
        }
    }
}

impl From<DbError> for patchbay_core::Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Core(inner) => inner,
            other => Self::Store(other.to_string()),
        }
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
