//! Patchbay Database - SQLite persistence layer.
//!
//! This crate stores pipelines with their nodes, slots and edges, the apply job
//! history, per-node runtime state and the catalog of discovered devices. It
//! implements the orchestrator's ledger and state store contracts.

pub mod devices;
pub mod error;
pub mod jobs;
pub mod migrations;
pub mod queries;
pub mod schema;
pub mod state;

pub use error::{DbError, DbResult};
pub use queries::PipelineUpdate;

use directories::ProjectDirs;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Database handle for Patchbay.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create the database at the default location.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open() -> DbResult<Self> {
        let path = Self::default_path()?;
        Self::open_at(&path)
    }

    /// Open or create the database at a specific path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open_at(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!(?path, "Opening database");
        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode; workers open their own connections
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        let mut db = Self { conn };
        db.run_migrations()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn open_in_memory() -> DbResult<Self> {
        debug!("Opening in-memory database");
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let mut db = Self { conn };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the default database path.
    ///
    /// # Errors
    /// Returns [`DbError::NoDataDir`] if no home directory can be determined.
    pub fn default_path() -> DbResult<PathBuf> {
        let dirs = ProjectDirs::from("org", "patchbay", "Patchbay").ok_or(DbError::NoDataDir)?;
        Ok(dirs.data_dir().join("patchbay.db"))
    }

    /// Run database migrations.
    fn run_migrations(&mut self) -> DbResult<()> {
        migrations::run(&mut self.conn)
    }

    /// Get a reference to the underlying connection.
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Map a stored enum name back to its value.
pub(crate) fn parse_column<T>(index: usize, value: &str, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    parse(value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            format!("unexpected value '{value}'").into(),
        )
    })
}

/// Decode a JSON text column.
pub(crate) fn json_column<T: serde::de::DeserializeOwned>(index: usize, value: &str) -> rusqlite::Result<T> {
    serde_json::from_str(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().expect("Failed to open in-memory database");
        assert!(db.conn().is_autocommit());
    }

    #[test]
    fn test_open_at_creates_parent_dirs() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("nested").join("patchbay.db");

        let db = Database::open_at(&path).expect("Failed to open database");
        assert!(path.exists());
        assert!(db.list_pipelines().expect("Failed to list pipelines").is_empty());
    }
}
