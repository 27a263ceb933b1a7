//! Database migrations.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::schema::{SCHEMA_V1, SCHEMA_V2};

/// Schema scripts in version order. Version `n` is at index `n - 1`.
const MIGRATIONS: &[&str] = &[SCHEMA_V1, SCHEMA_V2];

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
const CURRENT_VERSION: i32 = MIGRATIONS.len() as i32;

/// Bring the schema up to [`CURRENT_VERSION`].
///
/// Every connection runs this on open; an up-to-date database costs one query.
pub fn run(conn: &mut Connection) -> DbResult<()> {
    let current = get_version(conn)?;
    if current > CURRENT_VERSION {
        return Err(DbError::MigrationFailed(format!(
            "database is at version {current}, this build only knows up to {CURRENT_VERSION}"
        )));
    }
    if current == CURRENT_VERSION {
        debug!(version = current, "Schema up to date");
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (version, script) in (1..).zip(MIGRATIONS).skip_while(|(version, _)| *version <= current) {
        info!(version, "Applying migration");
        tx.execute_batch(script)?;
        tx.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    }
    tx.commit()?;
    info!(from = current, to = CURRENT_VERSION, "Migrations complete");

    Ok(())
}

/// Get the current schema version.
fn get_version(conn: &Connection) -> DbResult<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(0);
    }

    Ok(conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();

        run(&mut conn).expect("Migrations failed");

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);

        let tables: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                 ('pipelines', 'nodes', 'slots', 'edges', 'apply_jobs', 'apply_events',
                  'node_state', 'known_devices', 'backend_preferences')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 9);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).expect("First run failed");
        run(&mut conn).expect("Second run failed");
        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_version_one_database_is_upgraded() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_V1).unwrap();
        conn.execute("INSERT INTO schema_version (version) VALUES (1)", []).unwrap();
        conn.execute("INSERT INTO pipelines (name) VALUES ('studio')", []).unwrap();
        conn.execute("INSERT INTO nodes (pipeline_id, type_tag) VALUES (1, 'pulseaudio.pipe')", []).unwrap();

        run(&mut conn).expect("Upgrade failed");

        assert_eq!(get_version(&conn).unwrap(), 2);
        let device_id: Option<i64> = conn.query_row("SELECT device_id FROM nodes", [], |row| row.get(0)).unwrap();
        assert_eq!(device_id, None);
    }

    #[test]
    fn test_newer_database_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).expect("Migrations failed");
        conn.execute("INSERT INTO schema_version (version) VALUES (?)", [CURRENT_VERSION + 1]).unwrap();

        assert!(matches!(run(&mut conn), Err(DbError::MigrationFailed(_))));
    }
}
