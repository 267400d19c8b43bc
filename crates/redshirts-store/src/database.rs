//! Database location and connection management.
//!
//! The [`Database`] struct knows where the SQLite file lives and guarantees
//! that migrations have run before the first transaction is handed out.
//! Each call to [`Database::begin`] opens a fresh connection, so concurrent
//! operations never share a connection and SQLite's own locking is the only
//! mutual exclusion between them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;

use crate::error::Result;
use crate::migrations;
use crate::transaction::StoreTx;

/// How long a connection waits on a locked database before giving up.
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the message database file.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
    busy_timeout: Duration,
}

impl Database {
    /// Open (or create) the database at `path` and apply pending migrations.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %path.display(), "opening database");

        let db = Self {
            path: path.to_path_buf(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        };

        let conn = db.connect()?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        migrations::run_migrations(&conn)?;

        Ok(db)
    }

    /// Override how long connections wait for a competing writer.
    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    /// Start a new transaction on its own connection.
    ///
    /// The transaction is deferred: no lock is taken until the first
    /// statement runs, so callers may hold it while awaiting network calls
    /// without blocking other writers.
    pub fn begin(&self) -> Result<StoreTx> {
        let conn = self.connect()?;
        StoreTx::begin(conn)
    }

    /// Filesystem path of the database.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_file_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("messages.db");

        let db = Database::open_at(&path).expect("should open");
        assert!(db.path().exists());

        let tx = db.begin().unwrap();
        let version: u32 = tx
            .conn()
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, migrations::CURRENT_VERSION);
    }

    #[test]
    fn reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.db");

        Database::open_at(&path).unwrap();
        Database::open_at(&path).expect("second open should skip applied migrations");
    }
}
