//! SQLite persistence for jobs and their files.
//!
//! One connection per [`Database`], shared behind a mutex. Row-level access
//! lives in [`job_repo`] and [`file_repo`]; the typed adapter on top is
//! `repository::SqliteRepository`.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;

pub mod error;
pub mod file_repo;
pub mod job_repo;
pub mod migrations;

pub use error::DatabaseError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Cloneable handle; every clone shares the same connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens the database file, creating it and its parent directory when
    /// missing, and brings the schema up to date.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // WAL lets a `status` call read while a worker process writes.
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::debug!("SQLite journal mode: {}", mode);
        let db = Self::prepare(conn)?;

        log::info!(
            "Database ready at {} (schema v{})",
            path.display(),
            db.schema_version()?
        );
        Ok(db)
    }

    /// Private database that disappears with the handle.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self, DatabaseError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_all(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Highest applied migration version.
    pub fn schema_version(&self) -> Result<u32, DatabaseError> {
        self.with_conn(migrations::current_version)
    }

    /// Runs `f` while holding the connection lock.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }
}
