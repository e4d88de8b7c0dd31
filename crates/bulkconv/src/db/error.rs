use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cannot prepare database location '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema migration {version} ({description}) failed: {reason}")]
    Migration {
        version: u32,
        description: &'static str,
        reason: String,
    },

    /// A stored value does not map back onto the job model.
    #[error("Corrupt row in '{table}' for id '{id}': {reason}")]
    CorruptRow {
        table: &'static str,
        id: String,
        reason: String,
    },

    #[error("Database connection lock poisoned")]
    LockPoisoned,
}
