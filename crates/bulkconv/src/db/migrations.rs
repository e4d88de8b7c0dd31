//! Versioned schema changes.
//!
//! Applied versions are recorded in `_migrations`. Each migration runs in
//! its own transaction together with its bookkeeping row, so a crash leaves
//! the schema at a clean version boundary.

use rusqlite::Connection;

use super::error::DatabaseError;

/// Precondition that decides whether a migration's SQL still has to run.
enum Guard {
    Always,
    /// Only when `table` lacks `column`. Databases that gained the column
    /// some other way are just marked as migrated.
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },
}

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
    guard: Guard,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_jobs_table",
        sql: include_str!("sql/001_create_jobs.sql"),
        guard: Guard::Always,
    },
    Migration {
        version: 2,
        description: "create_job_files_table",
        sql: include_str!("sql/002_create_job_files.sql"),
        guard: Guard::Always,
    },
    Migration {
        version: 3,
        description: "add_archive_error_to_jobs",
        sql: include_str!("sql/003_add_archive_error.sql"),
        guard: Guard::MissingColumn {
            table: "jobs",
            column: "archive_error",
        },
    },
];

pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

pub fn current_version(conn: &Connection) -> Result<u32, DatabaseError> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?)
}

pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )?;

    let applied = current_version(conn)?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        apply(conn, migration)?;
    }
    Ok(())
}

fn apply(conn: &Connection, migration: &Migration) -> Result<(), DatabaseError> {
    let failed = |reason: String| DatabaseError::Migration {
        version: migration.version,
        description: migration.description,
        reason,
    };

    let needed = match migration.guard {
        Guard::Always => true,
        Guard::MissingColumn { table, column } => !table_columns(conn, table)?
            .iter()
            .any(|c| c == column),
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| failed(e.to_string()))?;
    if needed {
        log::info!(
            "Applying schema migration v{}: {}",
            migration.version,
            migration.description
        );
        tx.execute_batch(migration.sql)
            .map_err(|e| failed(e.to_string()))?;
    } else {
        log::info!(
            "Schema already has v{} ({}), recording it",
            migration.version,
            migration.description
        );
    }
    tx.execute(
        "INSERT INTO _migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![
            migration.version,
            migration.description,
            chrono::Utc::now().to_rfc3339()
        ],
    )
    .map_err(|e| failed(e.to_string()))?;
    tx.commit().map_err(|e| failed(e.to_string()))
}

/// Column names of `table`, via `PRAGMA table_info`.
fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, DatabaseError> {
    if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DatabaseError::CorruptRow {
            table: "sqlite_master",
            id: table.to_string(),
            reason: "not a plain table name".to_string(),
        });
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}
