//! Job repository: CRUD operations for the `jobs` table.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub status: String,
    pub created_at: String,
    pub completed_at: Option<String>,
    pub file_count: i64,
    pub archive_path: Option<String>,
    pub archive_error: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            status: row.get("status")?,
            created_at: row.get("created_at")?,
            completed_at: row.get("completed_at")?,
            file_count: row.get("file_count")?,
            archive_path: row.get("archive_path")?,
            archive_error: row.get("archive_error")?,
        })
    }
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| insert_on(conn, job))
}

/// Inserts a job row on an already locked connection, so callers can group
/// it with other writes in one transaction.
pub fn insert_on(conn: &Connection, job: &JobRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO jobs (id, status, created_at, completed_at, file_count, archive_path,
         archive_error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            job.id,
            job.status,
            job.created_at,
            job.completed_at,
            job.file_count,
            job.archive_path,
            job.archive_error,
        ],
    )?;
    Ok(())
}

/// Updates the mutable columns of a job, but only while its stored status is
/// one of `expected_statuses`. Returns the number of rows changed.
///
/// `file_count` and `created_at` are never rewritten.
pub fn update_guarded(
    db: &Database,
    job: &JobRow,
    expected_statuses: &[&str],
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM jobs WHERE id = ?1",
                params![job.id],
                |r| r.get(0),
            )
            .optional()?;

        match current {
            Some(status) if expected_statuses.contains(&status.as_str()) => {
                let changed = conn.execute(
                    "UPDATE jobs SET status=?2, completed_at=?3, archive_path=?4, archive_error=?5
                     WHERE id=?1",
                    params![
                        job.id,
                        job.status,
                        job.completed_at,
                        job.archive_path,
                        job.archive_error,
                    ],
                )?;
                Ok(changed)
            }
            _ => Ok(0),
        }
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Returns the stored status of a job, if the job exists.
pub fn find_status(db: &Database, id: &str) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| {
        let status = conn
            .query_row(
                "SELECT status FROM jobs WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(status)
    })
}

/// Lists jobs whose status is one of `statuses`, oldest first.
pub fn list_by_statuses(db: &Database, statuses: &[&str]) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let placeholders: Vec<String> = (1..=statuses.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "SELECT * FROM jobs WHERE status IN ({}) ORDER BY created_at ASC",
            placeholders.join(", ")
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(statuses.iter()), JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
