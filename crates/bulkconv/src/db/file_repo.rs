//! File repository: CRUD operations for the `job_files` table.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw file row from the database.
#[derive(Debug, Clone)]
pub struct JobFileRow {
    pub id: String,
    pub job_id: String,
    pub position: i64,
    pub filename: String,
    pub original_path: String,
    pub output_path: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl JobFileRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            position: row.get("position")?,
            filename: row.get("filename")?,
            original_path: row.get("original_path")?,
            output_path: row.get("output_path")?,
            status: row.get("status")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Inserts a new file row.
pub fn insert(db: &Database, file: &JobFileRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| insert_on(conn, file))
}

/// Inserts a file row on an already locked connection.
pub fn insert_on(conn: &Connection, file: &JobFileRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO job_files (id, job_id, position, filename, original_path, output_path,
         status, error_message, created_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            file.id,
            file.job_id,
            file.position,
            file.filename,
            file.original_path,
            file.output_path,
            file.status,
            file.error_message,
            file.created_at,
            file.completed_at,
        ],
    )?;
    Ok(())
}

/// Updates the mutable columns of a file while its stored status is one of
/// `expected_statuses`. Returns the number of rows changed.
pub fn update_guarded(
    db: &Database,
    file: &JobFileRow,
    expected_statuses: &[&str],
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM job_files WHERE id = ?1",
                params![file.id],
                |r| r.get(0),
            )
            .optional()?;

        match current {
            Some(status) if expected_statuses.contains(&status.as_str()) => {
                let changed = conn.execute(
                    "UPDATE job_files SET output_path=?2, status=?3, error_message=?4,
                     completed_at=?5 WHERE id=?1",
                    params![
                        file.id,
                        file.output_path,
                        file.status,
                        file.error_message,
                        file.completed_at,
                    ],
                )?;
                Ok(changed)
            }
            _ => Ok(0),
        }
    })
}

/// Returns the stored status of a file, if it exists.
pub fn find_status(db: &Database, id: &str) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| {
        let status = conn
            .query_row(
                "SELECT status FROM job_files WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(status)
    })
}

/// Lists the files of a job in creation order.
pub fn list_by_job(db: &Database, job_id: &str) -> Result<Vec<JobFileRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM job_files WHERE job_id = ?1 ORDER BY position ASC")?;
        let rows = stmt
            .query_map(params![job_id], JobFileRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Number of files already recorded for a job.
pub fn count_by_job(db: &Database, job_id: &str) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM job_files WHERE job_id = ?1",
            params![job_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
