use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::{check_batch, JobRepository, RepositoryError};
use crate::db::file_repo::{self, JobFileRow};
use crate::db::job_repo::{self, JobRow};
use crate::db::{Database, DatabaseError};
use crate::model::{Job, JobFile, Status};

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_timestamp(
    table: &'static str,
    id: &str,
    s: &str,
) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::CorruptRow {
            table,
            id: id.to_string(),
            reason: format!("bad timestamp '{}': {}", s, e),
        })
}

fn parse_status(table: &'static str, id: &str, s: &str) -> Result<Status, DatabaseError> {
    s.parse().map_err(|reason| DatabaseError::CorruptRow {
        table,
        id: id.to_string(),
        reason,
    })
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn job_to_row(job: &Job) -> JobRow {
    JobRow {
        id: job.id.clone(),
        status: job.status.as_str().to_string(),
        created_at: format_timestamp(job.created_at),
        completed_at: job.completed_at.map(format_timestamp),
        file_count: job.file_count as i64,
        archive_path: job.archive_path.as_deref().map(path_to_string),
        archive_error: job.archive_error.clone(),
    }
}

fn job_from_row(row: JobRow) -> Result<Job, DatabaseError> {
    let completed_at = row
        .completed_at
        .as_deref()
        .map(|s| parse_timestamp("jobs", &row.id, s))
        .transpose()?;
    Ok(Job {
        status: parse_status("jobs", &row.id, &row.status)?,
        created_at: parse_timestamp("jobs", &row.id, &row.created_at)?,
        completed_at,
        file_count: row.file_count.max(0) as usize,
        archive_path: row.archive_path.map(PathBuf::from),
        archive_error: row.archive_error,
        id: row.id,
    })
}

fn file_to_row(file: &JobFile) -> JobFileRow {
    JobFileRow {
        id: file.id.clone(),
        job_id: file.job_id.clone(),
        position: file.position as i64,
        filename: file.filename.clone(),
        original_path: path_to_string(&file.original_path),
        output_path: file.output_path.as_deref().map(path_to_string),
        status: file.status.as_str().to_string(),
        error_message: file.error_message.clone(),
        created_at: format_timestamp(file.created_at),
        completed_at: file.completed_at.map(format_timestamp),
    }
}

fn file_from_row(row: JobFileRow) -> Result<JobFile, DatabaseError> {
    let completed_at = row
        .completed_at
        .as_deref()
        .map(|s| parse_timestamp("job_files", &row.id, s))
        .transpose()?;
    Ok(JobFile {
        status: parse_status("job_files", &row.id, &row.status)?,
        created_at: parse_timestamp("job_files", &row.id, &row.created_at)?,
        completed_at,
        position: row.position.max(0) as usize,
        original_path: PathBuf::from(row.original_path),
        output_path: row.output_path.map(PathBuf::from),
        error_message: row.error_message,
        filename: row.filename,
        job_id: row.job_id,
        id: row.id,
    })
}

fn status_strings(statuses: &[Status]) -> Vec<&'static str> {
    statuses.iter().map(|s| s.as_str()).collect()
}

/// [`JobRepository`] backed by the SQLite [`Database`].
#[derive(Clone)]
pub struct SqliteRepository {
    db: Database,
}

impl SqliteRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl JobRepository for SqliteRepository {
    fn create_job(&self, file_count: usize) -> Result<Job, RepositoryError> {
        let job = Job::new(file_count);
        job_repo::insert(&self.db, &job_to_row(&job))?;
        Ok(job)
    }

    fn create_job_with_files(&self, job: &Job, files: &[JobFile]) -> Result<(), RepositoryError> {
        check_batch(job, files)?;
        let job_row = job_to_row(job);
        let file_rows: Vec<JobFileRow> = files.iter().map(file_to_row).collect();

        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            job_repo::insert_on(&tx, &job_row)?;
            for row in &file_rows {
                file_repo::insert_on(&tx, row)?;
            }
            tx.commit()?;
            Ok(())
        })?;
        Ok(())
    }

    fn create_job_file(
        &self,
        job_id: &str,
        filename: &str,
        input_path: &Path,
    ) -> Result<JobFile, RepositoryError> {
        let job = self
            .get_job(job_id)?
            .ok_or_else(|| RepositoryError::JobNotFound(job_id.to_string()))?;

        let existing = file_repo::count_by_job(&self.db, job_id)?.max(0) as usize;
        if existing >= job.file_count {
            return Err(RepositoryError::FileCountExceeded {
                job_id: job_id.to_string(),
                file_count: job.file_count,
            });
        }

        let file = JobFile::new(job_id, existing, filename, input_path.to_path_buf());
        file_repo::insert(&self.db, &file_to_row(&file))?;
        Ok(file)
    }

    fn get_job(&self, id: &str) -> Result<Option<Job>, RepositoryError> {
        match job_repo::find_by_id(&self.db, id)? {
            Some(row) => Ok(Some(job_from_row(row)?)),
            None => Ok(None),
        }
    }

    fn get_job_files(&self, job_id: &str) -> Result<Vec<JobFile>, RepositoryError> {
        let rows = file_repo::list_by_job(&self.db, job_id)?;
        let files = rows
            .into_iter()
            .map(file_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(files)
    }

    fn save_job(&self, job: &Job) -> Result<(), RepositoryError> {
        let expected = status_strings(&job.status.predecessors());
        let changed = job_repo::update_guarded(&self.db, &job_to_row(job), &expected)?;
        if changed == 0 {
            return match job_repo::find_status(&self.db, &job.id)? {
                Some(stored) => Err(RepositoryError::StaleTransition {
                    entity: "job",
                    id: job.id.clone(),
                    stored,
                    attempted: job.status,
                }),
                None => Err(RepositoryError::JobNotFound(job.id.clone())),
            };
        }
        Ok(())
    }

    fn save_job_file(&self, file: &JobFile) -> Result<(), RepositoryError> {
        let expected = status_strings(&file.status.predecessors());
        let changed = file_repo::update_guarded(&self.db, &file_to_row(file), &expected)?;
        if changed == 0 {
            return match file_repo::find_status(&self.db, &file.id)? {
                Some(stored) => Err(RepositoryError::StaleTransition {
                    entity: "file",
                    id: file.id.clone(),
                    stored,
                    attempted: file.status,
                }),
                None => Err(RepositoryError::FileNotFound(file.id.clone())),
            };
        }
        Ok(())
    }

    fn list_unfinished_jobs(&self) -> Result<Vec<Job>, RepositoryError> {
        let rows = job_repo::list_by_statuses(
            &self.db,
            &status_strings(&[Status::Pending, Status::InProgress]),
        )?;
        let jobs = rows
            .into_iter()
            .map(job_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }
}
