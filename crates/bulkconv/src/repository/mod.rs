//! Storage boundary for job and file records.
//!
//! The engine only talks to [`JobRepository`]; [`SqliteRepository`] is the
//! durable adapter and [`MemoryRepository`] serves embedding and tests.
//! Both enforce monotonic status changes on `save_*`.

use std::path::Path;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::model::{Job, JobFile, Status};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryRepository;
pub use sqlite::SqliteRepository;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Job {job_id} already has all {file_count} declared files")]
    FileCountExceeded { job_id: String, file_count: usize },

    #[error("Rejected {entity} write for '{id}': stored status {stored} cannot become {attempted}")]
    StaleTransition {
        entity: &'static str,
        id: String,
        stored: String,
        attempted: Status,
    },

    #[error("Rejected batch for job {job_id}: {reason}")]
    InvalidBatch { job_id: String, reason: String },

    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

/// Checks that `files` is exactly the PENDING file set `job` declares.
pub(crate) fn check_batch(job: &Job, files: &[JobFile]) -> Result<(), RepositoryError> {
    let reject = |reason: String| {
        Err(RepositoryError::InvalidBatch {
            job_id: job.id.clone(),
            reason,
        })
    };

    if job.status != Status::Pending {
        return reject(format!("job is {} rather than PENDING", job.status));
    }
    if files.len() != job.file_count {
        return reject(format!(
            "job declares {} files but {} were supplied",
            job.file_count,
            files.len()
        ));
    }
    for (position, file) in files.iter().enumerate() {
        if file.job_id != job.id {
            return reject(format!("file {} belongs to job {}", file.id, file.job_id));
        }
        if file.position != position || file.status != Status::Pending {
            return reject(format!(
                "file {} must be PENDING at position {}",
                file.id, position
            ));
        }
    }
    Ok(())
}

/// CRUD access to jobs and their files.
///
/// Implementations must offer read-after-write consistency within a process.
pub trait JobRepository: Send + Sync {
    /// Creates a PENDING job declaring `file_count` files.
    fn create_job(&self, file_count: usize) -> Result<Job, RepositoryError>;

    /// Stores a PENDING job together with all of its files in one step.
    ///
    /// Either every row becomes visible or none does, so a recovery scan never
    /// sees a job whose file set is still being written.
    fn create_job_with_files(&self, job: &Job, files: &[JobFile]) -> Result<(), RepositoryError>;

    /// Appends a PENDING file to a job; position follows creation order.
    fn create_job_file(
        &self,
        job_id: &str,
        filename: &str,
        input_path: &Path,
    ) -> Result<JobFile, RepositoryError>;

    fn get_job(&self, id: &str) -> Result<Option<Job>, RepositoryError>;

    /// Files of a job in creation order.
    fn get_job_files(&self, job_id: &str) -> Result<Vec<JobFile>, RepositoryError>;

    /// Persists the mutable fields of `job`. Fails with
    /// [`RepositoryError::StaleTransition`] if the stored status cannot move
    /// to `job.status`.
    fn save_job(&self, job: &Job) -> Result<(), RepositoryError>;

    /// Persists the mutable fields of `file`, with the same guard as `save_job`.
    fn save_job_file(&self, file: &JobFile) -> Result<(), RepositoryError>;

    /// Jobs still PENDING or IN_PROGRESS, oldest first.
    fn list_unfinished_jobs(&self) -> Result<Vec<Job>, RepositoryError>;
}
