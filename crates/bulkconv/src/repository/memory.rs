use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{check_batch, JobRepository, RepositoryError};
use crate::model::{Job, JobFile, Status};

#[derive(Default)]
struct Tables {
    jobs: HashMap<String, Job>,
    /// Files per job, kept in position order.
    files: HashMap<String, Vec<JobFile>>,
}

/// Process-local [`JobRepository`]. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("memory store lock poisoned".to_string()))
    }
}

fn check_guard(
    entity: &'static str,
    id: &str,
    stored: Status,
    attempted: Status,
) -> Result<(), RepositoryError> {
    if attempted.predecessors().contains(&stored) {
        Ok(())
    } else {
        Err(RepositoryError::StaleTransition {
            entity,
            id: id.to_string(),
            stored: stored.as_str().to_string(),
            attempted,
        })
    }
}

impl JobRepository for MemoryRepository {
    fn create_job(&self, file_count: usize) -> Result<Job, RepositoryError> {
        let job = Job::new(file_count);
        let mut tables = self.lock()?;
        tables.jobs.insert(job.id.clone(), job.clone());
        tables.files.insert(job.id.clone(), Vec::new());
        Ok(job)
    }

    fn create_job_with_files(&self, job: &Job, files: &[JobFile]) -> Result<(), RepositoryError> {
        check_batch(job, files)?;
        let mut tables = self.lock()?;
        if tables.jobs.contains_key(&job.id) {
            return Err(RepositoryError::InvalidBatch {
                job_id: job.id.clone(),
                reason: "job already exists".to_string(),
            });
        }
        tables.jobs.insert(job.id.clone(), job.clone());
        tables.files.insert(job.id.clone(), files.to_vec());
        Ok(())
    }

    fn create_job_file(
        &self,
        job_id: &str,
        filename: &str,
        input_path: &Path,
    ) -> Result<JobFile, RepositoryError> {
        let mut tables = self.lock()?;
        let file_count = tables
            .jobs
            .get(job_id)
            .map(|job| job.file_count)
            .ok_or_else(|| RepositoryError::JobNotFound(job_id.to_string()))?;

        let files = tables.files.entry(job_id.to_string()).or_default();
        if files.len() >= file_count {
            return Err(RepositoryError::FileCountExceeded {
                job_id: job_id.to_string(),
                file_count,
            });
        }

        let file = JobFile::new(job_id, files.len(), filename, input_path.to_path_buf());
        files.push(file.clone());
        Ok(file)
    }

    fn get_job(&self, id: &str) -> Result<Option<Job>, RepositoryError> {
        Ok(self.lock()?.jobs.get(id).cloned())
    }

    fn get_job_files(&self, job_id: &str) -> Result<Vec<JobFile>, RepositoryError> {
        Ok(self
            .lock()?
            .files
            .get(job_id)
            .cloned()
            .unwrap_or_default())
    }

    fn save_job(&self, job: &Job) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        let stored = tables
            .jobs
            .get_mut(&job.id)
            .ok_or_else(|| RepositoryError::JobNotFound(job.id.clone()))?;
        check_guard("job", &job.id, stored.status, job.status)?;

        stored.status = job.status;
        stored.completed_at = job.completed_at;
        stored.archive_path = job.archive_path.clone();
        stored.archive_error = job.archive_error.clone();
        Ok(())
    }

    fn save_job_file(&self, file: &JobFile) -> Result<(), RepositoryError> {
        let mut tables = self.lock()?;
        let stored = tables
            .files
            .get_mut(&file.job_id)
            .and_then(|files| files.iter_mut().find(|f| f.id == file.id))
            .ok_or_else(|| RepositoryError::FileNotFound(file.id.clone()))?;
        check_guard("file", &file.id, stored.status, file.status)?;

        stored.status = file.status;
        stored.output_path = file.output_path.clone();
        stored.error_message = file.error_message.clone();
        stored.completed_at = file.completed_at;
        Ok(())
    }

    fn list_unfinished_jobs(&self) -> Result<Vec<Job>, RepositoryError> {
        let tables = self.lock()?;
        let mut jobs: Vec<Job> = tables
            .jobs
            .values()
            .filter(|job| !job.status.is_terminal())
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }
}
