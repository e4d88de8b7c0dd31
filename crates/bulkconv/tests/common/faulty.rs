//! A repository wrapper that fails chosen writes.
//!
//! Faults are consumed as they fire, so a fault with `times: 1` models a
//! transient outage and `usize::MAX` a permanent one.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use bulkconv::repository::RepositoryError;
use bulkconv::{Job, JobFile, JobRepository, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Listing a job's files fails.
    ListFiles,
    /// Recording a new job fails.
    CreateJob,
    /// Terminal writes for the named file fail.
    SettleFile { filename: &'static str, times: usize },
    /// Writes moving a job to `status` fail.
    SaveJob { status: Status, times: usize },
}

pub const ALWAYS: usize = usize::MAX;

type Hook = Box<dyn Fn() + Send + Sync>;

pub struct FaultyRepository {
    inner: Arc<dyn JobRepository>,
    faults: Mutex<Vec<Fault>>,
    around_create: Option<Hook>,
}

impl FaultyRepository {
    pub fn new(inner: Arc<dyn JobRepository>, faults: &[Fault]) -> Self {
        Self {
            inner,
            faults: Mutex::new(faults.to_vec()),
            around_create: None,
        }
    }

    /// Runs `hook` right before and right after every create call, the way a
    /// recovery scan on another thread could interleave with a submission.
    pub fn with_create_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.around_create = Some(Box::new(hook));
        self
    }

    fn trip(&self, applies: impl Fn(&Fault) -> bool) -> Result<(), RepositoryError> {
        let mut faults = self.faults.lock().unwrap();
        for fault in faults.iter_mut() {
            if !applies(&*fault) {
                continue;
            }
            match fault {
                Fault::SettleFile { times, .. } | Fault::SaveJob { times, .. } => {
                    if *times == 0 {
                        continue;
                    }
                    if *times != ALWAYS {
                        *times -= 1;
                    }
                }
                Fault::ListFiles | Fault::CreateJob => {}
            }
            return Err(RepositoryError::Unavailable(format!("disk full ({:?})", fault)));
        }
        Ok(())
    }

    fn hook(&self) {
        if let Some(hook) = &self.around_create {
            hook();
        }
    }

    fn around<T>(&self, create: impl FnOnce() -> Result<T, RepositoryError>) -> Result<T, RepositoryError> {
        self.hook();
        let created = create();
        self.hook();
        created
    }
}

impl JobRepository for FaultyRepository {
    fn create_job(&self, file_count: usize) -> Result<Job, RepositoryError> {
        self.around(|| {
            self.trip(|f| *f == Fault::CreateJob)?;
            self.inner.create_job(file_count)
        })
    }

    fn create_job_with_files(&self, job: &Job, files: &[JobFile]) -> Result<(), RepositoryError> {
        self.around(|| {
            self.trip(|f| *f == Fault::CreateJob)?;
            self.inner.create_job_with_files(job, files)
        })
    }

    fn create_job_file(
        &self,
        job_id: &str,
        filename: &str,
        input_path: &Path,
    ) -> Result<JobFile, RepositoryError> {
        self.around(|| self.inner.create_job_file(job_id, filename, input_path))
    }

    fn get_job(&self, id: &str) -> Result<Option<Job>, RepositoryError> {
        self.inner.get_job(id)
    }

    fn get_job_files(&self, job_id: &str) -> Result<Vec<JobFile>, RepositoryError> {
        self.trip(|f| *f == Fault::ListFiles)?;
        self.inner.get_job_files(job_id)
    }

    fn save_job(&self, job: &Job) -> Result<(), RepositoryError> {
        self.trip(|f| matches!(f, Fault::SaveJob { status, .. } if *status == job.status))?;
        self.inner.save_job(job)
    }

    fn save_job_file(&self, file: &JobFile) -> Result<(), RepositoryError> {
        if file.status.is_terminal() {
            self.trip(
                |f| matches!(f, Fault::SettleFile { filename, .. } if *filename == file.filename),
            )?;
        }
        self.inner.save_job_file(file)
    }

    fn list_unfinished_jobs(&self) -> Result<Vec<Job>, RepositoryError> {
        self.inner.list_unfinished_jobs()
    }
}
