//! Test harness for isolated orchestration runs.
//!
//! Each `TestHarness` owns a temp directory laid out like a deployment
//! (`uploads/`, `outputs/`, `archives/`), an in-memory SQLite repository and
//! a [`StubConverter`].

#![allow(dead_code)]

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use bulkconv::db::Database;
use bulkconv::{
    Job, JobFile, JobOrchestrator, JobRepository, SqliteRepository, Status, StorageLayout,
};

use super::StubConverter;

pub struct TestHarness {
    temp_dir: TempDir,
    pub layout: StorageLayout,
    pub db: Database,
    pub repo: Arc<SqliteRepository>,
    pub converter: Arc<StubConverter>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_converter(StubConverter::new())
    }

    pub fn with_converter(converter: StubConverter) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let layout = StorageLayout::under(temp_dir.path());
        layout
            .ensure_base_dirs()
            .expect("Failed to create storage directories");
        let db = Database::open_in_memory().expect("Failed to open in-memory database");

        Self {
            temp_dir,
            layout,
            repo: Arc::new(SqliteRepository::new(db.clone())),
            db,
            converter: Arc::new(converter),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Orchestrator over this harness' repository, converter and storage.
    pub fn orchestrator(&self) -> JobOrchestrator {
        JobOrchestrator::new(
            self.repo.clone(),
            self.converter.clone(),
            self.layout.clone(),
        )
    }

    /// Stages one upload per name and records a PENDING job for them.
    pub fn create_job(&self, filenames: &[&str]) -> Job {
        let job = Job::new(filenames.len());
        let files: Vec<JobFile> = filenames
            .iter()
            .enumerate()
            .map(|(position, name)| {
                let path = self
                    .layout
                    .stage_upload(&job.id, name, format!("content of {}", name).as_bytes())
                    .expect("Failed to stage upload");
                JobFile::new(&job.id, position, name, path)
            })
            .collect();
        self.repo
            .create_job_with_files(&job, &files)
            .expect("Failed to create job");
        job
    }

    /// Records a job whose inputs live in separate directories, so the same
    /// filename can appear more than once.
    pub fn create_job_with_duplicates(&self, filenames: &[&str]) -> Job {
        let job = Job::new(filenames.len());
        let files: Vec<JobFile> = filenames
            .iter()
            .enumerate()
            .map(|(position, name)| {
                let dir = self.layout.job_upload_dir(&job.id).join(position.to_string());
                std::fs::create_dir_all(&dir).expect("Failed to create upload dir");
                let path = dir.join(name);
                std::fs::write(&path, format!("copy {}", position))
                    .expect("Failed to write upload");
                JobFile::new(&job.id, position, name, path)
            })
            .collect();
        self.repo
            .create_job_with_files(&job, &files)
            .expect("Failed to create job");
        job
    }

    pub fn job(&self, job_id: &str) -> Job {
        self.repo
            .get_job(job_id)
            .expect("Failed to load job")
            .expect("Job missing")
    }

    pub fn files(&self, job_id: &str) -> Vec<JobFile> {
        self.repo
            .get_job_files(job_id)
            .expect("Failed to load job files")
    }

    pub fn file_statuses(&self, job_id: &str) -> Vec<Status> {
        self.files(job_id).into_iter().map(|f| f.status).collect()
    }

    /// Number of rows in `jobs` and `job_files`, whatever their status.
    pub fn row_counts(&self) -> (u32, u32) {
        self.db
            .with_conn(|conn| {
                let jobs = conn.query_row("SELECT COUNT(*) FROM jobs", [], |r| r.get(0))?;
                let files = conn.query_row("SELECT COUNT(*) FROM job_files", [], |r| r.get(0))?;
                Ok((jobs, files))
            })
            .expect("Failed to count rows")
    }

    /// Entry names of a ZIP archive, in stored order.
    pub fn archive_entries(&self, path: &Path) -> Vec<String> {
        let file = File::open(path).expect("Failed to open archive");
        let mut archive = zip::ZipArchive::new(file).expect("Failed to read archive");
        (0..archive.len())
            .map(|i| {
                archive
                    .by_index(i)
                    .expect("Failed to read archive entry")
                    .name()
                    .to_string()
            })
            .collect()
    }

    /// Every file directly inside the archive directory.
    pub fn archive_dir_listing(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.layout.archive_dir())
            .expect("Failed to list archive directory")
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect()
    }
}
