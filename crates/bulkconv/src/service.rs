//! Submission and read access for conversion jobs.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{error, info};
use serde::Serialize;

use crate::config::LimitsConfig;
use crate::error::{LookupError, StorageError, SubmitError};
use crate::model::{Job, JobFile, Status};
use crate::repository::JobRepository;
use crate::sanitize;
use crate::storage::StorageLayout;
use crate::worker::Dispatcher;

/// A document as received from a client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmittedJob {
    pub job_id: String,
    pub file_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileStatusView {
    pub filename: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub download_available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub job_id: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub file_count: usize,
    pub download_available: bool,
    /// Set when files converted but packaging them failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_error: Option<String>,
    pub files: Vec<FileStatusView>,
}

/// A file ready to be handed to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub path: PathBuf,
    pub download_name: String,
    pub media_type: &'static str,
}

fn media_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "odt" => "application/vnd.oasis.opendocument.text",
        "html" => "text/html",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

pub struct JobService {
    repository: Arc<dyn JobRepository>,
    dispatcher: Arc<dyn Dispatcher>,
    layout: StorageLayout,
    limits: LimitsConfig,
    target_extension: String,
}

impl JobService {
    pub fn new(
        repository: Arc<dyn JobRepository>,
        dispatcher: Arc<dyn Dispatcher>,
        layout: StorageLayout,
        limits: LimitsConfig,
        target_extension: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            dispatcher,
            layout,
            limits,
            target_extension: target_extension.into(),
        }
    }

    /// Validates a batch, stages it under `uploads/<job_id>/`, records the
    /// job with all of its files and hands it to the dispatcher.
    ///
    /// Nothing is recorded when validation or staging fails, and the job and
    /// its files are stored in one repository call. If dispatching fails the
    /// job stays PENDING and is picked up by the next recovery pass.
    pub fn submit_job(&self, files: Vec<UploadedFile>) -> Result<SubmittedJob, SubmitError> {
        self.validate(&files)?;

        let job = Job::new(files.len());
        let job_files = match self.stage_files(&job, &files) {
            Ok(job_files) => job_files,
            Err(e) => {
                error!("Failed to stage job {}: {}", job.id, e);
                self.layout.discard_uploads(&job.id);
                return Err(e.into());
            }
        };

        if let Err(e) = self.repository.create_job_with_files(&job, &job_files) {
            error!("Failed to record job {}: {}", job.id, e);
            self.layout.discard_uploads(&job.id);
            return Err(e.into());
        }

        info!("Accepted job {} with {} files", job.id, files.len());
        self.dispatcher.dispatch(&job.id)?;

        Ok(SubmittedJob {
            job_id: job.id,
            file_count: files.len(),
        })
    }

    fn validate(&self, files: &[UploadedFile]) -> Result<(), SubmitError> {
        if files.len() > self.limits.max_files_per_job {
            return Err(SubmitError::TooManyFiles {
                max: self.limits.max_files_per_job,
            });
        }

        let mut seen = HashSet::new();
        for file in files {
            if !sanitize::is_safe_filename(&file.filename) {
                return Err(SubmitError::InvalidFilename(file.filename.clone()));
            }
            if !self.limits.allows(&file.filename) {
                return Err(SubmitError::InvalidFileType {
                    filename: file.filename.clone(),
                    allowed: self.limits.allowed_extensions.join(", "),
                });
            }
            if file.content.len() as u64 > self.limits.max_file_size {
                return Err(SubmitError::FileTooLarge {
                    filename: file.filename.clone(),
                    max: self.limits.max_file_size,
                });
            }
            if !seen.insert(file.filename.as_str()) {
                return Err(SubmitError::DuplicateFilename(file.filename.clone()));
            }
        }
        Ok(())
    }

    fn stage_files(
        &self,
        job: &Job,
        files: &[UploadedFile],
    ) -> Result<Vec<JobFile>, StorageError> {
        files
            .iter()
            .enumerate()
            .map(|(position, file)| {
                let path = self
                    .layout
                    .stage_upload(&job.id, &file.filename, &file.content)?;
                Ok(JobFile::new(&job.id, position, &file.filename, path))
            })
            .collect()
    }

    fn load_job(&self, job_id: &str) -> Result<Job, LookupError> {
        if uuid::Uuid::parse_str(job_id).is_err() {
            return Err(LookupError::InvalidJobId(job_id.to_string()));
        }
        self.repository
            .get_job(job_id)?
            .ok_or_else(|| LookupError::JobNotFound(job_id.to_string()))
    }

    pub fn job_status(&self, job_id: &str) -> Result<JobStatusView, LookupError> {
        let job = self.load_job(job_id)?;
        let files = self.repository.get_job_files(job_id)?;

        Ok(JobStatusView {
            download_available: job.download_available(),
            job_id: job.id,
            status: job.status,
            created_at: job.created_at,
            completed_at: job.completed_at,
            file_count: job.file_count,
            archive_error: job.archive_error,
            files: files.into_iter().map(file_view).collect(),
        })
    }

    /// The job's ZIP archive, once the job is COMPLETED and the archive exists.
    pub fn archive_for_download(&self, job_id: &str) -> Result<Download, LookupError> {
        let job = self.load_job(job_id)?;
        if job.status != Status::Completed {
            return Err(LookupError::JobNotCompleted(job.status));
        }

        let path = match job.archive_path {
            Some(path) => path,
            None => {
                return Err(LookupError::ArchiveUnavailable(
                    job.archive_error
                        .unwrap_or_else(|| "no file converted successfully".to_string()),
                ))
            }
        };
        if !path.is_file() {
            return Err(LookupError::ArchiveUnavailable(format!(
                "archive file not found at {}",
                path.display()
            )));
        }

        Ok(Download {
            path,
            download_name: format!("converted_files_{}.zip", job.id),
            media_type: media_type_for("zip"),
        })
    }

    /// A single converted document, looked up by its uploaded filename.
    pub fn file_for_download(&self, job_id: &str, filename: &str) -> Result<Download, LookupError> {
        self.load_job(job_id)?;
        let file = self
            .repository
            .get_job_files(job_id)?
            .into_iter()
            .find(|f| f.filename == filename)
            .ok_or_else(|| LookupError::FileNotFound {
                job_id: job_id.to_string(),
                filename: filename.to_string(),
            })?;

        if file.status != Status::Completed {
            return Err(LookupError::FileNotCompleted(file.status));
        }
        let path = file
            .output_path
            .clone()
            .filter(|p| p.is_file())
            .ok_or_else(|| {
                LookupError::OutputMissing(file.output_path.clone().unwrap_or_default())
            })?;

        Ok(Download {
            path,
            download_name: file.download_name(&self.target_extension),
            media_type: media_type_for(&self.target_extension),
        })
    }
}

fn file_view(file: JobFile) -> FileStatusView {
    FileStatusView {
        download_available: file.status == Status::Completed && file.output_path.is_some(),
        filename: file.filename,
        status: file.status,
        error_message: file.error_message,
    }
}
