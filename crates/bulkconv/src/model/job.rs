use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::Status;
use crate::error::TransitionError;

/// Upper bound on the length of a stored error detail, in characters.
pub const MAX_ERROR_DETAIL_LEN: usize = 2000;

/// A batch of documents submitted together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub file_count: usize,
    pub archive_path: Option<PathBuf>,
    /// Why no archive exists although some files converted.
    pub archive_error: Option<String>,
}

impl Job {
    pub fn new(file_count: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: Status::Pending,
            created_at: Utc::now(),
            completed_at: None,
            file_count,
            archive_path: None,
            archive_error: None,
        }
    }

    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(Status::InProgress)
    }

    /// Moves the job to its terminal status and stamps the completion time.
    pub fn finish(&mut self, status: Status) -> Result<(), TransitionError> {
        self.transition(status)?;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Whether a finished job has a package to offer.
    pub fn download_available(&self) -> bool {
        self.status == Status::Completed && self.archive_path.is_some()
    }

    fn transition(&mut self, next: Status) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                entity: "job",
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// One document inside a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFile {
    pub id: String,
    pub job_id: String,
    /// Zero-based creation order within the job.
    pub position: usize,
    pub filename: String,
    pub original_path: PathBuf,
    pub output_path: Option<PathBuf>,
    pub status: Status,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobFile {
    pub fn new(job_id: &str, position: usize, filename: &str, original_path: PathBuf) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            position,
            filename: filename.to_string(),
            original_path,
            output_path: None,
            status: Status::Pending,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn begin(&mut self) -> Result<(), TransitionError> {
        self.transition(Status::InProgress)
    }

    pub fn complete(&mut self, output_path: PathBuf) -> Result<(), TransitionError> {
        self.transition(Status::Completed)?;
        self.output_path = Some(output_path);
        self.error_message = None;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, detail: &str) -> Result<(), TransitionError> {
        self.transition(Status::Failed)?;
        self.output_path = None;
        self.error_message = Some(truncate_detail(detail));
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Outcome already recorded for a terminal file, if any.
    pub fn recorded_outcome(&self) -> Option<FileOutcome> {
        match self.status {
            Status::Completed => match &self.output_path {
                Some(path) => Some(FileOutcome::Completed {
                    output_path: path.clone(),
                }),
                None => Some(FileOutcome::Failed {
                    kind: FailureKind::Unexpected,
                    detail: "Completed without an output path".to_string(),
                }),
            },
            Status::Failed => Some(FileOutcome::Failed {
                kind: FailureKind::Unexpected,
                detail: self.error_message.clone().unwrap_or_default(),
            }),
            _ => None,
        }
    }

    /// Name offered when downloading the converted file: the upload's stem
    /// with the target extension.
    pub fn download_name(&self, extension: &str) -> String {
        let stem = Path::new(&self.filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document");
        format!("{}.{}", stem, extension)
    }

    fn transition(&mut self, next: Status) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                entity: "file",
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Category of a failed file conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    EngineFailure,
    Timeout,
    MissingOutput,
    Unexpected,
}

/// Result of driving one file through conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Completed { output_path: PathBuf },
    Failed { kind: FailureKind, detail: String },
}

impl FileOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, FileOutcome::Completed { .. })
    }
}

/// Aggregated result of processing every file of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub job_id: String,
    pub status: Status,
    pub succeeded: usize,
    pub failed: usize,
    pub archive_path: Option<PathBuf>,
    pub archive_error: Option<String>,
}

/// Cuts `detail` down to [`MAX_ERROR_DETAIL_LEN`] characters.
pub fn truncate_detail(detail: &str) -> String {
    let trimmed = detail.trim();
    if trimmed.chars().count() <= MAX_ERROR_DETAIL_LEN {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(MAX_ERROR_DETAIL_LEN - 3).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file() -> JobFile {
        JobFile::new("job-1", 0, "report.docx", PathBuf::from("/up/job-1/report.docx"))
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new(3);
        assert!(!job.id.is_empty());
        assert_eq!(job.status, Status::Pending);
        assert_eq!(job.file_count, 3);
        assert!(job.completed_at.is_none());
        assert!(job.archive_path.is_none());
    }

    #[test]
    fn test_job_finish_sets_completed_at() {
        let mut job = Job::new(1);
        job.start().unwrap();
        job.finish(Status::Completed).unwrap();
        assert_eq!(job.status, Status::Completed);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_job_cannot_finish_from_pending() {
        let mut job = Job::new(1);
        let err = job.finish(Status::Failed).unwrap_err();
        assert_eq!(err.from, Status::Pending);
        assert_eq!(err.to, Status::Failed);
        assert_eq!(job.status, Status::Pending);
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn test_job_terminal_is_final() {
        let mut job = Job::new(1);
        job.start().unwrap();
        job.finish(Status::Failed).unwrap();
        assert!(job.start().is_err());
        assert!(job.finish(Status::Completed).is_err());
    }

    #[test]
    fn test_download_available_requires_archive() {
        let mut job = Job::new(1);
        job.start().unwrap();
        job.finish(Status::Completed).unwrap();
        assert!(!job.download_available());
        job.archive_path = Some(PathBuf::from("/archives/a.zip"));
        assert!(job.download_available());
    }

    #[test]
    fn test_file_complete() {
        let mut file = sample_file();
        file.begin().unwrap();
        file.complete(PathBuf::from("/out/report.pdf")).unwrap();
        assert_eq!(file.status, Status::Completed);
        assert_eq!(file.output_path, Some(PathBuf::from("/out/report.pdf")));
        assert!(file.error_message.is_none());
        assert!(file.completed_at.is_some());
    }

    #[test]
    fn test_file_fail_records_detail() {
        let mut file = sample_file();
        file.begin().unwrap();
        file.fail("engine crashed").unwrap();
        assert_eq!(file.status, Status::Failed);
        assert_eq!(file.error_message.as_deref(), Some("engine crashed"));
        assert!(file.output_path.is_none());
    }

    #[test]
    fn test_file_cannot_complete_without_begin() {
        let mut file = sample_file();
        assert!(file.complete(PathBuf::from("/out/x.pdf")).is_err());
        assert!(file.output_path.is_none());
    }

    #[test]
    fn test_recorded_outcome() {
        let mut file = sample_file();
        assert!(file.recorded_outcome().is_none());
        file.begin().unwrap();
        assert!(file.recorded_outcome().is_none());
        file.complete(PathBuf::from("/out/report.pdf")).unwrap();
        assert_eq!(
            file.recorded_outcome(),
            Some(FileOutcome::Completed {
                output_path: PathBuf::from("/out/report.pdf")
            })
        );
    }

    #[test]
    fn test_download_name_uses_target_extension() {
        let file = sample_file();
        assert_eq!(file.download_name("pdf"), "report.pdf");
    }

    #[test]
    fn test_truncate_detail_bounds_length() {
        let long = "x".repeat(MAX_ERROR_DETAIL_LEN * 2);
        let truncated = truncate_detail(&long);
        assert_eq!(truncated.chars().count(), MAX_ERROR_DETAIL_LEN);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncate_detail("  short  "), "short");
    }
}
