use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::model::Status;

#[derive(Error, Debug)]
pub enum BulkconvError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Submission error: {0}")]
    Submit(#[from] SubmitError),

    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Repository error: {0}")]
    Repository(#[from] crate::repository::RepositoryError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid value '{value}' for environment variable {name}")]
    InvalidEnv { name: String, value: String },
}

/// A rejected status change on a job or file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Illegal {entity} transition for '{id}': {from} -> {to}")]
pub struct TransitionError {
    pub entity: &'static str,
    pub id: String,
    pub from: Status,
    pub to: Status,
}

/// Failure of a single conversion attempt.
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Conversion engine failed: {diagnostic}")]
    EngineFailure { diagnostic: String },

    #[error("Conversion timeout after {}s - file may be too large or complex", .0.as_secs())]
    Timeout(Duration),

    #[error("Conversion engine reported success but no output was created at '{expected}'")]
    MissingOutput { expected: PathBuf },

    #[error("Input file '{path}' is not readable: {source}")]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Conversion I/O error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File already exists: {0}")]
    FileExists(PathBuf),
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("No converted outputs were available to archive")]
    Empty,

    #[error("Failed to create archive directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read output '{path}': {source}")]
    ReadOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to finalize archive '{path}': {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Rejections raised synchronously while accepting a batch.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Too many files. Maximum allowed: {max}")]
    TooManyFiles { max: usize },

    #[error("Invalid file type: {filename}. Allowed extensions: {allowed}")]
    InvalidFileType { filename: String, allowed: String },

    #[error("File too large: {filename}. Maximum size: {max} bytes")]
    FileTooLarge { filename: String, max: u64 },

    #[error("Invalid filename: '{0}'")]
    InvalidFilename(String),

    #[error("Duplicate filename in batch: {0}")]
    DuplicateFilename(String),

    #[error("Failed to stage upload: {0}")]
    Staging(#[from] StorageError),

    #[error("Repository error: {0}")]
    Repository(#[from] crate::repository::RepositoryError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Read-side failures when resolving downloads.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Invalid job ID format: {0}")]
    InvalidJobId(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("File '{filename}' not found in job {job_id}")]
    FileNotFound { job_id: String, filename: String },

    #[error("Job is not completed yet (status {0})")]
    JobNotCompleted(Status),

    #[error("File conversion is not completed yet (status {0})")]
    FileNotCompleted(Status),

    #[error("Archive not available: {0}")]
    ArchiveUnavailable(String),

    #[error("Converted file missing on disk: {0}")]
    OutputMissing(PathBuf),

    #[error("Repository error: {0}")]
    Repository(#[from] crate::repository::RepositoryError),
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Repository error: {0}")]
    Repository(#[from] crate::repository::RepositoryError),

    #[error("Invalid state transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("Failed to prepare output directory '{path}': {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Job {job_id} declares {declared} files but {found} are stored")]
    IncompleteFileSet {
        job_id: String,
        declared: usize,
        found: usize,
    },

    #[error("File {file_id} of job {job_id} is still {status}")]
    UnsettledFile {
        job_id: String,
        file_id: String,
        status: crate::model::Status,
    },
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Work queue is full ({capacity} jobs waiting)")]
    QueueFull { capacity: usize },
}

pub type Result<T> = std::result::Result<T, BulkconvError>;
