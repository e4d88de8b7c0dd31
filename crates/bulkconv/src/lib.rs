pub mod config;
pub mod converter;
pub mod db;
pub mod error;
pub mod model;
pub mod progress;
pub mod repository;
pub mod sanitize;
pub mod service;
pub mod storage;
pub mod telemetry;
pub mod worker;

pub use config::{load_config, Config};
pub use converter::{DocumentConverter, SofficeConverter};
pub use error::{
    ArchiveError, BulkconvError, ConfigError, ConversionError, DispatchError, LookupError,
    OrchestratorError, Result, StorageError, SubmitError,
};
pub use model::{FailureKind, Job, JobFile, JobSummary, Status};
pub use progress::{BroadcastProgress, JobProgressEvent, NoopProgress, ProgressEvent, ProgressReporter};
pub use repository::{JobRepository, MemoryRepository, RepositoryError, SqliteRepository};
pub use service::{Download, JobService, JobStatusView, SubmittedJob, UploadedFile};
pub use storage::{ArchiveBuilder, StorageLayout};
pub use telemetry::init_logging;
pub use worker::{Dispatcher, JobOrchestrator, ProcessOutcome, WorkerPool};
