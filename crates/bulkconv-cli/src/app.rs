use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use bulkconv::db::Database;
use bulkconv::{
    BulkconvError, Config, Dispatcher, JobOrchestrator, JobRepository, JobService,
    NoopProgress, ProgressReporter, SofficeConverter, SqliteRepository, StorageLayout, WorkerPool,
};

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Bulkconv(#[from] BulkconvError),

    #[error("Failed to read '{path}': {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// Converts a library error into [`CliError`] for use with `map_err`.
pub fn from_lib<E: Into<BulkconvError>>(err: E) -> CliError {
    CliError::Bulkconv(err.into())
}

/// Everything the commands share: configuration, storage and the database.
pub struct App {
    pub config: Config,
    pub repository: Arc<dyn JobRepository>,
    pub layout: StorageLayout,
}

impl App {
    pub fn open(config: Config) -> Result<Self, CliError> {
        let layout = StorageLayout::new(&config.storage);
        layout.ensure_base_dirs().map_err(from_lib)?;

        let db = Database::open(&config.database.path).map_err(from_lib)?;
        let repository: Arc<dyn JobRepository> = Arc::new(SqliteRepository::new(db));

        Ok(Self {
            config,
            repository,
            layout,
        })
    }

    pub fn orchestrator(&self, progress: Option<Arc<dyn ProgressReporter>>) -> JobOrchestrator {
        let converter = Arc::new(SofficeConverter::new(&self.config.converter));
        JobOrchestrator::new(self.repository.clone(), converter, self.layout.clone())
            .with_progress(progress.unwrap_or_else(|| Arc::new(NoopProgress)))
            .with_file_concurrency(self.config.workers.file_concurrency)
    }

    pub fn pool(&self, orchestrator: JobOrchestrator) -> Result<WorkerPool, CliError> {
        WorkerPool::new(
            Arc::new(orchestrator),
            self.repository.clone(),
            self.config.workers.worker_count,
            self.config.workers.queue_capacity,
        )
        .map_err(from_lib)
    }

    pub fn service(&self, dispatcher: Arc<dyn Dispatcher>) -> JobService {
        JobService::new(
            self.repository.clone(),
            dispatcher,
            self.layout.clone(),
            self.config.limits.clone(),
            self.config.converter.target_format.clone(),
        )
    }
}
