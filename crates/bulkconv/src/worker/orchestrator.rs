use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{error, info, info_span, warn};

use super::unit::FileConversionUnit;
use crate::converter::DocumentConverter;
use crate::error::OrchestratorError;
use crate::model::{FileOutcome, Job, JobFile, JobSummary, Status};
use crate::progress::{NoopProgress, ProgressEvent, ProgressReporter};
use crate::repository::JobRepository;
use crate::storage::{ArchiveBuilder, StorageLayout};

/// What a call to [`JobOrchestrator::process`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// No job with that id; nothing was touched.
    NotFound,
    /// The job was already terminal; nothing was touched.
    AlreadyFinished(Status),
    Finished(JobSummary),
}

/// Runs every file of a job through conversion and settles the job.
pub struct JobOrchestrator {
    repository: Arc<dyn JobRepository>,
    converter: Arc<dyn DocumentConverter>,
    archiver: ArchiveBuilder,
    layout: StorageLayout,
    progress: Arc<dyn ProgressReporter>,
    file_concurrency: usize,
}

impl JobOrchestrator {
    pub fn new(
        repository: Arc<dyn JobRepository>,
        converter: Arc<dyn DocumentConverter>,
        layout: StorageLayout,
    ) -> Self {
        Self {
            repository,
            converter,
            archiver: ArchiveBuilder::new(layout.archive_dir()),
            layout,
            progress: Arc::new(NoopProgress),
            file_concurrency: 1,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Number of files of one job converted at the same time. Values below
    /// one are treated as one.
    pub fn with_file_concurrency(mut self, file_concurrency: usize) -> Self {
        self.file_concurrency = file_concurrency.max(1);
        self
    }

    pub fn with_archiver(mut self, archiver: ArchiveBuilder) -> Self {
        self.archiver = archiver;
        self
    }

    /// Processes a job to a terminal status.
    ///
    /// Safe to call more than once for the same id: a finished job is left
    /// alone and an interrupted one picks up where it stopped.
    pub fn process(&self, job_id: &str) -> Result<ProcessOutcome, OrchestratorError> {
        let _span = info_span!("process_job", job_id = %job_id).entered();

        let Some(mut job) = self.repository.get_job(job_id)? else {
            warn!("Job not found");
            return Ok(ProcessOutcome::NotFound);
        };
        if job.status.is_terminal() {
            info!(status = %job.status, "Job already finished");
            return Ok(ProcessOutcome::AlreadyFinished(job.status));
        }

        let mut files = self.repository.get_job_files(job_id)?;
        if files.len() != job.file_count {
            // The file set is not all there; leave the job for a later pass.
            error!(
                declared = job.file_count,
                found = files.len(),
                "Refusing to process job with an incomplete file set"
            );
            return Err(OrchestratorError::IncompleteFileSet {
                job_id: job.id,
                declared: job.file_count,
                found: files.len(),
            });
        }

        match self.run(&mut job, &mut files) {
            Ok(summary) => Ok(ProcessOutcome::Finished(summary)),
            Err(e) => {
                error!("Job processing aborted: {}", e);
                self.mark_failed(job_id, &format!("Job processing aborted: {}", e));
                Err(e)
            }
        }
    }

    fn run(&self, job: &mut Job, files: &mut [JobFile]) -> Result<JobSummary, OrchestratorError> {
        job.start()?;
        self.repository.save_job(job)?;
        info!(file_count = files.len(), "Job started");
        self.progress.report(ProgressEvent::JobStarted {
            job_id: job.id.clone(),
            file_count: job.file_count,
        });

        let outcomes = if self.file_concurrency > 1 && files.len() > 1 {
            self.convert_parallel(files)?
        } else {
            self.convert_serial(&job.id, files)?
        };
        self.ensure_files_settled(&job.id)?;

        let outputs: Vec<PathBuf> = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                FileOutcome::Completed { output_path } => Some(output_path.clone()),
                FileOutcome::Failed { .. } => None,
            })
            .collect();
        let succeeded = outputs.len();
        let failed = outcomes.len() - succeeded;

        if succeeded > 0 {
            match self.archiver.build(&job.id, &outputs) {
                Ok(path) => job.archive_path = Some(path),
                Err(e) => {
                    error!("Archive creation failed: {}", e);
                    job.archive_error = Some(e.to_string());
                }
            }
        }

        let status = if succeeded == 0 && failed > 0 {
            Status::Failed
        } else {
            Status::Completed
        };
        job.finish(status)?;
        self.repository.save_job(job)?;

        info!(
            status = %status,
            succeeded,
            failed,
            "Job finished"
        );
        self.progress.report(ProgressEvent::JobFinished {
            job_id: job.id.clone(),
            status,
            succeeded,
            failed,
            archive_available: job.archive_path.is_some(),
        });

        Ok(JobSummary {
            job_id: job.id.clone(),
            status,
            succeeded,
            failed,
            archive_path: job.archive_path.clone(),
            archive_error: job.archive_error.clone(),
        })
    }

    /// Checks the stored rows, not the in-memory copies, before the job may
    /// become terminal.
    fn ensure_files_settled(&self, job_id: &str) -> Result<(), OrchestratorError> {
        let stored = self.repository.get_job_files(job_id)?;
        match stored.into_iter().find(|f| !f.status.is_terminal()) {
            Some(file) => Err(OrchestratorError::UnsettledFile {
                job_id: job_id.to_string(),
                file_id: file.id,
                status: file.status,
            }),
            None => Ok(()),
        }
    }

    fn prepare_dir(&self, dir: &std::path::Path) -> Result<(), OrchestratorError> {
        std::fs::create_dir_all(dir).map_err(|e| OrchestratorError::OutputDirectory {
            path: dir.to_path_buf(),
            source: e,
        })
    }

    fn unit(&self) -> FileConversionUnit<'_> {
        FileConversionUnit::new(
            self.repository.as_ref(),
            self.converter.as_ref(),
            self.progress.as_ref(),
        )
    }

    /// One file after another, each settled before the next starts.
    fn convert_serial(
        &self,
        job_id: &str,
        files: &mut [JobFile],
    ) -> Result<Vec<FileOutcome>, OrchestratorError> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let output_dir = self.layout.job_output_dir(job_id);
        self.prepare_dir(&output_dir)?;

        let unit = self.unit();
        files
            .iter_mut()
            .map(|file| unit.run(file, &output_dir))
            .collect()
    }

    /// Up to `file_concurrency` conversions at once. Every file gets its own
    /// output directory so same-named outputs cannot collide. Once a file's
    /// state cannot be recorded no further files are started.
    fn convert_parallel(
        &self,
        files: &mut [JobFile],
    ) -> Result<Vec<FileOutcome>, OrchestratorError> {
        type Slot<'f> = (
            &'f mut JobFile,
            PathBuf,
            Option<Result<FileOutcome, OrchestratorError>>,
        );

        let mut slots: Vec<Mutex<Slot<'_>>> = Vec::with_capacity(files.len());
        for file in files.iter_mut() {
            let dir = self.layout.file_output_dir(&file.job_id, &file.id);
            self.prepare_dir(&dir)?;
            slots.push(Mutex::new((file, dir, None)));
        }

        let next = Mutex::new(0usize);
        let aborted = AtomicBool::new(false);
        let workers = self.file_concurrency.min(slots.len());
        let unit = self.unit();
        let parent = tracing::Span::current();
        let (slots_ref, next_ref, aborted_ref, unit_ref) = (&slots, &next, &aborted, &unit);

        thread::scope(|scope| {
            for _ in 0..workers {
                let parent = parent.clone();
                scope.spawn(move || {
                    let _entered = parent.entered();
                    while !aborted_ref.load(Ordering::SeqCst) {
                        let index = {
                            let Ok(mut next) = next_ref.lock() else { return };
                            let index = *next;
                            *next += 1;
                            index
                        };
                        let Some(slot) = slots_ref.get(index) else { return };
                        let Ok(mut slot) = slot.lock() else { return };
                        let (file, dir, outcome) = &mut *slot;
                        let result = unit_ref.run(file, dir);
                        if result.is_err() {
                            aborted_ref.store(true, Ordering::SeqCst);
                        }
                        *outcome = Some(result);
                    }
                });
            }
        });

        let mut outcomes = Vec::with_capacity(slots.len());
        let mut first_error = None;
        for slot in slots {
            let (file, _, outcome) = match slot.into_inner() {
                Ok(inner) => inner,
                Err(poisoned) => poisoned.into_inner(),
            };
            match outcome.or_else(|| file.recorded_outcome().map(Ok)) {
                Some(Ok(outcome)) => outcomes.push(outcome),
                Some(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                None => {
                    first_error.get_or_insert(OrchestratorError::UnsettledFile {
                        job_id: file.job_id.clone(),
                        file_id: file.id.clone(),
                        status: file.status,
                    });
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(outcomes),
        }
    }

    /// Best-effort: settles the unfinished files as FAILED after an
    /// infrastructure error, then the job. The job is left unfinished for a
    /// later recovery pass unless every file row ends terminal.
    fn mark_failed(&self, job_id: &str, reason: &str) {
        let job = match self.repository.get_job(job_id) {
            Ok(Some(job)) if !job.status.is_terminal() => job,
            Ok(_) => return,
            Err(e) => {
                error!("Could not reload job to mark it failed: {}", e);
                return;
            }
        };

        let files = match self.repository.get_job_files(job_id) {
            Ok(files) => files,
            Err(e) => {
                error!("Could not load files to mark them failed: {}", e);
                return;
            }
        };

        let mut settled = files.len() == job.file_count;
        for mut file in files.into_iter().filter(|f| !f.status.is_terminal()) {
            if let Err(e) = self.force_fail_file(&mut file, reason) {
                error!("Could not mark file {} failed: {}", file.id, e);
                settled = false;
            }
        }
        if !settled {
            warn!("Leaving job unfinished until all of its files are settled");
            return;
        }

        if let Err(e) = self.force_fail_job(job) {
            error!("Could not mark job failed: {}", e);
        }
    }

    fn force_fail_file(&self, file: &mut JobFile, reason: &str) -> Result<(), OrchestratorError> {
        if file.status == Status::Pending {
            file.begin()?;
            self.repository.save_job_file(file)?;
        }
        file.fail(reason)?;
        self.repository.save_job_file(file)?;
        Ok(())
    }

    fn force_fail_job(&self, mut job: Job) -> Result<(), OrchestratorError> {
        if job.status == Status::Pending {
            job.start()?;
            self.repository.save_job(&job)?;
        }
        job.finish(Status::Failed)?;
        self.repository.save_job(&job)?;
        Ok(())
    }
}
