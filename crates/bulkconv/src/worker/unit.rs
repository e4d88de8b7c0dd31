use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use tracing::{debug, info_span, warn};

use crate::converter::DocumentConverter;
use crate::error::OrchestratorError;
use crate::model::{FailureKind, FileOutcome, JobFile};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::repository::JobRepository;
use crate::sanitize;

/// Drives a single file through one conversion attempt.
///
/// Every conversion failure, including a panicking converter, ends as a
/// [`FileOutcome::Failed`]. `run` only returns `Err` when the file's terminal
/// state could not be written, in which case the stored row is still
/// IN_PROGRESS and the caller must not settle the job.
pub struct FileConversionUnit<'a> {
    repository: &'a dyn JobRepository,
    converter: &'a dyn DocumentConverter,
    progress: &'a dyn ProgressReporter,
}

impl<'a> FileConversionUnit<'a> {
    pub fn new(
        repository: &'a dyn JobRepository,
        converter: &'a dyn DocumentConverter,
        progress: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            repository,
            converter,
            progress,
        }
    }

    pub fn run(
        &self,
        file: &mut JobFile,
        output_dir: &Path,
    ) -> Result<FileOutcome, OrchestratorError> {
        let filename = sanitize::redact_path(Path::new(&file.filename));
        let _span = info_span!("convert_file",
            job_id = %file.job_id,
            file_id = %file.id,
            filename = %filename,
        )
        .entered();

        if let Some(outcome) = file.recorded_outcome() {
            debug!("File already {}, not converting again", file.status);
            return Ok(outcome);
        }

        file.begin()?;
        self.repository.save_job_file(file)?;
        self.progress.report(ProgressEvent::FileStarted {
            job_id: file.job_id.clone(),
            file_id: file.id.clone(),
            filename: file.filename.clone(),
        });

        let converted = panic::catch_unwind(AssertUnwindSafe(|| {
            self.converter.convert(&file.original_path, output_dir)
        }));

        match converted {
            Ok(Ok(output_path)) => self.record_success(file, output_path),
            Ok(Err(e)) => self.record_failure(file, e.kind(), &e.to_string()),
            Err(payload) => self.record_failure(
                file,
                FailureKind::Unexpected,
                &format!("Converter panicked: {}", panic_message(payload.as_ref())),
            ),
        }
    }

    fn record_success(
        &self,
        file: &mut JobFile,
        output_path: PathBuf,
    ) -> Result<FileOutcome, OrchestratorError> {
        let before = file.clone();
        file.complete(output_path.clone())?;
        if let Err(e) = self.repository.save_job_file(file) {
            warn!("Could not record output for file {}: {}", file.id, e);
            *file = before;
            return self.record_failure(
                file,
                FailureKind::Unexpected,
                &format!("Failed to record converted output: {}", e),
            );
        }

        self.progress.report(ProgressEvent::FileCompleted {
            job_id: file.job_id.clone(),
            file_id: file.id.clone(),
            filename: file.filename.clone(),
        });
        Ok(FileOutcome::Completed { output_path })
    }

    fn record_failure(
        &self,
        file: &mut JobFile,
        kind: FailureKind,
        detail: &str,
    ) -> Result<FileOutcome, OrchestratorError> {
        warn!(kind = ?kind, "Conversion failed: {}", detail);

        let before = file.clone();
        file.fail(detail)?;
        if let Err(e) = self.repository.save_job_file(file) {
            *file = before;
            return Err(e.into());
        }
        let detail = file.error_message.clone().unwrap_or_default();

        self.progress.report(ProgressEvent::FileFailed {
            job_id: file.job_id.clone(),
            file_id: file.id.clone(),
            filename: file.filename.clone(),
            kind,
            error: detail.clone(),
        });
        Ok(FileOutcome::Failed { kind, detail })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::error::ConversionError;
    use crate::model::{Job, Status};
    use crate::progress::NoopProgress;
    use crate::repository::{MemoryRepository, RepositoryError};

    enum Behaviour {
        Succeed,
        Fail,
        Timeout,
        Panic,
    }

    struct FakeConverter {
        behaviour: Behaviour,
        calls: Mutex<usize>,
    }

    impl FakeConverter {
        fn new(behaviour: Behaviour) -> Self {
            Self {
                behaviour,
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    impl DocumentConverter for FakeConverter {
        fn convert(&self, input: &Path, output_dir: &Path) -> Result<PathBuf, ConversionError> {
            *self.calls.lock().unwrap() += 1;
            match self.behaviour {
                Behaviour::Succeed => {
                    let out = crate::converter::expected_output(input, output_dir, "pdf");
                    Ok(out)
                }
                Behaviour::Fail => Err(ConversionError::EngineFailure {
                    diagnostic: "renderer exploded".to_string(),
                }),
                Behaviour::Timeout => Err(ConversionError::Timeout(Duration::from_secs(300))),
                Behaviour::Panic => panic!("renderer bug"),
            }
        }

        fn target_extension(&self) -> &str {
            "pdf"
        }
    }

    fn setup() -> (MemoryRepository, JobFile) {
        let repo = MemoryRepository::new();
        let job = repo.create_job(1).unwrap();
        let file = repo
            .create_job_file(&job.id, "memo.docx", Path::new("/up/memo.docx"))
            .unwrap();
        (repo, file)
    }

    fn stored(repo: &MemoryRepository, file: &JobFile) -> JobFile {
        repo.get_job_files(&file.job_id).unwrap().remove(0)
    }

    #[test]
    fn test_success_records_output() {
        let (repo, mut file) = setup();
        let converter = FakeConverter::new(Behaviour::Succeed);
        let unit = FileConversionUnit::new(&repo, &converter, &NoopProgress);

        let outcome = unit.run(&mut file, Path::new("/out/job")).unwrap();
        assert_eq!(
            outcome,
            FileOutcome::Completed {
                output_path: PathBuf::from("/out/job/memo.pdf")
            }
        );
        let row = stored(&repo, &file);
        assert_eq!(row.status, Status::Completed);
        assert_eq!(row.output_path, Some(PathBuf::from("/out/job/memo.pdf")));
        assert!(row.completed_at.is_some());
        assert!(row.error_message.is_none());
    }

    #[test]
    fn test_engine_failure_is_recorded() {
        let (repo, mut file) = setup();
        let converter = FakeConverter::new(Behaviour::Fail);
        let unit = FileConversionUnit::new(&repo, &converter, &NoopProgress);

        let outcome = unit.run(&mut file, Path::new("/out/job")).unwrap();
        match outcome {
            FileOutcome::Failed { kind, detail } => {
                assert_eq!(kind, FailureKind::EngineFailure);
                assert!(detail.contains("renderer exploded"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        let row = stored(&repo, &file);
        assert_eq!(row.status, Status::Failed);
        assert!(row.output_path.is_none());
        assert!(row.completed_at.is_some());
    }

    #[test]
    fn test_timeout_detail_mentions_timeout() {
        let (repo, mut file) = setup();
        let converter = FakeConverter::new(Behaviour::Timeout);
        let unit = FileConversionUnit::new(&repo, &converter, &NoopProgress);

        unit.run(&mut file, Path::new("/out/job")).unwrap();
        let row = stored(&repo, &file);
        assert!(row
            .error_message
            .unwrap()
            .to_lowercase()
            .contains("timeout"));
    }

    #[test]
    fn test_panicking_converter_is_contained() {
        let (repo, mut file) = setup();
        let converter = FakeConverter::new(Behaviour::Panic);
        let unit = FileConversionUnit::new(&repo, &converter, &NoopProgress);

        let outcome = unit.run(&mut file, Path::new("/out/job")).unwrap();
        assert!(matches!(
            outcome,
            FileOutcome::Failed {
                kind: FailureKind::Unexpected,
                ..
            }
        ));
        let row = stored(&repo, &file);
        assert_eq!(row.status, Status::Failed);
        assert!(row.error_message.unwrap().contains("renderer bug"));
    }

    #[test]
    fn test_terminal_file_is_not_reconverted() {
        let (repo, mut file) = setup();
        let converter = FakeConverter::new(Behaviour::Succeed);
        let unit = FileConversionUnit::new(&repo, &converter, &NoopProgress);
        unit.run(&mut file, Path::new("/out/job")).unwrap();

        let mut reloaded = stored(&repo, &file);
        let outcome = unit.run(&mut reloaded, Path::new("/out/job")).unwrap();
        assert!(outcome.is_completed());
        assert_eq!(converter.calls(), 1);
    }

    #[test]
    fn test_interrupted_file_is_resumed() {
        let (repo, mut file) = setup();
        file.begin().unwrap();
        repo.save_job_file(&file).unwrap();

        let converter = FakeConverter::new(Behaviour::Succeed);
        let unit = FileConversionUnit::new(&repo, &converter, &NoopProgress);
        let mut reloaded = stored(&repo, &file);
        assert!(unit
            .run(&mut reloaded, Path::new("/out/job"))
            .unwrap()
            .is_completed());
        assert_eq!(stored(&repo, &file).status, Status::Completed);
    }

    #[test]
    fn test_long_diagnostic_is_truncated() {
        struct Verbose;
        impl DocumentConverter for Verbose {
            fn convert(&self, _: &Path, _: &Path) -> Result<PathBuf, ConversionError> {
                Err(ConversionError::EngineFailure {
                    diagnostic: "e".repeat(10_000),
                })
            }
            fn target_extension(&self) -> &str {
                "pdf"
            }
        }

        let (repo, mut file) = setup();
        let unit = FileConversionUnit::new(&repo, &Verbose, &NoopProgress);
        unit.run(&mut file, Path::new("/out/job")).unwrap();
        let message = stored(&repo, &file).error_message.unwrap();
        assert_eq!(
            message.chars().count(),
            crate::model::MAX_ERROR_DETAIL_LEN
        );
    }

    /// Rejects file writes whose status is in `rejected`.
    struct RejectingWrites {
        inner: MemoryRepository,
        rejected: Vec<Status>,
    }

    impl JobRepository for RejectingWrites {
        fn create_job(&self, file_count: usize) -> Result<Job, RepositoryError> {
            self.inner.create_job(file_count)
        }
        fn create_job_with_files(&self, job: &Job, files: &[JobFile]) -> Result<(), RepositoryError> {
            self.inner.create_job_with_files(job, files)
        }
        fn create_job_file(
            &self,
            job_id: &str,
            filename: &str,
            input_path: &Path,
        ) -> Result<JobFile, RepositoryError> {
            self.inner.create_job_file(job_id, filename, input_path)
        }
        fn get_job(&self, id: &str) -> Result<Option<Job>, RepositoryError> {
            self.inner.get_job(id)
        }
        fn get_job_files(&self, job_id: &str) -> Result<Vec<JobFile>, RepositoryError> {
            self.inner.get_job_files(job_id)
        }
        fn save_job(&self, job: &Job) -> Result<(), RepositoryError> {
            self.inner.save_job(job)
        }
        fn save_job_file(&self, file: &JobFile) -> Result<(), RepositoryError> {
            if self.rejected.contains(&file.status) {
                return Err(RepositoryError::Unavailable("disk full".to_string()));
            }
            self.inner.save_job_file(file)
        }
        fn list_unfinished_jobs(&self) -> Result<Vec<Job>, RepositoryError> {
            self.inner.list_unfinished_jobs()
        }
    }

    fn rejecting(rejected: Vec<Status>) -> (RejectingWrites, JobFile) {
        let (inner, file) = setup();
        (RejectingWrites { inner, rejected }, file)
    }

    #[test]
    fn test_unrecorded_output_falls_back_to_failure() {
        let (repo, mut file) = rejecting(vec![Status::Completed]);
        let converter = FakeConverter::new(Behaviour::Succeed);
        let unit = FileConversionUnit::new(&repo, &converter, &NoopProgress);

        let outcome = unit.run(&mut file, Path::new("/out/job")).unwrap();
        match outcome {
            FileOutcome::Failed { kind, detail } => {
                assert_eq!(kind, FailureKind::Unexpected);
                assert!(detail.contains("Failed to record converted output"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(stored(&repo.inner, &file).status, Status::Failed);
    }

    #[test]
    fn test_unrecorded_terminal_state_is_an_error() {
        let cases = [
            (Behaviour::Succeed, vec![Status::Completed, Status::Failed]),
            (Behaviour::Fail, vec![Status::Failed]),
            (Behaviour::Panic, vec![Status::Failed]),
        ];

        for (behaviour, rejected) in cases {
            let (repo, mut file) = rejecting(rejected);
            let converter = FakeConverter::new(behaviour);
            let unit = FileConversionUnit::new(&repo, &converter, &NoopProgress);

            let err = unit.run(&mut file, Path::new("/out/job")).unwrap_err();
            assert!(matches!(
                err,
                OrchestratorError::Repository(RepositoryError::Unavailable(_))
            ));
            assert_eq!(file.status, Status::InProgress);
            assert_eq!(stored(&repo.inner, &file).status, Status::InProgress);
        }
    }

    #[test]
    fn test_unrecorded_start_is_an_error() {
        let (repo, mut file) = rejecting(vec![Status::InProgress]);
        let converter = FakeConverter::new(Behaviour::Succeed);
        let unit = FileConversionUnit::new(&repo, &converter, &NoopProgress);

        assert!(unit.run(&mut file, Path::new("/out/job")).is_err());
        assert_eq!(converter.calls(), 0);
        assert_eq!(stored(&repo.inner, &file).status, Status::Pending);
    }
}
