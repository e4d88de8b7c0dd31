pub mod job;
pub mod status;

pub use job::{
    truncate_detail, FailureKind, FileOutcome, Job, JobFile, JobSummary, MAX_ERROR_DETAIL_LEN,
};
pub use status::Status;
