pub mod orchestrator;
pub mod pool;
pub mod unit;

pub use orchestrator::{JobOrchestrator, ProcessOutcome};
pub use pool::WorkerPool;
pub use unit::FileConversionUnit;

use crate::error::DispatchError;

/// Hands a job id over to asynchronous processing and returns at once.
///
/// Delivery is at-least-once; `JobOrchestrator::process` tolerates repeats.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, job_id: &str) -> Result<(), DispatchError>;
}
