//! Lifecycle events for jobs and files, for in-process subscribers.
//!
//! The repository stays the source of truth; events are a push-style view of
//! the same transitions and may be dropped when no one listens or a
//! subscriber lags.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{FailureKind, Status};

/// Events emitted while a job is processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    JobStarted {
        job_id: String,
        file_count: usize,
    },
    FileStarted {
        job_id: String,
        file_id: String,
        filename: String,
    },
    FileCompleted {
        job_id: String,
        file_id: String,
        filename: String,
    },
    FileFailed {
        job_id: String,
        file_id: String,
        filename: String,
        kind: FailureKind,
        error: String,
    },
    JobFinished {
        job_id: String,
        status: Status,
        succeeded: usize,
        failed: usize,
        archive_available: bool,
    },
}

impl ProgressEvent {
    pub fn job_id(&self) -> &str {
        match self {
            ProgressEvent::JobStarted { job_id, .. }
            | ProgressEvent::FileStarted { job_id, .. }
            | ProgressEvent::FileCompleted { job_id, .. }
            | ProgressEvent::FileFailed { job_id, .. }
            | ProgressEvent::JobFinished { job_id, .. } => job_id,
        }
    }
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Discards every event.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// A timestamped [`ProgressEvent`] as delivered to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ProgressEvent,
}

/// Fans progress events out over a tokio broadcast channel.
#[derive(Clone)]
pub struct BroadcastProgress {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl BroadcastProgress {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastProgress {
    fn default() -> Self {
        Self::new(100)
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        // No active receivers is fine
        let _ = self.sender.send(JobProgressEvent {
            timestamp: Utc::now(),
            event,
        });
    }
}
