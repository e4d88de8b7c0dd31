use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status shared by jobs and their files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "PENDING",
            Status::InProgress => "IN_PROGRESS",
            Status::Completed => "COMPLETED",
            Status::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }

    /// Whether moving from `self` to `next` is a legal step.
    ///
    /// `InProgress -> InProgress` is accepted so a redelivered job can resume
    /// work that was interrupted mid-flight.
    pub fn can_transition_to(&self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Pending, Status::InProgress)
                | (Status::InProgress, Status::InProgress)
                | (Status::InProgress, Status::Completed)
                | (Status::InProgress, Status::Failed)
        )
    }

    /// Statuses from which `self` may be entered.
    pub fn predecessors(&self) -> Vec<Status> {
        Self::ALL
            .into_iter()
            .filter(|from| from.can_transition_to(*self))
            .collect()
    }

    pub const ALL: [Status; 4] = [
        Status::Pending,
        Status::InProgress,
        Status::Completed,
        Status::Failed,
    ];
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Status::Pending),
            "IN_PROGRESS" => Ok(Status::InProgress),
            "COMPLETED" => Ok(Status::Completed),
            "FAILED" => Ok(Status::Failed),
            _ => Err(format!("Invalid status: {}", s)),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
