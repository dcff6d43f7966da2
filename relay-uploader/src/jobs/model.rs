//! Upload job record and its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Lifecycle status of an upload job.
///
/// Status only moves forward: `queued → uploading → done | error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Registered, transfer not started yet.
    Queued,
    /// Transfer in progress (including source redirects).
    Uploading,
    /// Destination accepted the upload.
    Done,
    /// Transfer failed; see the job's `error`.
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Uploading => "uploading",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Position in the lifecycle; terminal statuses share the last rank.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Uploading => 1,
            Self::Done | Self::Error => 2,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single mutation of a job, applied through [`Job::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobTransition {
    /// `queued → uploading`.
    Start,
    /// Add relayed bytes while uploading.
    Progress(u64),
    /// `uploading → done`.
    Complete {
        resource_id: String,
        resource_url: String,
    },
    /// `queued | uploading → error`.
    Fail(String),
}

impl JobTransition {
    fn target(&self) -> JobStatus {
        match self {
            Self::Start | Self::Progress(_) => JobStatus::Uploading,
            Self::Complete { .. } => JobStatus::Done,
            Self::Fail(_) => JobStatus::Error,
        }
    }
}

/// Observable state of one upload job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub destination_resource_id: Option<String>,
    pub destination_url: Option<String>,
    pub error: Option<String>,
    pub progress_bytes: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a queued job.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Queued,
            destination_resource_id: None,
            destination_url: None,
            error: None,
            progress_bytes: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Apply a transition, rejecting anything that would move the job
    /// backwards or touch a terminal job.
    pub fn apply(&mut self, transition: JobTransition) -> Result<()> {
        let from = self.status;

        match transition {
            JobTransition::Start if from == JobStatus::Queued => {
                self.status = JobStatus::Uploading;
            }
            JobTransition::Progress(delta) if from == JobStatus::Uploading => {
                self.progress_bytes = self.progress_bytes.saturating_add(delta);
            }
            JobTransition::Complete {
                resource_id,
                resource_url,
            } if from == JobStatus::Uploading => {
                self.status = JobStatus::Done;
                self.destination_resource_id = Some(resource_id);
                self.destination_url = Some(resource_url);
                self.finished_at = Some(Utc::now());
            }
            JobTransition::Fail(message) if !from.is_terminal() => {
                self.status = JobStatus::Error;
                self.error = Some(message);
                self.finished_at = Some(Utc::now());
            }
            other => return Err(Error::invalid_transition(from, other.target())),
        }

        Ok(())
    }
}
