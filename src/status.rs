//! Fixed vocabularies for job execution and snapshot state.
//!
//! Both are persisted as short codes in the `jobs` table. Remote servers
//! report free-form states; [`JobStatus::from_remote`] maps every input to a
//! variant so an unexpected word can never fail a reconciliation cycle.

use serde::{Deserialize, Serialize};

/// Execution state of a job as tracked locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Submitted,
    Running,
    Completed,
    Cancelled,
    Error,
    /// Remote state outside the known vocabulary.
    Unknown,
}

impl JobStatus {
    /// Short code stored in `jobs.Status`.
    pub fn code(self) -> &'static str {
        match self {
            JobStatus::Submitted => "q",
            JobStatus::Running => "r",
            JobStatus::Completed => "c",
            JobStatus::Cancelled => "cd",
            JobStatus::Error => "ce",
            JobStatus::Unknown => "u",
        }
    }

    /// Parse a stored code. Unrecognized codes read back as `Unknown`.
    pub fn from_code(code: &str) -> Self {
        match code {
            "q" => JobStatus::Submitted,
            "r" => JobStatus::Running,
            "c" => JobStatus::Completed,
            "cd" => JobStatus::Cancelled,
            "ce" => JobStatus::Error,
            _ => JobStatus::Unknown,
        }
    }

    /// Map a state reported by a remote server onto the local vocabulary.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    pub fn from_remote(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "q" | "qw" | "queued" | "submitted" | "waiting" | "pending" => JobStatus::Submitted,
            // `rd`: cancel requested, the job is still writing data
            "r" | "rd" | "running" | "working" | "pause" | "paused" => JobStatus::Running,
            "c" | "completed" | "complete" | "finish" | "finished" | "done" => {
                JobStatus::Completed
            }
            "cd" | "cancelled" | "canceled" | "stop" | "stopped" | "killed" => {
                JobStatus::Cancelled
            }
            "ce" | "error" | "failed" | "protect" | "protected" => JobStatus::Error,
            _ => JobStatus::Unknown,
        }
    }

    /// Terminal jobs are never polled again once recorded.
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Submitted | JobStatus::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Whether raw instrument output for a job has been retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnapshotStatus {
    /// Partial copy of a job that is still running.
    Ongoing,
    /// Final copy of a terminal job; no further snapshots needed.
    Complete,
    /// The last attempt failed.
    Failed,
}

impl SnapshotStatus {
    /// Short code stored in `jobs.Snapshot Status`.
    pub fn code(self) -> &'static str {
        match self {
            SnapshotStatus::Ongoing => "so",
            SnapshotStatus::Complete => "sc",
            SnapshotStatus::Failed => "se",
        }
    }

    /// Parse a stored code; `None` for empty or unknown values.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "so" => Some(SnapshotStatus::Ongoing),
            "sc" => Some(SnapshotStatus::Complete),
            "se" => Some(SnapshotStatus::Failed),
            _ => None,
        }
    }
}
