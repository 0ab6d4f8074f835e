//! Access to the servers that drive the cyclers.
//!
//! [`RemoteServer`] is the only thing the reconciler knows about a server.
//! [`SshServer`] implements it by shelling out to `ssh` and `scp`; tests use
//! in-memory fakes.

use std::path::{Path, PathBuf};

use thiserror::Error;

mod ssh;
mod status_table;

pub use ssh::SshServer;
pub use status_table::parse_status_table;

/// One job as reported by a server's status command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteJob {
    pub job_id_on_server: String,
    /// Raw status code or word; mapped with `JobStatus::from_remote`.
    pub status: String,
    pub pipeline: Option<String>,
}

impl RemoteJob {
    pub fn new(job_id_on_server: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            job_id_on_server: job_id_on_server.into(),
            status: status.into(),
            pipeline: None,
        }
    }
}

/// Errors raised while talking to a server.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} on {host} exited with {code:?}: {stderr}")]
    CommandFailed {
        program: String,
        host: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("Server {0} has no snapshot source configured")]
    NoSnapshotSource(String),
    #[error("Could not create snapshot folder {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Server {0} is not reachable")]
    Unreachable(String),
}

/// A server hosting pipelines.
pub trait RemoteServer {
    fn label(&self) -> &str;

    fn hostname(&self) -> &str;

    /// Current job list; one network round trip.
    fn list_jobs(&self) -> Result<Vec<RemoteJob>, RemoteError>;

    /// Copy the raw output of one job into `dest`.
    fn snapshot(&self, job_id_on_server: &str, dest: &Path) -> Result<(), RemoteError>;
}
