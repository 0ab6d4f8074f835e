//! Bring stored job state in line with what the servers report.
//!
//! Servers are polled one after another. A server that cannot be reached is
//! recorded in the report and none of its rows are touched; the other
//! servers still reconcile. The network call for a server always completes
//! before any of its rows are written.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::remote::{RemoteJob, RemoteServer};
use crate::status::{JobStatus, SnapshotStatus};
use crate::store::{Job, StateStore, StoreError, Timestamp};

mod report;


pub use report::{ReconcileReport, ServerOutcome, SnapshotReport};

/// Owns the store and the server handles for the lifetime of the daemon.
pub struct Reconciler {
    store: StateStore,
    servers: Vec<Box<dyn RemoteServer>>,
    snapshots_folder: Option<PathBuf>,
}

enum CheckResult {
    Changed,
    Unchanged,
    Missing,
    Failed,
}

impl Reconciler {
    pub fn new(store: StateStore, servers: Vec<Box<dyn RemoteServer>>) -> Self {
        Self {
            store,
            servers,
            snapshots_folder: None,
        }
    }

    /// Local folder that receives job snapshots; without it snapshots are skipped.
    pub fn with_snapshots_folder(mut self, folder: Option<PathBuf>) -> Self {
        self.snapshots_folder = folder;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Make sure every configured pipeline exists and points at its server.
    ///
    /// Returns the number of pipelines registered.
    pub fn register_servers(&self, servers: &[ServerConfig]) -> Result<usize, StoreError> {
        let mut registered = 0;
        for server in servers {
            for pipeline in &server.pipelines {
                self.store
                    .register_pipeline(pipeline, &server.label, &server.hostname)?;
                registered += 1;
            }
        }
        let known: HashSet<&str> = servers.iter().map(|s| s.label.as_str()).collect();
        for pipeline in self.store.list_pipelines()? {
            match pipeline.server_label.as_deref() {
                Some(label) if known.contains(label) => {}
                other => warn!(
                    "Pipeline {} belongs to unconfigured server {:?}",
                    pipeline.name, other
                ),
            }
        }
        info!("Registered {registered} pipelines on {} servers", servers.len());
        Ok(registered)
    }

    /// Poll every server and record what it reports.
    pub fn reconcile(&mut self, now: Timestamp) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for index in 0..self.servers.len() {
            let label = self.servers[index].label().to_string();
            let remote_jobs = match self.servers[index].list_jobs() {
                Ok(jobs) => jobs,
                Err(err) => {
                    warn!("Server {label} unreachable: {err}");
                    report.servers.push(ServerOutcome::Unreachable {
                        label,
                        error: err.to_string(),
                    });
                    continue;
                }
            };
            let outcome = self.apply_server_listing(&label, &remote_jobs, now);
            report.servers.push(outcome);
        }
        report
    }

    fn apply_server_listing(
        &mut self,
        label: &str,
        remote_jobs: &[RemoteJob],
        now: Timestamp,
    ) -> ServerOutcome {
        let by_remote_id: HashMap<&str, &RemoteJob> = remote_jobs
            .iter()
            .map(|job| (job.job_id_on_server.as_str(), job))
            .collect();
        let tracked = match self.tracked_jobs(label) {
            Ok(tracked) => tracked,
            Err(err) => {
                warn!("Could not list tracked jobs for {label}: {err}");
                return ServerOutcome::Reconciled {
                    label: label.to_string(),
                    checked: 0,
                    changed: 0,
                    missing: 0,
                    failed: 1,
                };
            }
        };

        let (mut checked, mut changed, mut missing, mut failed) = (0, 0, 0, 0);
        for (job, pipeline) in tracked {
            match self.check_job(&job, pipeline.as_deref(), &by_remote_id, now) {
                CheckResult::Changed => {
                    checked += 1;
                    changed += 1;
                }
                CheckResult::Unchanged => checked += 1,
                CheckResult::Missing => missing += 1,
                CheckResult::Failed => failed += 1,
            }
        }
        info!(
            "Server {label}: {checked} checked, {changed} changed, {missing} missing, {failed} failed"
        );
        ServerOutcome::Reconciled {
            label: label.to_string(),
            checked,
            changed,
            missing,
            failed,
        }
    }

    /// Live jobs to check on a server, paired with the pipeline they run on.
    ///
    /// Terminal jobs are history and are never rewritten.
    fn tracked_jobs(&self, label: &str) -> Result<Vec<(Job, Option<String>)>, StoreError> {
        let mut tracked = Vec::new();
        for pipeline in self.store.pipelines_for_server(label)? {
            let Some(job_id) = pipeline.job_id.as_deref() else {
                continue;
            };
            match self.store.get_job(job_id)? {
                Some(job) if job.is_live() => {
                    tracked.push((job, Some(pipeline.name.clone())));
                }
                Some(_) => {}
                None => warn!("Pipeline {} points at unknown job {job_id}", pipeline.name),
            }
        }
        for job in self.store.unassigned_jobs_for_server(label)? {
            if job.is_live() {
                tracked.push((job, None));
            }
        }
        Ok(tracked)
    }

    fn check_job(
        &mut self,
        job: &Job,
        pipeline: Option<&str>,
        by_remote_id: &HashMap<&str, &RemoteJob>,
        now: Timestamp,
    ) -> CheckResult {
        let Some(remote) = job
            .job_id_on_server
            .as_deref()
            .and_then(|id| by_remote_id.get(id))
        else {
            debug!("Job {} not in remote listing", job.job_id);
            return CheckResult::Missing;
        };
        let status = JobStatus::from_remote(&remote.status);
        if status == JobStatus::Unknown {
            warn!(
                "Job {} reports unrecognized status {:?}",
                job.job_id, remote.status
            );
        }
        match self
            .store
            .record_job_check(&job.job_id, pipeline, status, now)
        {
            Ok(()) if job.status == Some(status) => CheckResult::Unchanged,
            Ok(()) => {
                info!(
                    "Job {} status {} -> {}",
                    job.job_id,
                    job.status.map_or("none", JobStatus::code),
                    status
                );
                CheckResult::Changed
            }
            Err(err) => {
                warn!("Could not record check for job {}: {err}", job.job_id);
                CheckResult::Failed
            }
        }
    }

    /// Copy raw output of running jobs, and of finished jobs not yet
    /// completely copied, into the snapshots folder.
    pub fn snapshot_all(&mut self, now: Timestamp) -> Result<SnapshotReport, StoreError> {
        let mut report = SnapshotReport::default();
        let Some(folder) = self.snapshots_folder.clone() else {
            warn!("No snapshots folder configured, skipping snapshots");
            return Ok(report);
        };
        for job in self.store.list_jobs()? {
            let Some(target) = snapshot_target(&job) else {
                continue;
            };
            let (Some(label), Some(remote_id)) =
                (job.server_label.as_deref(), job.job_id_on_server.as_deref())
            else {
                continue;
            };
            let Some(server) = self.servers.iter().find(|s| s.label() == label) else {
                debug!("Job {} is on unconfigured server {label}", job.job_id);
                continue;
            };
            let dest = folder.join(label).join(&job.job_id);
            let recorded = match server.snapshot(remote_id, &dest) {
                Ok(()) => {
                    report.taken.push(job.job_id.clone());
                    target
                }
                Err(err) => {
                    warn!("Snapshot of job {} failed: {err}", job.job_id);
                    report.failed.push((job.job_id.clone(), err.to_string()));
                    SnapshotStatus::Failed
                }
            };
            if let Err(err) = self.store.record_snapshot(&job.job_id, recorded, now) {
                warn!("Could not record snapshot of job {}: {err}", job.job_id);
                if recorded != SnapshotStatus::Failed {
                    report.taken.retain(|id| id != &job.job_id);
                    report.failed.push((job.job_id.clone(), err.to_string()));
                }
            }
        }
        info!(
            "Snapshots: {} taken, {} failed",
            report.taken.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

/// Snapshot state to record on success, or `None` if the job needs no copy.
fn snapshot_target(job: &Job) -> Option<SnapshotStatus> {
    match job.status? {
        JobStatus::Submitted => None,
        JobStatus::Running => Some(SnapshotStatus::Ongoing),
        _ if job.snapshot_status == Some(SnapshotStatus::Complete) => None,
        _ => Some(SnapshotStatus::Complete),
    }
}
