use rusqlite::{OptionalExtension, Row, Transaction, params};

use super::util::{Timestamp, format_timestamp, parse_optional_timestamp};
use super::{StateStore, StoreError, map_sql_error};
use crate::status::{JobStatus, SnapshotStatus};

/// One execution of a sample on a remote server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub job_id: String,
    pub sample_id: Option<String>,
    pub pipeline: Option<String>,
    /// `None` for manually tracked jobs that were never checked.
    pub status: Option<JobStatus>,
    pub jobname: Option<String>,
    pub job_id_on_server: Option<String>,
    pub submitted: Option<Timestamp>,
    pub payload: Option<String>,
    pub comment: Option<String>,
    pub last_checked: Option<Timestamp>,
    pub snapshot_status: Option<SnapshotStatus>,
    pub last_snapshot: Option<Timestamp>,
    pub server_label: Option<String>,
    pub server_hostname: Option<String>,
}

impl Job {
    /// Jobs without a recorded status still need polling.
    pub fn is_live(&self) -> bool {
        self.status.is_none_or(|status| !status.is_terminal())
    }
}

/// Fields supplied by the submission path when a job is started.
#[derive(Debug, Clone, Default)]
pub struct NewJob {
    pub sample_id: String,
    pub pipeline: String,
    pub jobname: Option<String>,
    pub job_id_on_server: Option<String>,
    pub payload: Option<String>,
    pub comment: Option<String>,
}

const JOB_COLUMNS: &str = r#""Job ID", "Sample ID", "Pipeline", "Status", "Jobname",
     "Job ID on Server", "Submitted", "Payload", "Comment", "Last Checked",
     "Snapshot Status", "Last Snapshot", "Server Label", "Server Hostname""#;

struct JobRow {
    job_id: String,
    sample_id: Option<String>,
    pipeline: Option<String>,
    status: Option<String>,
    jobname: Option<String>,
    job_id_on_server: Option<String>,
    submitted: Option<String>,
    payload: Option<String>,
    comment: Option<String>,
    last_checked: Option<String>,
    snapshot_status: Option<String>,
    last_snapshot: Option<String>,
    server_label: Option<String>,
    server_hostname: Option<String>,
}

fn read_job_row(row: &Row<'_>) -> rusqlite::Result<JobRow> {
    Ok(JobRow {
        job_id: row.get(0)?,
        sample_id: row.get(1)?,
        pipeline: row.get(2)?,
        status: row.get(3)?,
        jobname: row.get(4)?,
        // Older databases declared this column INT.
        job_id_on_server: row
            .get::<_, Option<rusqlite::types::Value>>(5)?
            .and_then(value_to_text),
        submitted: row.get(6)?,
        payload: row.get(7)?,
        comment: row.get(8)?,
        last_checked: row.get(9)?,
        snapshot_status: row.get(10)?,
        last_snapshot: row.get(11)?,
        server_label: row.get(12)?,
        server_hostname: row.get(13)?,
    })
}

fn value_to_text(value: rusqlite::types::Value) -> Option<String> {
    use rusqlite::types::Value;
    match value {
        Value::Null => None,
        Value::Integer(number) => Some(number.to_string()),
        Value::Real(number) => Some(number.to_string()),
        Value::Text(text) => Some(text),
        Value::Blob(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            job_id: row.job_id,
            sample_id: row.sample_id,
            pipeline: row.pipeline,
            status: row
                .status
                .filter(|code| !code.is_empty())
                .map(|code| JobStatus::from_code(&code)),
            jobname: row.jobname,
            job_id_on_server: row.job_id_on_server,
            submitted: parse_optional_timestamp(row.submitted)?,
            payload: row.payload,
            comment: row.comment,
            last_checked: parse_optional_timestamp(row.last_checked)?,
            snapshot_status: row
                .snapshot_status
                .and_then(|code| SnapshotStatus::from_code(&code)),
            last_snapshot: parse_optional_timestamp(row.last_snapshot)?,
            server_label: row.server_label,
            server_hostname: row.server_hostname,
        })
    }
}

impl StateStore {
    /// Start a job on a pipeline and point the pipeline and sample at it.
    ///
    /// The job ID is `<pipeline>-<n>` with `n` one past the highest sequence
    /// already used on that pipeline. Everything happens in one transaction.
    pub fn create_job(&mut self, job: &NewJob, submitted: Timestamp) -> Result<String, StoreError> {
        let pipeline = self
            .get_pipeline(&job.pipeline)?
            .ok_or_else(|| StoreError::UnknownPipeline(job.pipeline.clone()))?;
        if let Some(current_job) = pipeline.job_id.as_deref() {
            if let Some(current) = self.get_job(current_job)? {
                if current.is_live() {
                    return Err(StoreError::PipelineBusy {
                        pipeline: job.pipeline.clone(),
                        job_id: current.job_id,
                    });
                }
            }
        }
        if let Some(current_sample) = pipeline.sample_id.as_deref() {
            if current_sample != job.sample_id {
                return Err(StoreError::PipelineOccupied {
                    pipeline: job.pipeline.clone(),
                    current: current_sample.to_string(),
                    requested: job.sample_id.clone(),
                });
            }
        }

        let tx = self.connection.transaction().map_err(map_sql_error)?;
        let job_id = format!("{}-{}", job.pipeline, next_sequence(&tx, &job.pipeline)?);
        tx.execute(
            r#"INSERT INTO jobs ("Job ID", "Sample ID", "Pipeline", "Status", "Jobname",
                "Job ID on Server", "Submitted", "Payload", "Comment",
                "Server Label", "Server Hostname")
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
            params![
                job_id,
                job.sample_id,
                job.pipeline,
                JobStatus::Submitted.code(),
                job.jobname,
                job.job_id_on_server,
                format_timestamp(submitted),
                job.payload,
                job.comment,
                pipeline.server_label,
                pipeline.server_hostname,
            ],
        )
        .map_err(map_sql_error)?;
        tx.execute(
            r#"UPDATE pipelines SET "Job ID" = ?1, "Sample ID" = ?2 WHERE "Pipeline" = ?3"#,
            params![job_id, job.sample_id, job.pipeline],
        )
        .map_err(map_sql_error)?;
        tx.execute(
            r#"UPDATE samples SET "Job ID" = ?1, "Pipeline" = ?2 WHERE "Sample ID" = ?3"#,
            params![job_id, job.pipeline, job.sample_id],
        )
        .map_err(map_sql_error)?;
        tx.commit().map_err(map_sql_error)?;
        Ok(job_id)
    }

    /// Insert a complete job row as-is, e.g. when importing history.
    ///
    /// Unknown samples or pipelines fail with
    /// [`StoreError::ReferentialIntegrity`] and leave no row behind.
    pub fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        self.connection
            .execute(
                &format!(
                    "INSERT INTO jobs ({JOB_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                ),
                params![
                    job.job_id,
                    job.sample_id,
                    job.pipeline,
                    job.status.map(JobStatus::code),
                    job.jobname,
                    job.job_id_on_server,
                    job.submitted.map(format_timestamp),
                    job.payload,
                    job.comment,
                    job.last_checked.map(format_timestamp),
                    job.snapshot_status.map(SnapshotStatus::code),
                    job.last_snapshot.map(format_timestamp),
                    job.server_label,
                    job.server_hostname,
                ],
            )
            .map_err(map_sql_error)?;
        Ok(())
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        let row = self
            .connection
            .query_row(
                &format!(r#"SELECT {JOB_COLUMNS} FROM jobs WHERE "Job ID" = ?1"#),
                params![job_id],
                read_job_row,
            )
            .optional()
            .map_err(map_sql_error)?;
        row.map(Job::try_from).transpose()
    }

    /// All jobs ordered by ID.
    pub fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let mut stmt = self
            .connection
            .prepare(&format!(r#"SELECT {JOB_COLUMNS} FROM jobs ORDER BY "Job ID" ASC"#))
            .map_err(map_sql_error)?;
        let rows = stmt
            .query_map([], read_job_row)
            .map_err(map_sql_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sql_error)?;
        rows.into_iter().map(Job::try_from).collect()
    }

    /// Jobs tracked against a server without going through a pipeline.
    pub fn unassigned_jobs_for_server(&self, server_label: &str) -> Result<Vec<Job>, StoreError> {
        let mut stmt = self
            .connection
            .prepare(&format!(
                r#"SELECT {JOB_COLUMNS} FROM jobs
                 WHERE "Server Label" = ?1 AND "Pipeline" IS NULL
                 ORDER BY "Job ID" ASC"#
            ))
            .map_err(map_sql_error)?;
        let rows = stmt
            .query_map(params![server_label], read_job_row)
            .map_err(map_sql_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sql_error)?;
        rows.into_iter().map(Job::try_from).collect()
    }

    /// Record the outcome of one reconciliation check.
    ///
    /// Job status and both `Last Checked` columns move together.
    pub fn record_job_check(
        &mut self,
        job_id: &str,
        pipeline: Option<&str>,
        status: JobStatus,
        checked_at: Timestamp,
    ) -> Result<(), StoreError> {
        let checked_at = format_timestamp(checked_at);
        let tx = self.connection.transaction().map_err(map_sql_error)?;
        let updated = tx
            .execute(
                r#"UPDATE jobs SET "Status" = ?1, "Last Checked" = ?2 WHERE "Job ID" = ?3"#,
                params![status.code(), checked_at, job_id],
            )
            .map_err(map_sql_error)?;
        if updated == 0 {
            return Err(StoreError::UnknownJob(job_id.to_string()));
        }
        if let Some(pipeline) = pipeline {
            tx.execute(
                r#"UPDATE pipelines SET "Last Checked" = ?1 WHERE "Pipeline" = ?2"#,
                params![checked_at, pipeline],
            )
            .map_err(map_sql_error)?;
        }
        tx.commit().map_err(map_sql_error)?;
        Ok(())
    }

    /// Record the result of a snapshot attempt.
    pub fn record_snapshot(
        &self,
        job_id: &str,
        snapshot_status: SnapshotStatus,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        let updated = self
            .connection
            .execute(
                r#"UPDATE jobs SET "Snapshot Status" = ?1, "Last Snapshot" = ?2
                 WHERE "Job ID" = ?3"#,
                params![snapshot_status.code(), format_timestamp(at), job_id],
            )
            .map_err(map_sql_error)?;
        if updated == 0 {
            return Err(StoreError::UnknownJob(job_id.to_string()));
        }
        Ok(())
    }
}

fn next_sequence(tx: &Transaction<'_>, pipeline: &str) -> Result<u64, StoreError> {
    let prefix = format!("{pipeline}-");
    let mut stmt = tx
        .prepare(r#"SELECT "Job ID" FROM jobs WHERE "Pipeline" = ?1"#)
        .map_err(map_sql_error)?;
    let ids = stmt
        .query_map(params![pipeline], |row| row.get::<_, String>(0))
        .map_err(map_sql_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(map_sql_error)?;
    let highest = ids
        .iter()
        .filter_map(|id| id.strip_prefix(&prefix))
        .filter_map(|seq| seq.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    Ok(highest + 1)
}
