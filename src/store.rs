//! SQLite-backed state for samples, jobs and pipelines.
//!
//! The three tables reference each other (`samples.Pipeline`,
//! `jobs.Sample ID`, `pipelines.Job ID`, ...) and foreign keys are enforced,
//! so every write that touches more than one table goes through a single
//! transaction.

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use thiserror::Error;

mod jobs;
mod manual_jobs;
mod pipelines;
mod sample_columns;
mod samples;
mod schema;
mod util;

#[cfg(test)]
mod tests;

pub use jobs::{Job, NewJob};
pub use manual_jobs::{ManualJobRecord, ManualMergeReport, load_manual_jobs};
pub use pipelines::Pipeline;
pub use sample_columns::{
    ColumnSpec, DenyRemoval, FlagApproval, InteractiveApproval, SchemaApproval, SchemaPlan,
    SchemaSyncOutcome,
};
pub use samples::{NewSample, Sample};
pub use util::{Timestamp, format_timestamp, parse_timestamp};

/// Columns of `samples` that carry identity or foreign keys.
///
/// They are created with the table and never dropped by `sync_schema`.
pub const FIXED_SAMPLE_COLUMNS: [&str; 4] = ["Sample ID", "Run ID", "Pipeline", "Job ID"];

/// Errors returned by [`StateStore`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database query failed: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("Could not create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Database is busy, please retry")]
    Busy,
    #[error("Referential integrity violated: {0}")]
    ReferentialIntegrity(String),
    #[error("Sample {0} does not exist")]
    UnknownSample(String),
    #[error("Pipeline {0} does not exist")]
    UnknownPipeline(String),
    #[error("Job {0} does not exist")]
    UnknownJob(String),
    #[error("Samples table has no column named {0:?}")]
    UnknownColumn(String),
    #[error("Pipeline {pipeline} already runs job {job_id}")]
    PipelineBusy { pipeline: String, job_id: String },
    #[error("Pipeline {pipeline} holds sample {current}, not {requested}")]
    PipelineOccupied {
        pipeline: String,
        current: String,
        requested: String,
    },
    #[error("Invalid column type {sql_type:?} for column {name:?}")]
    InvalidColumnType { name: String, sql_type: String },
    #[error("Invalid column name {0:?}")]
    InvalidColumnName(String),
    #[error("Could not read manual job records from {path}: {source}")]
    ReadManualJobs {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid manual job records in {path}: {source}")]
    ParseManualJobs {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Stored timestamp {0:?} is not in YYYY-MM-DD HH:MM:SS form")]
    InvalidTimestamp(String),
    #[error("SQLite returned an unexpected result")]
    Unexpected,
}

/// Connection wrapper owning the sample/job/pipeline schema.
pub struct StateStore {
    connection: Connection,
}

impl StateStore {
    /// Open (or create) the database file and bring the schema up to date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        util::create_parent_if_needed(path)?;
        let connection = Connection::open(path)?;
        Self::from_connection(connection)
    }

    /// In-memory store, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> Result<Self, StoreError> {
        let mut store = Self { connection };
        store.apply_pragmas()?;
        store.apply_schema()?;
        Ok(store)
    }

    fn apply_pragmas(&self) -> Result<(), StoreError> {
        self.connection
            .execute_batch(
                "PRAGMA journal_mode=WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;
             PRAGMA temp_store=MEMORY;",
            )
            .map_err(map_sql_error)?;
        Ok(())
    }
}

/// Translate rusqlite errors into friendlier StoreError variants.
pub(crate) fn map_sql_error(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(sql_err, _)
            if sql_err.extended_code == rusqlite::ffi::SQLITE_BUSY =>
        {
            StoreError::Busy
        }
        rusqlite::Error::SqliteFailure(sql_err, message)
            if sql_err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
        {
            StoreError::ReferentialIntegrity(
                message.unwrap_or_else(|| "FOREIGN KEY constraint failed".to_string()),
            )
        }
        rusqlite::Error::InvalidQuery
        | rusqlite::Error::InvalidParameterName(_)
        | rusqlite::Error::MultipleStatement => StoreError::Unexpected,
        other => StoreError::Sql(other),
    }
}
