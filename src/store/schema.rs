use std::collections::HashSet;

use rusqlite::OptionalExtension;

use super::util::quote_ident;
use super::{StateStore, StoreError, map_sql_error};

/// Columns added after the first schema version, with their types.
const JOB_LATE_COLUMNS: [(&str, &str); 2] = [
    ("Server Label", "VARCHAR(255)"),
    ("Server Hostname", "VARCHAR(255)"),
];

impl StateStore {
    pub(super) fn apply_schema(&mut self) -> Result<(), StoreError> {
        self.connection
            .execute_batch(
                r#"CREATE TABLE IF NOT EXISTS samples (
                "Sample ID" VARCHAR(255) PRIMARY KEY,
                "Run ID" VARCHAR(255),
                "Pipeline" VARCHAR(50),
                "Job ID" VARCHAR(255),
                FOREIGN KEY("Pipeline") REFERENCES pipelines("Pipeline"),
                FOREIGN KEY("Job ID") REFERENCES jobs("Job ID")
            );
             CREATE TABLE IF NOT EXISTS jobs (
                "Job ID" VARCHAR(255) PRIMARY KEY,
                "Sample ID" VARCHAR(255),
                "Pipeline" VARCHAR(50),
                "Status" VARCHAR(3),
                "Jobname" VARCHAR(50),
                "Job ID on Server" VARCHAR(255),
                "Submitted" DATETIME,
                "Payload" TEXT,
                "Comment" TEXT,
                "Last Checked" DATETIME,
                "Snapshot Status" VARCHAR(3),
                "Last Snapshot" DATETIME,
                "Server Label" VARCHAR(255),
                "Server Hostname" VARCHAR(255),
                FOREIGN KEY("Sample ID") REFERENCES samples("Sample ID"),
                FOREIGN KEY("Pipeline") REFERENCES pipelines("Pipeline")
            );
             CREATE TABLE IF NOT EXISTS pipelines (
                "Pipeline" VARCHAR(50) PRIMARY KEY,
                "Sample ID" VARCHAR(255),
                "Job ID" VARCHAR(255),
                "Last Checked" DATETIME,
                "Server Label" VARCHAR(255),
                "Server Hostname" VARCHAR(255),
                FOREIGN KEY("Sample ID") REFERENCES samples("Sample ID"),
                FOREIGN KEY("Job ID") REFERENCES jobs("Job ID")
            );
             CREATE INDEX IF NOT EXISTS idx_pipelines_server
                ON pipelines("Server Label");"#,
            )
            .map_err(map_sql_error)?;
        self.migrate_job_server_columns()?;
        self.connection
            .execute_batch(r#"CREATE INDEX IF NOT EXISTS idx_jobs_server ON jobs("Server Label");"#)
            .map_err(map_sql_error)?;
        Ok(())
    }

    /// Older databases lack the server columns on `jobs`.
    fn migrate_job_server_columns(&mut self) -> Result<(), StoreError> {
        let columns = self.table_columns("jobs")?;
        if JOB_LATE_COLUMNS
            .iter()
            .all(|(name, _)| columns.contains(*name))
        {
            return Ok(());
        }
        let tx = self.connection.transaction().map_err(map_sql_error)?;
        for (name, sql_type) in JOB_LATE_COLUMNS {
            if !columns.contains(name) {
                tx.execute(
                    &format!("ALTER TABLE jobs ADD COLUMN {} {sql_type}", quote_ident(name)),
                    [],
                )
                .map_err(map_sql_error)?;
            }
        }
        tx.commit().map_err(map_sql_error)?;
        Ok(())
    }

    pub(crate) fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let mut stmt = self
            .connection
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?1")
            .map_err(map_sql_error)?;
        let exists: Option<String> = stmt
            .query_row([table], |row| row.get(0))
            .optional()
            .map_err(map_sql_error)?;
        Ok(exists.is_some())
    }

    pub(crate) fn table_columns(&self, table: &str) -> Result<HashSet<String>, StoreError> {
        Ok(self.ordered_columns(table)?.into_iter().collect())
    }

    pub(super) fn ordered_columns(&self, table: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .connection
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))
            .map_err(map_sql_error)?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(map_sql_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sql_error)?;
        Ok(columns)
    }
}
