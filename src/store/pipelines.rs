use rusqlite::{OptionalExtension, Row, params};

use super::util::{Timestamp, parse_optional_timestamp};
use super::{StateStore, StoreError, map_sql_error};

/// One execution slot (cycler channel) on a configured server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub name: String,
    pub sample_id: Option<String>,
    pub job_id: Option<String>,
    pub last_checked: Option<Timestamp>,
    pub server_label: Option<String>,
    pub server_hostname: Option<String>,
}

const PIPELINE_COLUMNS: &str = r#""Pipeline", "Sample ID", "Job ID", "Last Checked",
     "Server Label", "Server Hostname""#;

type RawPipeline = (
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn read_raw(row: &Row<'_>) -> rusqlite::Result<RawPipeline> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn from_raw(raw: RawPipeline) -> Result<Pipeline, StoreError> {
    let (name, sample_id, job_id, last_checked, server_label, server_hostname) = raw;
    Ok(Pipeline {
        name,
        sample_id,
        job_id,
        last_checked: parse_optional_timestamp(last_checked)?,
        server_label,
        server_hostname,
    })
}

impl StateStore {
    /// Create the pipeline if absent, otherwise refresh its server identity.
    ///
    /// Sample and job assignments of an existing pipeline are kept.
    pub fn register_pipeline(
        &self,
        name: &str,
        server_label: &str,
        server_hostname: &str,
    ) -> Result<(), StoreError> {
        self.connection
            .prepare_cached(
                r#"INSERT INTO pipelines ("Pipeline", "Server Label", "Server Hostname")
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT("Pipeline") DO UPDATE SET
                    "Server Label" = excluded."Server Label",
                    "Server Hostname" = excluded."Server Hostname""#,
            )
            .map_err(map_sql_error)?
            .execute(params![name, server_label, server_hostname])
            .map_err(map_sql_error)?;
        Ok(())
    }

    pub fn get_pipeline(&self, name: &str) -> Result<Option<Pipeline>, StoreError> {
        let raw = self
            .connection
            .query_row(
                &format!(r#"SELECT {PIPELINE_COLUMNS} FROM pipelines WHERE "Pipeline" = ?1"#),
                params![name],
                read_raw,
            )
            .optional()
            .map_err(map_sql_error)?;
        raw.map(from_raw).transpose()
    }

    /// All pipelines ordered by name.
    pub fn list_pipelines(&self) -> Result<Vec<Pipeline>, StoreError> {
        self.query_pipelines(
            &format!(r#"SELECT {PIPELINE_COLUMNS} FROM pipelines ORDER BY "Pipeline" ASC"#),
            None,
        )
    }

    /// Pipelines registered against one server label.
    pub fn pipelines_for_server(&self, server_label: &str) -> Result<Vec<Pipeline>, StoreError> {
        self.query_pipelines(
            &format!(
                r#"SELECT {PIPELINE_COLUMNS} FROM pipelines
                 WHERE "Server Label" = ?1 ORDER BY "Pipeline" ASC"#
            ),
            Some(server_label),
        )
    }

    fn query_pipelines(&self, sql: &str, arg: Option<&str>) -> Result<Vec<Pipeline>, StoreError> {
        let mut stmt = self.connection.prepare(sql).map_err(map_sql_error)?;
        let raw = match arg {
            Some(value) => stmt.query_map(params![value], read_raw),
            None => stmt.query_map([], read_raw),
        }
        .map_err(map_sql_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(map_sql_error)?;
        raw.into_iter().map(from_raw).collect()
    }

    /// Load a sample onto a pipeline, updating both sides together.
    pub fn assign_sample(&mut self, pipeline: &str, sample_id: &str) -> Result<(), StoreError> {
        let current = self
            .get_pipeline(pipeline)?
            .ok_or_else(|| StoreError::UnknownPipeline(pipeline.to_string()))?;
        if let Some(existing) = current.sample_id {
            if existing != sample_id {
                return Err(StoreError::PipelineOccupied {
                    pipeline: pipeline.to_string(),
                    current: existing,
                    requested: sample_id.to_string(),
                });
            }
        }
        if self.get_sample(sample_id)?.is_none() {
            return Err(StoreError::UnknownSample(sample_id.to_string()));
        }
        let tx = self.connection.transaction().map_err(map_sql_error)?;
        tx.execute(
            r#"UPDATE samples SET "Pipeline" = NULL WHERE "Pipeline" = ?1 AND "Sample ID" != ?2"#,
            params![pipeline, sample_id],
        )
        .map_err(map_sql_error)?;
        tx.execute(
            r#"UPDATE pipelines SET "Sample ID" = ?1 WHERE "Pipeline" = ?2"#,
            params![sample_id, pipeline],
        )
        .map_err(map_sql_error)?;
        tx.execute(
            r#"UPDATE samples SET "Pipeline" = ?1 WHERE "Sample ID" = ?2"#,
            params![pipeline, sample_id],
        )
        .map_err(map_sql_error)?;
        tx.commit().map_err(map_sql_error)?;
        Ok(())
    }

    /// Unload whatever sample the pipeline holds. Job history is kept.
    ///
    /// Refused while the pipeline's job is still live.
    pub fn release_pipeline(&mut self, pipeline: &str) -> Result<(), StoreError> {
        let Some(current) = self.get_pipeline(pipeline)? else {
            return Err(StoreError::UnknownPipeline(pipeline.to_string()));
        };
        if let Some(job_id) = current.job_id.as_deref() {
            if self.get_job(job_id)?.is_some_and(|job| job.is_live()) {
                return Err(StoreError::PipelineBusy {
                    pipeline: pipeline.to_string(),
                    job_id: job_id.to_string(),
                });
            }
        }
        let tx = self.connection.transaction().map_err(map_sql_error)?;
        tx.execute(
            r#"UPDATE samples SET "Pipeline" = NULL WHERE "Pipeline" = ?1"#,
            params![pipeline],
        )
        .map_err(map_sql_error)?;
        tx.execute(
            r#"UPDATE pipelines SET "Sample ID" = NULL, "Job ID" = NULL WHERE "Pipeline" = ?1"#,
            params![pipeline],
        )
        .map_err(map_sql_error)?;
        tx.commit().map_err(map_sql_error)?;
        Ok(())
    }
}
