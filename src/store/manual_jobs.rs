use std::path::Path;

use rusqlite::params;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use super::{StateStore, StoreError, map_sql_error};

/// A job started outside this system that should still be tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualJobRecord {
    #[serde(rename = "Job ID")]
    pub job_id: String,
    #[serde(rename = "Sample ID")]
    pub sample_id: String,
    #[serde(rename = "Server Label")]
    pub server_label: String,
    #[serde(rename = "Server Hostname")]
    pub server_hostname: String,
    #[serde(rename = "Job ID on Server", deserialize_with = "string_or_number")]
    pub job_id_on_server: String,
}

/// Per-record result of [`StateStore::merge_manual_jobs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManualMergeReport {
    pub inserted: Vec<String>,
    pub already_present: Vec<String>,
    /// Job ID and reason for records that could not be stored.
    pub rejected: Vec<(String, String)>,
}

/// Read a JSON array of manual job records.
pub fn load_manual_jobs(path: &Path) -> Result<Vec<ManualJobRecord>, StoreError> {
    let bytes = std::fs::read(path).map_err(|source| StoreError::ReadManualJobs {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| StoreError::ParseManualJobs {
        path: path.to_path_buf(),
        source,
    })
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Integer(i64),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Integer(number) => number.to_string(),
    })
}

impl StateStore {
    /// Insert each record whose Job ID is not yet stored.
    ///
    /// Existing rows are never touched, so running the same input twice is a
    /// no-op. A record referencing an unknown sample is rejected without
    /// affecting the others.
    pub fn merge_manual_jobs(
        &mut self,
        records: &[ManualJobRecord],
    ) -> Result<ManualMergeReport, StoreError> {
        let mut report = ManualMergeReport::default();
        let tx = self.connection.transaction().map_err(map_sql_error)?;
        {
            let mut insert = tx
                .prepare(
                    r#"INSERT OR IGNORE INTO jobs
                        ("Job ID", "Sample ID", "Server Label", "Server Hostname", "Job ID on Server")
                     VALUES (?1, ?2, ?3, ?4, ?5)"#,
                )
                .map_err(map_sql_error)?;
            for record in records {
                let result = insert.execute(params![
                    record.job_id,
                    record.sample_id,
                    record.server_label,
                    record.server_hostname,
                    record.job_id_on_server,
                ]);
                match result.map_err(map_sql_error) {
                    Ok(1) => {
                        info!("Added job {} to jobs table", record.job_id);
                        report.inserted.push(record.job_id.clone());
                    }
                    Ok(_) => report.already_present.push(record.job_id.clone()),
                    Err(StoreError::ReferentialIntegrity(reason)) => {
                        warn!(
                            "Skipping manual job {}: sample {} is not registered",
                            record.job_id, record.sample_id
                        );
                        report.rejected.push((record.job_id.clone(), reason));
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        tx.commit().map_err(map_sql_error)?;
        Ok(report)
    }
}
