use rusqlite::{OptionalExtension, params, params_from_iter, types::Value};

use super::util::quote_ident;
use super::{FIXED_SAMPLE_COLUMNS, StateStore, StoreError, map_sql_error};

/// Identity and assignment fields of a sample row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub sample_id: String,
    pub run_id: Option<String>,
    pub pipeline: Option<String>,
    pub job_id: Option<String>,
}

/// A sample to register, with values for configured metadata columns.
#[derive(Debug, Clone, Default)]
pub struct NewSample {
    pub sample_id: String,
    pub run_id: Option<String>,
    pub metadata: Vec<(String, Value)>,
}

impl NewSample {
    pub fn new(sample_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            sample_id: sample_id.into(),
            run_id: Some(run_id.into()),
            metadata: Vec::new(),
        }
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.push((column.into(), value.into()));
        self
    }
}

impl StateStore {
    /// Insert a new sample row. Metadata columns must already exist.
    pub fn insert_sample(&self, sample: &NewSample) -> Result<(), StoreError> {
        let existing = self.table_columns("samples")?;
        let mut columns = vec![quote_ident("Sample ID"), quote_ident("Run ID")];
        let mut values = vec![
            Value::Text(sample.sample_id.clone()),
            sample.run_id.clone().map(Value::Text).unwrap_or(Value::Null),
        ];
        for (name, value) in &sample.metadata {
            if FIXED_SAMPLE_COLUMNS.contains(&name.as_str()) || !existing.contains(name) {
                return Err(StoreError::UnknownColumn(name.clone()));
            }
            columns.push(quote_ident(name));
            values.push(value.clone());
        }
        let placeholders = (1..=values.len())
            .map(|idx| format!("?{idx}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO samples ({}) VALUES ({placeholders})",
            columns.join(", ")
        );
        self.connection
            .execute(&sql, params_from_iter(values))
            .map_err(map_sql_error)?;
        Ok(())
    }

    pub fn get_sample(&self, sample_id: &str) -> Result<Option<Sample>, StoreError> {
        self.connection
            .query_row(
                r#"SELECT "Sample ID", "Run ID", "Pipeline", "Job ID"
                 FROM samples WHERE "Sample ID" = ?1"#,
                params![sample_id],
                |row| {
                    Ok(Sample {
                        sample_id: row.get(0)?,
                        run_id: row.get(1)?,
                        pipeline: row.get(2)?,
                        job_id: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(map_sql_error)
    }

    /// Read a single metadata value, mostly for inspection and tests.
    pub fn sample_value(&self, sample_id: &str, column: &str) -> Result<Value, StoreError> {
        if !self.table_columns("samples")?.contains(column) {
            return Err(StoreError::UnknownColumn(column.to_string()));
        }
        self.connection
            .query_row(
                &format!(
                    r#"SELECT {} FROM samples WHERE "Sample ID" = ?1"#,
                    quote_ident(column)
                ),
                params![sample_id],
                |row| row.get::<_, Value>(0),
            )
            .optional()
            .map_err(map_sql_error)?
            .ok_or_else(|| StoreError::UnknownSample(sample_id.to_string()))
    }

    /// Samples that have at least one job, in ID order.
    ///
    /// These are the inputs of per-sample analysis.
    pub fn sample_ids_with_jobs(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .connection
            .prepare(
                r#"SELECT DISTINCT "Sample ID" FROM jobs
                 WHERE "Sample ID" IS NOT NULL
                 ORDER BY "Sample ID" ASC"#,
            )
            .map_err(map_sql_error)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(map_sql_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sql_error)?;
        Ok(rows)
    }

    /// Distinct batch identifiers of samples that have jobs.
    pub fn run_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .connection
            .prepare(
                r#"SELECT DISTINCT s."Run ID" FROM samples s
                 JOIN jobs j ON j."Sample ID" = s."Sample ID"
                 WHERE s."Run ID" IS NOT NULL AND s."Run ID" != ''
                 ORDER BY s."Run ID" ASC"#,
            )
            .map_err(map_sql_error)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(map_sql_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sql_error)?;
        Ok(rows)
    }

    /// Current column names of the `samples` table, in table order.
    pub fn sample_columns(&self) -> Result<Vec<String>, StoreError> {
        self.ordered_columns("samples")
    }
}
