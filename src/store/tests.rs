use super::*;
use crate::status::{JobStatus, SnapshotStatus};
use rusqlite::types::Value;
use tempfile::tempdir;
use time::macros::datetime;

fn store_with_pipeline() -> StateStore {
    let store = StateStore::open_in_memory().unwrap();
    store.register_pipeline("nw4-120-1-1", "nw4", "nw4.lab").unwrap();
    store
        .insert_sample(&NewSample::new("240701_kigr_01", "240701_kigr"))
        .unwrap();
    store
}

fn manual(job_id: &str, sample_id: &str) -> ManualJobRecord {
    ManualJobRecord {
        job_id: job_id.to_string(),
        sample_id: sample_id.to_string(),
        server_label: "tt1".to_string(),
        server_hostname: "tt1.lab".to_string(),
        job_id_on_server: "42".to_string(),
    }
}

/// Records every question it is asked and answers from a script.
struct ScriptedApproval {
    removal: bool,
    data_loss: bool,
    asked: Vec<&'static str>,
}

impl SchemaApproval for ScriptedApproval {
    fn confirm_removal(&mut self, _columns: &[String]) -> bool {
        self.asked.push("removal");
        self.removal
    }

    fn confirm_data_loss(&mut self, _columns: &[String]) -> bool {
        self.asked.push("data_loss");
        self.data_loss
    }
}

fn store_with_metadata() -> StateStore {
    let mut store = StateStore::open_in_memory().unwrap();
    let wanted = vec![
        ColumnSpec::new("Sample ID", "VARCHAR(255) PRIMARY KEY"),
        ColumnSpec::new("Run ID", "VARCHAR(255)"),
        ColumnSpec::new("Anode Type", "VARCHAR(255)"),
        ColumnSpec::new("Cathode Weight (mg)", "FLOAT"),
    ];
    store.sync_schema(&wanted, &mut DenyRemoval).unwrap();
    store
        .insert_sample(
            &NewSample::new("s1", "run1")
                .with("Anode Type", "graphite".to_string())
                .with("Cathode Weight (mg)", 12.5),
        )
        .unwrap();
    store
}

#[test]
fn open_creates_tables_and_enforces_foreign_keys() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("state.db");
    let store = StateStore::open(&path).unwrap();
    assert!(path.exists());
    for table in ["samples", "jobs", "pipelines"] {
        assert!(store.table_exists(table).unwrap(), "missing table {table}");
    }
    let fk: i64 = store
        .connection
        .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
        .unwrap();
    assert_eq!(fk, 1);
}

#[test]
fn jobs_table_from_older_schema_gains_server_columns() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.db");
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            r#"CREATE TABLE jobs (
                "Job ID" VARCHAR(255) PRIMARY KEY,
                "Sample ID" VARCHAR(255),
                "Pipeline" VARCHAR(50),
                "Status" VARCHAR(3),
                "Jobname" VARCHAR(50),
                "Job ID on Server" INT,
                "Submitted" DATETIME,
                "Payload" TEXT,
                "Comment" TEXT,
                "Last Checked" DATETIME,
                "Snapshot Status" VARCHAR(3),
                "Last Snapshot" DATETIME
            );
            INSERT INTO jobs ("Job ID", "Job ID on Server", "Status") VALUES ('old-1', 17, 'c');"#,
        )
        .unwrap();
    }
    let store = StateStore::open(&path).unwrap();
    let columns = store.table_columns("jobs").unwrap();
    assert!(columns.contains("Server Label"));
    assert!(columns.contains("Server Hostname"));
    let job = store.get_job("old-1").unwrap().unwrap();
    assert_eq!(job.job_id_on_server.as_deref(), Some("17"));
    assert_eq!(job.status, Some(JobStatus::Completed));
}

#[test]
fn create_job_links_pipeline_and_sample_in_one_step() {
    let mut store = store_with_pipeline();
    let submitted = datetime!(2025-01-02 03:04:05);
    let job_id = store
        .create_job(
            &NewJob {
                sample_id: "240701_kigr_01".into(),
                pipeline: "nw4-120-1-1".into(),
                jobname: Some("formation".into()),
                job_id_on_server: Some("901".into()),
                ..NewJob::default()
            },
            submitted,
        )
        .unwrap();
    assert_eq!(job_id, "nw4-120-1-1-1");

    let job = store.get_job(&job_id).unwrap().unwrap();
    assert_eq!(job.status, Some(JobStatus::Submitted));
    assert_eq!(job.submitted, Some(submitted));
    assert_eq!(job.server_label.as_deref(), Some("nw4"));

    let pipeline = store.get_pipeline("nw4-120-1-1").unwrap().unwrap();
    assert_eq!(pipeline.job_id.as_deref(), Some(job_id.as_str()));
    assert_eq!(pipeline.sample_id.as_deref(), Some("240701_kigr_01"));

    let sample = store.get_sample("240701_kigr_01").unwrap().unwrap();
    assert_eq!(sample.pipeline.as_deref(), Some("nw4-120-1-1"));
    assert_eq!(sample.job_id.as_deref(), Some(job_id.as_str()));
}

#[test]
fn create_job_refuses_pipeline_with_live_job() {
    let mut store = store_with_pipeline();
    let new_job = NewJob {
        sample_id: "240701_kigr_01".into(),
        pipeline: "nw4-120-1-1".into(),
        ..NewJob::default()
    };
    let now = datetime!(2025-01-02 03:04:05);
    let first = store.create_job(&new_job, now).unwrap();
    let err = store.create_job(&new_job, now).unwrap_err();
    assert!(matches!(err, StoreError::PipelineBusy { .. }));

    store
        .record_job_check(&first, Some("nw4-120-1-1"), JobStatus::Completed, now)
        .unwrap();
    let second = store.create_job(&new_job, now).unwrap();
    assert_eq!(second, "nw4-120-1-1-2");
}

#[test]
fn job_with_unknown_sample_or_pipeline_is_not_created() {
    let mut store = store_with_pipeline();
    let now = datetime!(2025-01-02 03:04:05);

    let err = store
        .create_job(
            &NewJob {
                sample_id: "ghost".into(),
                pipeline: "nw4-120-1-1".into(),
                ..NewJob::default()
            },
            now,
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::PipelineOccupied { .. } | StoreError::ReferentialIntegrity(_)));

    let raw = Job {
        job_id: "orphan-1".into(),
        sample_id: Some("ghost".into()),
        pipeline: Some("nw4-120-1-1".into()),
        status: Some(JobStatus::Running),
        jobname: None,
        job_id_on_server: None,
        submitted: None,
        payload: None,
        comment: None,
        last_checked: None,
        snapshot_status: None,
        last_snapshot: None,
        server_label: None,
        server_hostname: None,
    };
    let err = store.insert_job(&raw).unwrap_err();
    assert!(matches!(err, StoreError::ReferentialIntegrity(_)));

    let err = store
        .insert_job(&Job {
            job_id: "orphan-2".into(),
            sample_id: Some("240701_kigr_01".into()),
            pipeline: Some("no-such-pipeline".into()),
            ..raw.clone()
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::ReferentialIntegrity(_)));

    assert!(store.list_jobs().unwrap().is_empty());
    let pipeline = store.get_pipeline("nw4-120-1-1").unwrap().unwrap();
    assert_eq!(pipeline.job_id, None);
}

#[test]
fn fresh_pipeline_rejects_unknown_sample_without_side_effects() {
    let mut store = StateStore::open_in_memory().unwrap();
    store.register_pipeline("p1", "srv", "srv.lab").unwrap();
    let err = store
        .create_job(
            &NewJob {
                sample_id: "ghost".into(),
                pipeline: "p1".into(),
                ..NewJob::default()
            },
            datetime!(2025-01-02 03:04:05),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::ReferentialIntegrity(_)));
    assert!(store.list_jobs().unwrap().is_empty());
    assert_eq!(store.get_pipeline("p1").unwrap().unwrap().job_id, None);
}

#[test]
fn assign_and_release_keep_both_sides_consistent() {
    let mut store = store_with_pipeline();
    store.assign_sample("nw4-120-1-1", "240701_kigr_01").unwrap();
    assert_eq!(
        store.get_sample("240701_kigr_01").unwrap().unwrap().pipeline.as_deref(),
        Some("nw4-120-1-1")
    );

    store.insert_sample(&NewSample::new("other", "run")).unwrap();
    let err = store.assign_sample("nw4-120-1-1", "other").unwrap_err();
    assert!(matches!(err, StoreError::PipelineOccupied { .. }));

    store.release_pipeline("nw4-120-1-1").unwrap();
    assert_eq!(store.get_sample("240701_kigr_01").unwrap().unwrap().pipeline, None);
    let pipeline = store.get_pipeline("nw4-120-1-1").unwrap().unwrap();
    assert_eq!(pipeline.sample_id, None);
    assert_eq!(pipeline.job_id, None);
}

#[test]
fn release_refuses_while_job_is_live() {
    let mut store = store_with_pipeline();
    let now = datetime!(2025-01-02 03:04:05);
    let job_id = store
        .create_job(
            &NewJob {
                sample_id: "240701_kigr_01".into(),
                pipeline: "nw4-120-1-1".into(),
                ..NewJob::default()
            },
            now,
        )
        .unwrap();

    let err = store.release_pipeline("nw4-120-1-1").unwrap_err();
    assert!(matches!(err, StoreError::PipelineBusy { .. }));
    let pipeline = store.get_pipeline("nw4-120-1-1").unwrap().unwrap();
    assert_eq!(pipeline.job_id.as_deref(), Some(job_id.as_str()));
    assert_eq!(pipeline.sample_id.as_deref(), Some("240701_kigr_01"));

    store
        .record_job_check(&job_id, Some("nw4-120-1-1"), JobStatus::Completed, now)
        .unwrap();
    store.release_pipeline("nw4-120-1-1").unwrap();
    assert_eq!(store.get_pipeline("nw4-120-1-1").unwrap().unwrap().job_id, None);
    assert_eq!(
        store.get_job(&job_id).unwrap().unwrap().status,
        Some(JobStatus::Completed)
    );
}

#[test]
fn register_pipeline_refreshes_hostname_but_keeps_assignment() {
    let mut store = store_with_pipeline();
    store.assign_sample("nw4-120-1-1", "240701_kigr_01").unwrap();
    store.register_pipeline("nw4-120-1-1", "nw4", "nw4-new.lab").unwrap();
    let pipeline = store.get_pipeline("nw4-120-1-1").unwrap().unwrap();
    assert_eq!(pipeline.server_hostname.as_deref(), Some("nw4-new.lab"));
    assert_eq!(pipeline.sample_id.as_deref(), Some("240701_kigr_01"));
}

#[test]
fn record_job_check_updates_job_and_pipeline_timestamps() {
    let mut store = store_with_pipeline();
    let job_id = store
        .create_job(
            &NewJob {
                sample_id: "240701_kigr_01".into(),
                pipeline: "nw4-120-1-1".into(),
                ..NewJob::default()
            },
            datetime!(2025-01-02 03:04:05),
        )
        .unwrap();
    let checked = datetime!(2025-01-02 04:00:00);
    store
        .record_job_check(&job_id, Some("nw4-120-1-1"), JobStatus::Running, checked)
        .unwrap();
    let job = store.get_job(&job_id).unwrap().unwrap();
    assert_eq!(job.status, Some(JobStatus::Running));
    assert_eq!(job.last_checked, Some(checked));
    assert_eq!(
        store.get_pipeline("nw4-120-1-1").unwrap().unwrap().last_checked,
        Some(checked)
    );

    let err = store
        .record_job_check("missing", None, JobStatus::Running, checked)
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownJob(_)));
}

#[test]
fn record_snapshot_sets_status_and_time() {
    let mut store = store_with_pipeline();
    let job_id = store
        .create_job(
            &NewJob {
                sample_id: "240701_kigr_01".into(),
                pipeline: "nw4-120-1-1".into(),
                ..NewJob::default()
            },
            datetime!(2025-01-02 03:04:05),
        )
        .unwrap();
    let at = datetime!(2025-01-03 02:00:10);
    store.record_snapshot(&job_id, SnapshotStatus::Ongoing, at).unwrap();
    let job = store.get_job(&job_id).unwrap().unwrap();
    assert_eq!(job.snapshot_status, Some(SnapshotStatus::Ongoing));
    assert_eq!(job.last_snapshot, Some(at));
}

#[test]
fn manual_job_merge_is_idempotent_and_never_overwrites() {
    let mut store = store_with_pipeline();
    let records = vec![manual("tt1-7", "240701_kigr_01")];

    let first = store.merge_manual_jobs(&records).unwrap();
    assert_eq!(first.inserted, vec!["tt1-7".to_string()]);

    let checked = datetime!(2025-01-02 04:00:00);
    store
        .record_job_check("tt1-7", None, JobStatus::Running, checked)
        .unwrap();
    let before = store.list_jobs().unwrap();

    let second = store.merge_manual_jobs(&records).unwrap();
    assert!(second.inserted.is_empty());
    assert_eq!(second.already_present, vec!["tt1-7".to_string()]);

    let after = store.list_jobs().unwrap();
    assert_eq!(before, after);
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].status, Some(JobStatus::Running));
    assert_eq!(after[0].last_checked, Some(checked));
}

#[test]
fn manual_job_with_unknown_sample_is_rejected_alone() {
    let mut store = store_with_pipeline();
    let report = store
        .merge_manual_jobs(&[manual("bad-1", "ghost"), manual("good-1", "240701_kigr_01")])
        .unwrap();
    assert_eq!(report.inserted, vec!["good-1".to_string()]);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].0, "bad-1");
    assert!(store.get_job("bad-1").unwrap().is_none());
}

#[test]
fn manual_jobs_load_accepts_numeric_server_ids() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("manual_job_tracking.json");
    std::fs::write(
        &path,
        r#"[
            {"Job ID": "tt1-1", "Sample ID": "s1", "Server Label": "tt1",
             "Server Hostname": "tt1.lab", "Job ID on Server": 15},
            {"Job ID": "tt1-2", "Sample ID": "s2", "Server Label": "tt1",
             "Server Hostname": "tt1.lab", "Job ID on Server": "16"}
        ]"#,
    )
    .unwrap();
    let records = load_manual_jobs(&path).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].job_id_on_server, "15");
    assert_eq!(records[1].job_id_on_server, "16");

    std::fs::write(&path, "{not json").unwrap();
    assert!(matches!(
        load_manual_jobs(&path).unwrap_err(),
        StoreError::ParseManualJobs { .. }
    ));
}

#[test]
fn adding_a_column_preserves_existing_rows() {
    let mut store = store_with_metadata();
    let wanted = vec![
        ColumnSpec::new("Anode Type", "VARCHAR(255)"),
        ColumnSpec::new("Cathode Weight (mg)", "FLOAT"),
        ColumnSpec::new("Barcode", "VARCHAR(255)"),
    ];
    let outcome = store.sync_schema(&wanted, &mut DenyRemoval).unwrap();
    assert_eq!(outcome.added, vec!["Barcode".to_string()]);
    assert!(outcome.removed.is_empty());

    assert_eq!(
        store.sample_value("s1", "Anode Type").unwrap(),
        Value::Text("graphite".into())
    );
    assert_eq!(store.sample_value("s1", "Cathode Weight (mg)").unwrap(), Value::Real(12.5));
    assert_eq!(store.sample_value("s1", "Barcode").unwrap(), Value::Null);
    assert_eq!(
        store.get_sample("s1").unwrap().unwrap().run_id.as_deref(),
        Some("run1")
    );
}

#[test]
fn declining_either_confirmation_keeps_columns() {
    let wanted = vec![ColumnSpec::new("Anode Type", "VARCHAR(255)")];

    for (removal, data_loss, expected_questions) in [
        (false, true, vec!["removal"]),
        (true, false, vec!["removal", "data_loss"]),
    ] {
        let mut store = store_with_metadata();
        let before = store.sample_columns().unwrap();
        let mut approval = ScriptedApproval {
            removal,
            data_loss,
            asked: Vec::new(),
        };
        let outcome = store.sync_schema(&wanted, &mut approval).unwrap();
        assert_eq!(approval.asked, expected_questions);
        assert!(outcome.removed.is_empty());
        assert_eq!(outcome.removal_declined, vec!["Cathode Weight (mg)".to_string()]);
        assert_eq!(store.sample_columns().unwrap(), before);
        assert_eq!(store.sample_value("s1", "Cathode Weight (mg)").unwrap(), Value::Real(12.5));
    }
}

#[test]
fn accepting_both_confirmations_removes_only_absent_columns() {
    let mut store = store_with_metadata();
    let wanted = vec![ColumnSpec::new("Anode Type", "VARCHAR(255)")];
    let mut approval = FlagApproval {
        allow_column_removal: true,
        confirm_data_loss: true,
    };
    let outcome = store.sync_schema(&wanted, &mut approval).unwrap();
    assert_eq!(outcome.removed, vec!["Cathode Weight (mg)".to_string()]);
    assert_eq!(
        store.sample_columns().unwrap(),
        vec!["Sample ID", "Run ID", "Pipeline", "Job ID", "Anode Type"]
    );
    assert_eq!(
        store.sample_value("s1", "Anode Type").unwrap(),
        Value::Text("graphite".into())
    );
}

#[test]
fn fixed_columns_are_never_removal_candidates() {
    let store = store_with_metadata();
    let plan = store.plan_schema(&[]).unwrap();
    assert!(plan.to_add.is_empty());
    assert_eq!(
        plan.to_remove,
        vec!["Anode Type".to_string(), "Cathode Weight (mg)".to_string()]
    );
}

#[test]
fn invalid_column_type_is_rejected_before_any_change() {
    let mut store = store_with_metadata();
    let before = store.sample_columns().unwrap();
    let wanted = vec![
        ColumnSpec::new("Anode Type", "VARCHAR(255)"),
        ColumnSpec::new("Cathode Weight (mg)", "FLOAT"),
        ColumnSpec::new("Evil", "TEXT); DROP TABLE jobs; --"),
    ];
    let err = store.sync_schema(&wanted, &mut DenyRemoval).unwrap_err();
    assert!(matches!(err, StoreError::InvalidColumnType { .. }));
    assert_eq!(store.sample_columns().unwrap(), before);
    assert!(store.table_exists("jobs").unwrap());
}

#[test]
fn interactive_approval_requires_exact_answers() {
    let mut output = Vec::new();
    let mut approval = InteractiveApproval::new("yes\nreally\n".as_bytes(), &mut output);
    let columns = vec!["Barcode".to_string()];
    assert!(approval.confirm_removal(&columns));
    assert!(approval.confirm_data_loss(&columns));
    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("would remove columns: Barcode"));

    let mut sink = Vec::new();
    let mut approval = InteractiveApproval::new("y\n".as_bytes(), &mut sink);
    assert!(!approval.confirm_removal(&columns));
}

#[test]
fn unknown_metadata_column_is_rejected_on_insert() {
    let store = StateStore::open_in_memory().unwrap();
    let err = store
        .insert_sample(&NewSample::new("s1", "run1").with("Nope", 1i64))
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownColumn(_)));
}

#[test]
fn identifiers_for_analysis_come_from_samples_with_jobs() {
    let mut store = store_with_pipeline();
    store.insert_sample(&NewSample::new("idle", "other_run")).unwrap();
    store
        .create_job(
            &NewJob {
                sample_id: "240701_kigr_01".into(),
                pipeline: "nw4-120-1-1".into(),
                ..NewJob::default()
            },
            datetime!(2025-01-02 03:04:05),
        )
        .unwrap();
    assert_eq!(store.sample_ids_with_jobs().unwrap(), vec!["240701_kigr_01".to_string()]);
    assert_eq!(store.run_ids().unwrap(), vec!["240701_kigr".to_string()]);
}
