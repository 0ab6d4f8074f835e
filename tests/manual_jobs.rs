//! Importing manually tracked jobs from a JSON file.

use cycler_sync::store::{NewSample, StateStore, load_manual_jobs};
use tempfile::tempdir;

const JOBS: &str = r#"[
  {"Job ID": "tt1-17", "Sample ID": "240701_kigr_01", "Server Label": "tt1",
   "Server Hostname": "tt1.lab", "Job ID on Server": 17},
  {"Job ID": "tt1-18", "Sample ID": "240701_kigr_02", "Server Label": "tt1",
   "Server Hostname": "tt1.lab", "Job ID on Server": "18"},
  {"Job ID": "tt1-19", "Sample ID": "not-registered", "Server Label": "tt1",
   "Server Hostname": "tt1.lab", "Job ID on Server": 19}
]"#;

#[test]
fn importing_twice_changes_nothing_the_second_time() {
    let dir = tempdir().unwrap();
    let jobs_path = dir.path().join("manual_jobs.json");
    std::fs::write(&jobs_path, JOBS).unwrap();
    let db_path = dir.path().join("db").join("fleet.db");

    let mut store = StateStore::open(&db_path).unwrap();
    for sample in ["240701_kigr_01", "240701_kigr_02"] {
        store
            .insert_sample(&NewSample::new(sample, "240701_kigr"))
            .unwrap();
    }
    let records = load_manual_jobs(&jobs_path).unwrap();
    assert_eq!(records.len(), 3);

    let first = store.merge_manual_jobs(&records).unwrap();
    assert_eq!(first.inserted, vec!["tt1-17", "tt1-18"]);
    assert_eq!(first.rejected.len(), 1);
    assert_eq!(first.rejected[0].0, "tt1-19");
    let before = store.list_jobs().unwrap();
    drop(store);

    let mut store = StateStore::open(&db_path).unwrap();
    let second = store.merge_manual_jobs(&records).unwrap();
    assert!(second.inserted.is_empty());
    assert_eq!(second.already_present, vec!["tt1-17", "tt1-18"]);
    assert_eq!(store.list_jobs().unwrap(), before);

    let job = store.get_job("tt1-17").unwrap().unwrap();
    assert_eq!(job.job_id_on_server.as_deref(), Some("17"));
    assert_eq!(job.pipeline, None);
    assert!(job.is_live());
}

#[test]
fn malformed_file_is_reported() {
    let dir = tempdir().unwrap();
    let jobs_path = dir.path().join("manual_jobs.json");
    std::fs::write(&jobs_path, "{\"Job ID\": 1}").unwrap();
    assert!(load_manual_jobs(&jobs_path).is_err());
    assert!(load_manual_jobs(&dir.path().join("missing.json")).is_err());
}
