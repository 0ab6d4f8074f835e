use std::path::{Path, PathBuf};

use tempfile::tempdir;

use super::load::resolve_relative_paths;
use super::*;
use crate::app_dirs::{APP_DIR_NAME, ConfigBaseGuard};

fn write(path: &Path, text: &str) {
    std::fs::write(path, text).unwrap();
}

#[test]
fn missing_local_file_is_created_with_placeholders() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

    let err = load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Incomplete { path: ref p } if p == &path));
    assert!(err.to_string().contains("database_path"));

    let table: toml::Table = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    for key in [
        "shared_config_path",
        "database_path",
        "ssh_private_key_path",
        "snapshots_folder_path",
    ] {
        assert_eq!(table.get(key).and_then(toml::Value::as_str), Some(""));
    }
}

#[test]
fn placeholder_file_is_still_incomplete_on_second_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    let _ = load(&path);
    assert!(matches!(load(&path), Err(ConfigError::Incomplete { .. })));
}

#[test]
fn shared_values_override_local_and_paths_resolve_per_file() {
    let dir = tempdir().unwrap();
    let local_dir = dir.path().join("local");
    let shared_dir = dir.path().join("shared");
    std::fs::create_dir_all(&local_dir).unwrap();
    std::fs::create_dir_all(&shared_dir).unwrap();

    let local = local_dir.join(CONFIG_FILE_NAME);
    write(
        &local,
        r#"
shared_config_path = "../shared/shared.toml"
database_path = "local.db"
ssh_private_key_path = "keys/id_rsa"
update_interval_seconds = 60
"#,
    );
    write(
        &shared_dir.join("shared.toml"),
        r#"
database_path = "fleet.db"
snapshot_times = ["02:00", "14:00"]

[[servers]]
label = "srv-a"
hostname = "cycler-a.lab"
pipelines = ["MPG2-1-1", "MPG2-1-2"]

[[sample_columns]]
name = "Cathode Mass (mg)"
type = "REAL"
"#,
    );

    let config = load(&local).unwrap();
    assert_eq!(config.database_path, local_dir.join("../shared/fleet.db"));
    assert_eq!(
        config.ssh_private_key_path,
        Some(local_dir.join("keys/id_rsa"))
    );
    assert_eq!(config.update_interval_seconds, 60);
    assert_eq!(config.snapshot_times, vec!["02:00", "14:00"]);
    assert_eq!(config.servers.len(), 1);
    assert_eq!(config.servers[0].status_command, "ketchup status");
    assert_eq!(config.servers[0].connect_timeout_seconds, 10);
    assert_eq!(config.sample_columns[0].sql_type, "REAL");
    assert_eq!(config.local_config_path, local);
    assert_eq!(config.snapshots_folder_path, None);
}

#[test]
fn database_path_is_required() {
    let dir = tempdir().unwrap();
    let local = dir.path().join(CONFIG_FILE_NAME);
    write(&local, "database_path = \"\"\nsave_log = true\n");
    assert!(matches!(load(&local), Err(ConfigError::Incomplete { .. })));
}

#[test]
fn missing_shared_file_is_a_read_error() {
    let dir = tempdir().unwrap();
    let local = dir.path().join(CONFIG_FILE_NAME);
    write(
        &local,
        "shared_config_path = \"nowhere.toml\"\ndatabase_path = \"db.sqlite\"\n",
    );
    let err = load(&local).unwrap_err();
    assert!(matches!(err, ConfigError::Read { ref path, .. } if path == &dir.path().join("nowhere.toml")));
}

#[test]
fn invalid_toml_reports_the_file() {
    let dir = tempdir().unwrap();
    let local = dir.path().join(CONFIG_FILE_NAME);
    write(&local, "database_path = [unterminated");
    assert!(matches!(load(&local), Err(ConfigError::ParseToml { .. })));
}

#[test]
fn defaults_fill_interval_and_anchor() {
    let dir = tempdir().unwrap();
    let local = dir.path().join(CONFIG_FILE_NAME);
    write(&local, "database_path = \"db.sqlite\"\nupdate_interval_seconds = 0\n");
    let config = load(&local).unwrap();
    assert_eq!(config.update_interval_seconds, DEFAULT_UPDATE_INTERVAL_SECONDS);
    assert_eq!(config.snapshot_times, vec![DEFAULT_SNAPSHOT_TIME]);
    assert!(!config.save_log);
}

#[test]
fn absolute_and_non_path_values_are_left_alone() {
    let mut table: toml::Table = toml::from_str(
        r#"
database_path = "/srv/db.sqlite"
label = "relative/looking"
snapshots_folder_path = "snaps"
"#,
    )
    .unwrap();
    resolve_relative_paths(&mut table, Path::new("/etc/cycler"));
    assert_eq!(table["database_path"].as_str(), Some("/srv/db.sqlite"));
    assert_eq!(table["label"].as_str(), Some("relative/looking"));
    assert_eq!(
        table["snapshots_folder_path"].as_str().map(PathBuf::from),
        Some(Path::new("/etc/cycler").join("snaps"))
    );
}

#[test]
fn default_path_lives_in_app_dir() {
    let base = tempdir().unwrap();
    let _guard = ConfigBaseGuard::set(base.path().to_path_buf());
    let path = config_path().unwrap();
    assert_eq!(path, base.path().join(APP_DIR_NAME).join(CONFIG_FILE_NAME));
    assert!(matches!(load_default(), Err(ConfigError::Incomplete { .. })));
    assert!(path.is_file());
}
