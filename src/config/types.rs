use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::store::ColumnSpec;

/// Seconds between two reconciliation ticks when not configured.
pub const DEFAULT_UPDATE_INTERVAL_SECONDS: u64 = 300;
/// Daily anchor used when no snapshot times are configured.
pub const DEFAULT_SNAPSHOT_TIME: &str = "02:00";

const DEFAULT_STATUS_COMMAND: &str = "ketchup status";
const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 10;

/// Merged local + shared configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub database_path: PathBuf,
    #[serde(default)]
    pub shared_config_path: Option<PathBuf>,
    #[serde(default)]
    pub ssh_private_key_path: Option<PathBuf>,
    #[serde(default)]
    pub snapshots_folder_path: Option<PathBuf>,
    #[serde(default = "default_update_interval")]
    pub update_interval_seconds: u64,
    /// Daily `HH:MM` anchors for the maintenance sequence.
    #[serde(default)]
    pub snapshot_times: Vec<String>,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
    #[serde(default)]
    pub sample_columns: Vec<ColumnSpec>,
    /// Harvest commands, run in this order.
    #[serde(default)]
    pub harvesters: Vec<HarvesterConfig>,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub save_log: bool,
    /// Local file this config was loaded from.
    #[serde(skip)]
    pub local_config_path: PathBuf,
}

/// A remote server hosting one or more pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub label: String,
    pub hostname: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Prepended to every remote command, e.g. `conda activate tomato ;`.
    #[serde(default)]
    pub command_prefix: String,
    /// Command printing one `<job id> <status>` line per job.
    #[serde(default = "default_status_command")]
    pub status_command: String,
    /// Remote location of a job's raw output; `{job}` is replaced by the
    /// job ID on the server.
    #[serde(default)]
    pub snapshot_source: Option<String>,
    #[serde(default)]
    pub pipelines: Vec<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

/// External harvester for one instrument family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvesterConfig {
    pub family: String,
    pub command: Vec<String>,
}

/// External analysis commands; the identifier is appended as last argument.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub sample_command: Option<Vec<String>>,
    #[serde(default)]
    pub batch_command: Option<Vec<String>>,
}

fn default_update_interval() -> u64 {
    DEFAULT_UPDATE_INTERVAL_SECONDS
}

fn default_status_command() -> String {
    DEFAULT_STATUS_COMMAND.to_string()
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECONDS
}

impl DaemonConfig {
    /// Treat empty placeholder paths as unset and fill defaults.
    pub fn normalized(mut self) -> Self {
        for path in [
            &mut self.shared_config_path,
            &mut self.ssh_private_key_path,
            &mut self.snapshots_folder_path,
        ] {
            if path.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
                *path = None;
            }
        }
        if self.update_interval_seconds == 0 {
            self.update_interval_seconds = DEFAULT_UPDATE_INTERVAL_SECONDS;
        }
        if self.snapshot_times.is_empty() {
            self.snapshot_times = vec![DEFAULT_SNAPSHOT_TIME.to_string()];
        }
        self
    }
}
