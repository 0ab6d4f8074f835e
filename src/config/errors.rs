use std::path::PathBuf;

use thiserror::Error;

/// Anything that stops the daemon from starting with a usable config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot create the config folder {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Writing the placeholder local config failed.
    #[error("Cannot write placeholder config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path} is not valid TOML: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Cannot render placeholder config for {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
    /// `path` is the local file the merge started from.
    #[error("Merged settings from {path} are invalid: {source}")]
    Invalid {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Required settings are missing; the operator has to fill them in.
    #[error(
        "Please fill in the config file at {path}.\n\n\
         REQUIRED:\n\
         'database_path' (here or in the shared config): path to the SQLite database.\n\
         'shared_config_path': path to the shared config file on the network drive.\n\n\
         OPTIONAL - to interact with cyclers directly:\n\
         'ssh_private_key_path': path to the SSH private key file.\n\
         'snapshots_folder_path': local folder for unprocessed snapshots."
    )]
    Incomplete { path: PathBuf },
    #[error("Cannot locate a config folder for the local config file")]
    NoConfigDir,
}
