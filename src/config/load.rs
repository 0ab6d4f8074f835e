use std::path::{Path, PathBuf};

use serde::de::Error as SerdeDeError;
use tracing::{info, warn};

use crate::app_dirs::{self, AppDirError};

use super::{CONFIG_FILE_NAME, ConfigError, DaemonConfig};

const PLACEHOLDER_KEYS: [&str; 4] = [
    "shared_config_path",
    "database_path",
    "ssh_private_key_path",
    "snapshots_folder_path",
];

/// Resolve the local configuration file path, ensuring the parent directory exists.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let dir = app_dirs::app_root_dir().map_err(map_app_dir_error)?;
    Ok(dir.join(CONFIG_FILE_NAME))
}

/// Load configuration from the default local file.
pub fn load_default() -> Result<DaemonConfig, ConfigError> {
    load(&config_path()?)
}

/// Load the local file at `local_path`, overlay the shared file it points
/// to, and validate the result.
///
/// A missing local file is created with empty placeholders and reported as
/// [`ConfigError::Incomplete`].
pub fn load(local_path: &Path) -> Result<DaemonConfig, ConfigError> {
    if !local_path.exists() {
        write_placeholder(local_path)?;
        warn!("Created placeholder config at {}", local_path.display());
        return Err(ConfigError::Incomplete {
            path: local_path.to_path_buf(),
        });
    }

    let mut merged = read_table(local_path)?;
    let shared_path = merged
        .get("shared_config_path")
        .and_then(toml::Value::as_str)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from);
    if let Some(shared_path) = shared_path {
        let shared = read_table(&shared_path)?;
        info!("Overlaying shared config from {}", shared_path.display());
        for (key, value) in shared {
            merged.insert(key, value);
        }
    }

    let has_database = merged
        .get("database_path")
        .and_then(toml::Value::as_str)
        .is_some_and(|value| !value.is_empty());
    if !has_database {
        return Err(ConfigError::Incomplete {
            path: local_path.to_path_buf(),
        });
    }

    let mut config: DaemonConfig = toml::Value::Table(merged)
        .try_into()
        .map_err(|source| ConfigError::Invalid {
            path: local_path.to_path_buf(),
            source,
        })?;
    config.local_config_path = local_path.to_path_buf();
    Ok(config.normalized())
}

/// Read one TOML file, resolving relative `*path*` values against its folder.
pub(super) fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8(bytes).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source: SerdeDeError::custom(source),
    })?;
    let mut table: toml::Table = toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    resolve_relative_paths(&mut table, base);
    Ok(table)
}

pub(super) fn resolve_relative_paths(table: &mut toml::Table, base: &Path) {
    for (key, value) in table.iter_mut() {
        if !key.to_ascii_lowercase().contains("path") {
            continue;
        }
        let toml::Value::String(raw) = value else {
            continue;
        };
        if raw.is_empty() || Path::new(raw.as_str()).is_absolute() {
            continue;
        }
        *raw = base.join(raw.as_str()).to_string_lossy().into_owned();
    }
}

fn write_placeholder(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let mut table = toml::Table::new();
    for key in PLACEHOLDER_KEYS {
        table.insert(key.to_string(), toml::Value::String(String::new()));
    }
    let text = toml::to_string_pretty(&table).map_err(|source| ConfigError::SerializeToml {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, text).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn map_app_dir_error(error: AppDirError) -> ConfigError {
    match error {
        AppDirError::NoBaseDir => ConfigError::NoConfigDir,
        AppDirError::CreateDir { path, source } => ConfigError::CreateDir { path, source },
    }
}
