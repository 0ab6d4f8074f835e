//! Daemon configuration: a local TOML file overlaid by a shared one.
//!
//! The local file lives in the app directory (see [`crate::app_dirs`]) and
//! usually only points at the shared file on a network location. Values in
//! the shared file win. The loaded [`DaemonConfig`] is built once at startup
//! and handed to the components that need it.

mod errors;
mod load;
mod types;

#[cfg(test)]
mod tests;

/// Default filename of the local config inside the app directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

pub use errors::ConfigError;
pub use load::{config_path, load, load_default};
pub use types::{
    AnalysisConfig, DEFAULT_SNAPSHOT_TIME, DEFAULT_UPDATE_INTERVAL_SECONDS, DaemonConfig,
    HarvesterConfig, ServerConfig,
};
