//! Where the daemon keeps its own files.
//!
//! Everything lives in one `.cycler_sync` folder under the OS config root:
//! the local `config.toml` and the `logs/` folder. Point
//! `CYCLER_SYNC_CONFIG_HOME` somewhere else to relocate it.

use std::{
    fs,
    path::PathBuf,
    sync::{LazyLock, Mutex},
};

use directories::BaseDirs;
use thiserror::Error;

pub const APP_DIR_NAME: &str = ".cycler_sync";

/// Replaces the OS config root as the parent of [`APP_DIR_NAME`].
pub const CONFIG_HOME_ENV: &str = "CYCLER_SYNC_CONFIG_HOME";

const LOGS_DIR_NAME: &str = "logs";

static TEST_BASE: LazyLock<Mutex<Option<PathBuf>>> = LazyLock::new(|| Mutex::new(None));

#[derive(Debug, Error)]
pub enum AppDirError {
    #[error("Cannot locate a config root; set {CONFIG_HOME_ENV}")]
    NoBaseDir,
    #[error("Cannot create folder {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The `.cycler_sync` folder, created on first use.
pub fn app_root_dir() -> Result<PathBuf, AppDirError> {
    let base = base_dir().ok_or(AppDirError::NoBaseDir)?;
    ensure_dir(base.join(APP_DIR_NAME))
}

pub fn logs_dir() -> Result<PathBuf, AppDirError> {
    ensure_dir(app_root_dir()?.join(LOGS_DIR_NAME))
}

fn ensure_dir(path: PathBuf) -> Result<PathBuf, AppDirError> {
    match fs::create_dir_all(&path) {
        Ok(()) => Ok(path),
        Err(source) => Err(AppDirError::CreateDir { path, source }),
    }
}

fn base_dir() -> Option<PathBuf> {
    test_base()
        .or_else(|| std::env::var_os(CONFIG_HOME_ENV).map(PathBuf::from))
        .or_else(|| BaseDirs::new().map(|dirs| dirs.config_dir().to_path_buf()))
}

fn test_base() -> Option<PathBuf> {
    TEST_BASE.lock().ok().and_then(|base| base.clone())
}

/// Serializes tests that relocate the app folder; restores it on drop.
#[cfg(test)]
pub(crate) struct ConfigBaseGuard {
    _serial: std::sync::MutexGuard<'static, ()>,
}

#[cfg(test)]
static SERIAL: Mutex<()> = Mutex::new(());

#[cfg(test)]
impl ConfigBaseGuard {
    pub(crate) fn set(base: PathBuf) -> Self {
        let serial = SERIAL.lock().unwrap_or_else(|err| err.into_inner());
        *TEST_BASE.lock().expect("test base mutex poisoned") = Some(base);
        Self { _serial: serial }
    }
}

#[cfg(test)]
impl Drop for ConfigBaseGuard {
    fn drop(&mut self) {
        if let Ok(mut base) = TEST_BASE.lock() {
            base.take();
        }
    }
}
