//! Tracing setup shared by the daemon and the database tool.
//!
//! Events always go to stdout. With `save_log` enabled they are also written
//! to `<app dir>/logs/cycler-sync_<launch time>.log`; only the newest
//! [`MAX_LOG_FILES`] files are kept.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
    time::SystemTime,
};

use thiserror::Error;
use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

use crate::app_dirs::{self, AppDirError};

/// Log files retained in the logs folder, including the current one.
pub const MAX_LOG_FILES: usize = 10;
const LOG_FILE_PREFIX: &str = "cycler-sync";
const DEFAULT_DIRECTIVE: &str = "info";

const FILE_STAMP: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
const EVENT_STAMP: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Set once; holds the file writer's flush guard for the process lifetime.
static INSTALLED: OnceLock<Option<WorkerGuard>> = OnceLock::new();

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Log folder unavailable: {0}")]
    LogDir(#[from] AppDirError),
    #[error("Failed to list log folder {path}: {source}")]
    ListLogs {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to delete old log {path}: {source}")]
    DeleteLog {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to create log file {path}: {source}")]
    OpenLog {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to format log file name: {0}")]
    FileStamp(#[from] time::error::Format),
    #[error("A global tracing subscriber is already installed: {0}")]
    Install(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Install the global subscriber. Later calls do nothing.
///
/// `RUST_LOG` overrides the default `info` level.
pub fn init(save_to_file: bool) -> Result<(), LoggingError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);

    let (file_layer, guard, log_path) = if save_to_file {
        let dir = app_dirs::logs_dir()?;
        let name = log_file_name(OffsetDateTime::now_utc().to_offset(offset))?;
        let path = dir.join(&name);
        fs::File::create(&path).map_err(|source| LoggingError::OpenLog {
            path: path.clone(),
            source,
        })?;
        prune_logs(&dir, MAX_LOG_FILES)?;
        let (writer, guard) = tracing_appender::non_blocking(rolling::never(&dir, name));
        let layer = fmt::layer()
            .with_ansi(false)
            .with_timer(fmt::time::OffsetTime::new(offset, EVENT_STAMP))
            .with_writer(writer);
        (Some(layer), Some(guard), Some(path))
    } else {
        (None, None, None)
    };

    let subscriber = Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE)))
        .with(
            fmt::layer()
                .with_timer(fmt::time::OffsetTime::new(offset, EVENT_STAMP))
                .with_writer(std::io::stdout),
        )
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber)?;
    let _ = INSTALLED.set(guard);

    if let Some(path) = log_path {
        tracing::info!("Writing log to {}", path.display());
    }
    Ok(())
}

fn log_file_name(launched: OffsetDateTime) -> Result<String, LoggingError> {
    Ok(format!(
        "{LOG_FILE_PREFIX}_{}.log",
        launched.format(FILE_STAMP)?
    ))
}

/// Delete the oldest `.log` files until at most `keep` remain.
fn prune_logs(dir: &Path, keep: usize) -> Result<(), LoggingError> {
    let listing = fs::read_dir(dir).map_err(|source| LoggingError::ListLogs {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut logs: Vec<(SystemTime, PathBuf)> = listing
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "log"))
        .map(|path| {
            let modified = fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, path)
        })
        .collect();
    logs.sort_unstable_by(|a, b| b.0.cmp(&a.0));
    for (_, path) in logs.into_iter().skip(keep) {
        fs::remove_file(&path).map_err(|source| LoggingError::DeleteLog { path, source })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn file_name_carries_launch_time() {
        let launched = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        assert_eq!(
            log_file_name(launched).unwrap(),
            "cycler-sync_2023-11-14_22-13-20.log"
        );
    }

    #[test]
    fn pruning_keeps_newest_logs_only() {
        let dir = tempdir().unwrap();
        for idx in 0..12 {
            fs::write(dir.path().join(format!("cycler-sync_{idx}.log")), "").unwrap();
            std::thread::sleep(Duration::from_millis(10));
        }
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        prune_logs(dir.path(), 10).unwrap();

        let logs = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "log"))
            .count();
        assert_eq!(logs, 10);
        assert!(!dir.path().join("cycler-sync_0.log").exists());
        assert!(!dir.path().join("cycler-sync_1.log").exists());
        assert!(dir.path().join("cycler-sync_11.log").exists());
        assert!(dir.path().join("notes.txt").exists());
    }
}
