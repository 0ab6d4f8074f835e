//! A throwaway app home for tests that go through `config::load_default`.

use std::{
    ffi::{OsStr, OsString},
    path::PathBuf,
    sync::{Mutex, MutexGuard},
};

use cycler_sync::app_dirs::{APP_DIR_NAME, CONFIG_HOME_ENV};
use tempfile::TempDir;

/// The env var is process-wide; only one home may be active at a time.
static ACTIVE: Mutex<()> = Mutex::new(());

pub struct TempAppHome {
    base: TempDir,
    previous: Option<OsString>,
    _active: MutexGuard<'static, ()>,
}

impl TempAppHome {
    pub fn new() -> Self {
        let active = ACTIVE.lock().unwrap_or_else(|err| err.into_inner());
        let base = tempfile::tempdir().unwrap();
        let previous = std::env::var_os(CONFIG_HOME_ENV);
        point_config_home_at(Some(base.path().as_os_str()));
        Self {
            base,
            previous,
            _active: active,
        }
    }

    /// The `.cycler_sync` folder the daemon will use; may not exist yet.
    pub fn app_dir(&self) -> PathBuf {
        self.base.path().join(APP_DIR_NAME)
    }

    /// Write `contents` to `name` inside the app folder.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.app_dir().join(name);
        std::fs::create_dir_all(self.app_dir()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }
}

impl Drop for TempAppHome {
    fn drop(&mut self) {
        point_config_home_at(self.previous.as_deref());
    }
}

fn point_config_home_at(value: Option<&OsStr>) {
    // SAFETY: callers hold `ACTIVE`, so no other test touches the env concurrently.
    unsafe {
        match value {
            Some(value) => std::env::set_var(CONFIG_HOME_ENV, value),
            None => std::env::remove_var(CONFIG_HOME_ENV),
        }
    }
}
