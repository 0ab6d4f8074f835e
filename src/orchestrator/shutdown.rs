use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

static OS_SIGNAL: AtomicBool = AtomicBool::new(false);

/// Cooperative stop request checked between orchestrator steps.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
    watch_os: bool,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal that also trips on SIGINT or SIGTERM.
    pub fn install() -> Self {
        install_os_handlers();
        Self {
            requested: Arc::default(),
            watch_os: true,
        }
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst) || (self.watch_os && OS_SIGNAL.load(Ordering::SeqCst))
    }
}

#[cfg(unix)]
extern "C" fn handle_signal(_signal: libc::c_int) {
    OS_SIGNAL.store(true, Ordering::SeqCst);
}

#[cfg(unix)]
fn install_os_handlers() {
    for (signal, name) in [(libc::SIGINT, "SIGINT"), (libc::SIGTERM, "SIGTERM")] {
        let previous = unsafe {
            libc::signal(
                signal,
                handle_signal as extern "C" fn(libc::c_int) as libc::sighandler_t,
            )
        };
        if previous == libc::SIG_ERR {
            warn!("Failed to install {name} handler");
        }
    }
    info!("Listening for SIGINT and SIGTERM");
}

#[cfg(not(unix))]
fn install_os_handlers() {
    warn!("Signal handling unavailable on this platform; stop the process to exit");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_seen_by_clones() {
        let signal = ShutdownSignal::new();
        let observer = signal.clone();
        assert!(!observer.is_requested());
        signal.request();
        assert!(observer.is_requested());
    }
}
