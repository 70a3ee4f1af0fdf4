use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};

/// Set by SIGINT/SIGTERM; the tick loop exits once it sees it.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Only touches an atomic flag (async-signal-safe).
#[cfg(unix)]
extern "C" fn handle_shutdown_signal(_: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

#[cfg(unix)]
pub(crate) fn install_shutdown_handlers() -> Result<()> {
    use anyhow::anyhow;
    use skillbridge::log_debug;

    for (signal, name) in [(libc::SIGINT, "SIGINT"), (libc::SIGTERM, "SIGTERM")] {
        unsafe {
            // SAFETY: handle_shutdown_signal is an extern "C" handler that only
            // flips an atomic flag, which is async-signal-safe.
            let handler = handle_shutdown_signal as *const () as libc::sighandler_t;
            if libc::signal(signal, handler) == libc::SIG_ERR {
                log_debug(&format!("failed to install {name} handler"));
                return Err(anyhow!("failed to install {name} handler"));
            }
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn install_shutdown_handlers() -> Result<()> {
    skillbridge::log_debug("shutdown signal handlers unavailable on this platform");
    Ok(())
}

pub(crate) fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn handler_sets_flag() {
        SHUTDOWN_REQUESTED.store(false, Ordering::SeqCst);
        handle_shutdown_signal(libc::SIGTERM);
        assert!(shutdown_requested());
        SHUTDOWN_REQUESTED.store(false, Ordering::SeqCst);
    }

    #[test]
    fn install_handlers_succeeds() {
        assert!(install_shutdown_handlers().is_ok());
    }
}
