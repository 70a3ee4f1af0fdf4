//! Process-wide logging and crash reporting for bridge hosts.

mod logging;
#[cfg(test)]
mod tests;

use std::{panic, sync::OnceLock};

pub(crate) use logging::panic_payload_text;
pub use logging::{
    crash_log_path, init_logging, log_debug, log_debug_content, log_file_path, log_panic,
    LogSettings,
};

static PANIC_HOOK_INSTALLED: OnceLock<()> = OnceLock::new();

/// Chain a panic hook that records crashes before the previous hook runs.
pub fn install_panic_hook() {
    PANIC_HOOK_INSTALLED.get_or_init(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            log_panic(info);
            let location = info
                .location()
                .map(|loc| format!("{}:{}", loc.file(), loc.line()))
                .unwrap_or_else(|| "unknown".to_string());
            log_debug(&format!("panic at {location}"));
            log_debug_content(&format!("panic: {info}"));
            previous(info);
        }));
    });
}
