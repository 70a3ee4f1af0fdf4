pub mod app;
pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod executor;
pub mod ipc;
mod lock;
pub mod supervisor;
mod telemetry;

pub(crate) use lock::lock_or_recover;
pub use app::{
    crash_log_path, init_logging, install_panic_hook, log_debug, log_debug_content, log_file_path,
    LogSettings,
};
pub use bridge::{Bridge, BridgeOptions, ExecutionReport, TickReport};
pub use executor::{CommandExecutor, CommandOutput, ExecutionError, ProcessExecutor};
pub use telemetry::init_tracing;
