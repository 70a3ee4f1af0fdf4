//! Host options (command line) and the persisted bridge settings record.

mod defaults;
mod record;
mod validation;

use crate::app::LogSettings;
use crate::ipc::DEFAULT_COMMAND_PORT;
use clap::{ArgAction, Parser};
use std::path::{Path, PathBuf};

use defaults::default_exec_cmd;
pub use defaults::{
    CONFIG_FILE_NAME, DEFAULT_BASE_URL, DEFAULT_EXEC_TIMEOUT_MS, DEFAULT_MODEL, DEFAULT_TICK_MS,
    DEFAULT_WORKER_PORT, HISTORY_FILE_NAME, STATE_DIR_NAME,
};
pub use record::{BridgeConfig, ConfigStore, LoadOutcome};

/// CLI options for the headless bridge host. `validate()` resolves paths and
/// rejects values that would reach subprocesses unchecked.
#[derive(Debug, Parser, Clone)]
#[command(
    name = "skillbridge",
    about = "SkillBridge host: supervises the worker and runs its commands",
    author,
    version
)]
pub struct HostConfig {
    /// Project directory holding `.skillbridge/` and the worker package
    #[arg(long = "project-root", env = "SKILLBRIDGE_PROJECT_ROOT")]
    pub project_root: Option<PathBuf>,

    /// Loopback port the worker connects back to
    #[arg(long = "command-port", default_value_t = DEFAULT_COMMAND_PORT)]
    pub command_port: u16,

    /// Interval between main-loop ticks (milliseconds)
    #[arg(long = "tick-ms", default_value_t = DEFAULT_TICK_MS)]
    pub tick_ms: u64,

    /// Interpreter that runs command payloads (payload is written to stdin)
    #[arg(long = "exec-cmd", env = "SKILLBRIDGE_EXEC_CMD", default_value_t = default_exec_cmd())]
    pub exec_cmd: String,

    /// Arguments for the command interpreter (repeatable)
    #[arg(
        long = "exec-arg",
        action = ArgAction::Append,
        value_name = "ARG",
        allow_hyphen_values = true,
        default_values_t = [String::from("-")]
    )]
    pub exec_args: Vec<String>,

    /// Per-command execution timeout (milliseconds)
    #[arg(long = "exec-timeout-ms", default_value_t = DEFAULT_EXEC_TIMEOUT_MS)]
    pub exec_timeout_ms: u64,

    /// Directory name of the worker package
    #[arg(long = "package-name", default_value = "skillbridge-worker")]
    pub package_name: String,

    /// Interpreter used when the worker package ships none
    #[arg(long = "fallback-interpreter")]
    pub fallback_interpreter: Option<String>,

    /// Run the command server only; never launch a worker
    #[arg(long = "no-worker", default_value_t = false)]
    pub no_worker: bool,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "SKILLBRIDGE_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "SKILLBRIDGE_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging command payload snippets (debug log only)
    #[arg(
        long = "log-content",
        env = "SKILLBRIDGE_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,
}

impl HostConfig {
    pub fn log_settings(&self) -> LogSettings {
        let enabled = self.logs && !self.no_logs;
        LogSettings {
            enabled,
            content: enabled && self.log_content,
        }
    }

    /// Resolved project root. Falls back to the working directory before `validate()`.
    pub fn project_root(&self) -> PathBuf {
        self.project_root
            .clone()
            .unwrap_or_else(defaults::default_project_root)
    }
}

/// Files the bridge keeps under a project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgePaths {
    pub project_root: PathBuf,
    pub config_path: PathBuf,
    pub history_path: PathBuf,
}

impl BridgePaths {
    pub fn for_project(project_root: &Path) -> Self {
        let state_dir = project_root.join(STATE_DIR_NAME);
        Self {
            project_root: project_root.to_path_buf(),
            config_path: state_dir.join(CONFIG_FILE_NAME),
            history_path: state_dir.join(HISTORY_FILE_NAME),
        }
    }
}
