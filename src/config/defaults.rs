use std::path::PathBuf;

pub const DEFAULT_WORKER_PORT: u16 = 5000;
pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_MODEL: &str = "deepseek-coder";

/// Per-project directory holding the persisted record and the chat history.
pub const STATE_DIR_NAME: &str = ".skillbridge";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const HISTORY_FILE_NAME: &str = "history.json";

pub const DEFAULT_TICK_MS: u64 = 16;
pub const MIN_TICK_MS: u64 = 1;
pub const MAX_TICK_MS: u64 = 1000;
pub const DEFAULT_EXEC_TIMEOUT_MS: u64 = 60_000;
pub const MAX_EXEC_TIMEOUT_MS: u64 = 10 * 60_000;
pub const MAX_EXEC_ARGS: usize = 32;

pub(super) fn default_exec_cmd() -> String {
    if cfg!(windows) { "python" } else { "python3" }.to_string()
}

/// Project root used when none is given: the working directory, else the home dir.
pub(super) fn default_project_root() -> PathBuf {
    std::env::current_dir()
        .ok()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}
