//! Main-thread command execution.
//!
//! The bridge hands each dequeued payload to a [`CommandExecutor`] on the tick
//! thread. Executors report failures as [`ExecutionError`], whose category
//! name is what the status log shows.

mod process;
#[cfg(test)]
mod tests;

use crate::ipc::CommandResponse;
use serde_json::Value;
use std::{fmt, io, time::Duration};

pub use process::ProcessExecutor;

/// Successful result of running one command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    /// Plain text shown to the user by the worker.
    Message(String),
    /// Structured result forwarded verbatim under `data`.
    Data(Value),
}

impl CommandOutput {
    pub fn into_response(self) -> CommandResponse {
        match self {
            CommandOutput::Message(message) => CommandResponse::message(message),
            CommandOutput::Data(data) => CommandResponse::data(data),
        }
    }
}

/// Why a command failed to run.
#[derive(Debug)]
pub enum ExecutionError {
    Spawn { program: String, source: io::Error },
    Io(io::Error),
    ExitStatus { code: Option<i32>, stderr: String },
    Timeout(Duration),
    InvalidOutput(String),
    Rejected(String),
    Panicked(String),
}

impl ExecutionError {
    /// Short, stable name for the failure class.
    pub fn category(&self) -> &'static str {
        match self {
            ExecutionError::Spawn { .. } => "spawn",
            ExecutionError::Io(_) => "io",
            ExecutionError::ExitStatus { .. } => "exit-status",
            ExecutionError::Timeout(_) => "timeout",
            ExecutionError::InvalidOutput(_) => "invalid-output",
            ExecutionError::Rejected(_) => "rejected",
            ExecutionError::Panicked(_) => "panic",
        }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::Spawn { program, source } => {
                write!(f, "failed to start {program}: {source}")
            }
            ExecutionError::Io(err) => write!(f, "I/O error: {err}"),
            ExecutionError::ExitStatus { code, stderr } => {
                match code {
                    Some(code) => write!(f, "exited with code {code}")?,
                    None => write!(f, "terminated by signal")?,
                }
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
            ExecutionError::Timeout(limit) => {
                write!(f, "timed out after {}ms", limit.as_millis())
            }
            ExecutionError::InvalidOutput(msg) => write!(f, "invalid output: {msg}"),
            ExecutionError::Rejected(msg) => write!(f, "rejected: {msg}"),
            ExecutionError::Panicked(msg) => write!(f, "executor panicked: {msg}"),
        }
    }
}

impl std::error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecutionError::Spawn { source, .. } => Some(source),
            ExecutionError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ExecutionError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Runs command payloads on the host's main thread.
pub trait CommandExecutor {
    fn execute(&mut self, command: &str) -> Result<CommandOutput, ExecutionError>;
}

impl<F> CommandExecutor for F
where
    F: FnMut(&str) -> Result<CommandOutput, ExecutionError>,
{
    fn execute(&mut self, command: &str) -> Result<CommandOutput, ExecutionError> {
        self(command)
    }
}
