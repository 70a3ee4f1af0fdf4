//! Wire format for the loopback command channel.
//!
//! The worker opens a connection, writes one UTF-8 command payload, and waits.
//! The host answers on the same connection with a single JSON object and then
//! closes its write side. There is no length prefix.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed loopback port the worker connects back to.
pub const DEFAULT_COMMAND_PORT: u16 = 8081;

/// Upper bound for a single command payload.
pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// In-band payload asking a listener to vacate the port.
pub const SHUTDOWN_SENTINEL: &str = "@@INTERNAL_STOP@@";

/// Outcome tag of a [`CommandResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// JSON object written back to the worker after a command runs.
///
/// Serializes as `{"status":"ok","message":...}`, `{"status":"ok","data":...}`
/// or `{"status":"error","message":...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandResponse {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn data(data: Value) -> Self {
        Self {
            status: ResponseStatus::Ok,
            message: None,
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: Some(message.into()),
            data: None,
        }
    }

    /// Wrap an already-encoded JSON document as a data response.
    pub fn from_raw_data(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw).map(Self::data)
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }

    pub fn to_json(&self) -> String {
        // A struct of strings and `Value`s always serializes.
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"status":"error","message":"response encoding failed"}"#.to_string()
        })
    }
}

/// What a payload read off the socket means to the accept loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Peer closed without sending anything.
    Empty,
    /// Reserved request to stop listening.
    Shutdown,
    /// A command to queue for the main thread.
    Command(String),
    /// Bytes that do not decode as UTF-8; answered with an error, never run.
    NotUtf8,
}

impl Frame {
    pub fn classify(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Frame::Empty;
        }
        if bytes == SHUTDOWN_SENTINEL.as_bytes() {
            return Frame::Shutdown;
        }
        match std::str::from_utf8(bytes) {
            Ok(text) => Frame::Command(text.to_string()),
            Err(_) => Frame::NotUtf8,
        }
    }
}
