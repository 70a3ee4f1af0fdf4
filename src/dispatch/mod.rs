//! Queues that carry work from background threads to the host's main-thread tick.
//!
//! The listener thread and the supervisor only ever push. The tick drains the
//! log queue completely and takes at most one command per call, so host APIs
//! are never touched off the main thread.

mod observers;
mod queue;

use crate::ipc::ReplyStream;
use crate::log_debug;
use std::time::Instant;

pub use observers::{ObserverId, ObserverRegistry, StatusObserver};
pub use queue::DispatchQueue;

/// A command payload waiting for the main thread, plus the connection to answer on.
#[derive(Debug)]
pub struct PendingCommand {
    pub payload: String,
    pub reply: Option<ReplyStream>,
    pub received_at: Instant,
}

impl PendingCommand {
    pub fn new(payload: String, reply: Option<ReplyStream>) -> Self {
        Self {
            payload,
            reply,
            received_at: Instant::now(),
        }
    }
}

/// Producer handle for human-readable status lines.
#[derive(Clone, Default)]
pub struct StatusLog {
    queue: DispatchQueue<String>,
}

impl StatusLog {
    pub fn push(&self, line: impl Into<String>) {
        let line = line.into();
        log_debug(&line);
        self.queue.push(line);
    }
}

/// The log and command queues, shared by the server thread and the tick.
#[derive(Clone, Default)]
pub struct BridgeQueues {
    pub logs: DispatchQueue<String>,
    pub commands: DispatchQueue<PendingCommand>,
}

impl BridgeQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> StatusLog {
        StatusLog {
            queue: self.logs.clone(),
        }
    }

    /// Drop all queued log lines and commands. Returns `(logs, commands)` discarded.
    pub fn clear(&self) -> (usize, usize) {
        (self.logs.clear(), self.commands.clear())
    }
}
