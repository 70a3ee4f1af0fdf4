//! Loopback command channel between the host and its worker process.
//!
//! Architecture:
//! - Listener thread: binds `127.0.0.1:<port>` with bounded retries, then
//!   accepts one connection at a time and reads one payload per connection
//! - Command queue: payloads travel to the main thread together with the
//!   connection they arrived on, so the answer goes back on the same stream
//! - Sentinel: a connection that sends `@@INTERNAL_STOP@@` makes the listener
//!   release the port, which is how a new host evicts a stale one
//!
//! Protocol:
//! - Worker → host: raw UTF-8 command text, at most 1 MiB
//! - Host → worker: `{"status": "ok"|"error", "message": ...}` or
//!   `{"status": "ok", "data": ...}`

mod listener;
mod protocol;
mod reply;
mod server;


pub use protocol::{
    CommandResponse, Frame, ResponseStatus, DEFAULT_COMMAND_PORT, MAX_PAYLOAD_BYTES,
    SHUTDOWN_SENTINEL,
};
pub use reply::ReplyStream;
pub use server::{signal_listener, CommandServer, ServerOptions, ServerState};
