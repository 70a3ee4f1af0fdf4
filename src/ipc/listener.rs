use super::protocol::{CommandResponse, Frame, MAX_PAYLOAD_BYTES};
use super::reply::ReplyStream;
use super::server::{signal_listener, Lifetime, ServerOptions, ServerState};
use crate::dispatch::{DispatchQueue, PendingCommand, StatusLog};
use crate::{log_debug, log_debug_content};
use std::{
    io::{self, ErrorKind, Read},
    net::{Ipv4Addr, TcpListener, TcpStream},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

pub(super) struct ListenerContext {
    pub(super) options: ServerOptions,
    pub(super) lifetime: Arc<Lifetime>,
    pub(super) commands: DispatchQueue<PendingCommand>,
    pub(super) status: StatusLog,
}

/// Quiet period that decides whether a full buffer was the whole frame.
const OVERFLOW_WAIT: Duration = Duration::from_millis(25);
/// Upper bound on bytes discarded from an oversized frame before replying.
const DISCARD_LIMIT: usize = 8 * MAX_PAYLOAD_BYTES;

enum ConnectionOutcome {
    Empty,
    Queued,
    Rejected,
    Shutdown,
}

/// Result of reading one frame off a connection.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum FrameRead {
    /// The peer finished (or went quiet) within the buffer; holds the length.
    Complete(usize),
    /// The peer kept sending after the buffer filled.
    Oversized,
}

/// Listener thread body: bind (with retries), then accept until stopped.
pub(super) fn run(ctx: ListenerContext) {
    let port = ctx.options.port;
    let Some(listener) = bind_with_retry(&ctx) else {
        ctx.lifetime
            .transition(ServerState::Starting, ServerState::Stopped);
        return;
    };
    if !ctx
        .lifetime
        .transition(ServerState::Starting, ServerState::Running)
    {
        log_debug("command server: stopped before the accept loop began");
        return;
    }

    ctx.status
        .push(format!("[System] Command server started (port {port})"));
    tracing::info!(port, "command server listening");
    accept_loop(&ctx, &listener);
    drop(listener);
    log_debug(&format!("command server: listener on port {port} released"));
}

fn bind_with_retry(ctx: &ListenerContext) -> Option<TcpListener> {
    let port = ctx.options.port;
    let attempts = ctx.options.bind_attempts.max(1);
    for attempt in 1..=attempts {
        if ctx.lifetime.state() != ServerState::Starting {
            return None;
        }
        match bind_listener(port) {
            Ok(listener) => return Some(listener),
            Err(err) => {
                log_debug(&format!("command server: bind attempt {attempt} failed: {err}"));
                ctx.status.push(format!(
                    "[Warn] Port {port} busy, retrying ({attempt}/{attempts})..."
                ));
                signal_listener(port, ctx.options.stale_connect_timeout);
                if !sleep_while_starting(&ctx.lifetime, ctx.options.bind_backoff) {
                    return None;
                }
            }
        }
    }

    ctx.status.push(format!(
        "[Error] Startup failed: port {port} cannot be bound."
    ));
    tracing::error!(port, attempts, "command server failed to bind");
    None
}

/// Std listeners set SO_REUSEADDR on Unix, so a port in TIME_WAIT rebinds at once.
fn bind_listener(port: u16) -> io::Result<TcpListener> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

fn sleep_while_starting(lifetime: &Lifetime, total: Duration) -> bool {
    let deadline = Instant::now() + total;
    while Instant::now() < deadline {
        if lifetime.state() != ServerState::Starting {
            return false;
        }
        thread::sleep(Duration::from_millis(10).min(total));
    }
    lifetime.state() == ServerState::Starting
}

fn accept_loop(ctx: &ListenerContext, listener: &TcpListener) {
    let mut buffer = vec![0u8; MAX_PAYLOAD_BYTES];
    while ctx.lifetime.state() == ServerState::Running {
        match listener.accept() {
            Ok((stream, peer)) => match serve_connection(ctx, stream, &mut buffer) {
                Ok(ConnectionOutcome::Shutdown) => {
                    ctx.lifetime
                        .transition(ServerState::Running, ServerState::Stopped);
                    ctx.status
                        .push("[System] Listener stop requested; releasing port");
                    break;
                }
                Ok(ConnectionOutcome::Empty)
                | Ok(ConnectionOutcome::Queued)
                | Ok(ConnectionOutcome::Rejected) => {}
                Err(err) => {
                    ctx.lifetime.forget_connection();
                    log_debug(&format!("command server: connection from {peer} dropped: {err}"));
                }
            },
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                thread::sleep(ctx.options.accept_poll);
            }
            Err(err) => {
                log_debug(&format!("command server: accept failed: {err}"));
                thread::sleep(ctx.options.accept_poll);
            }
        }
    }
}

fn serve_connection(
    ctx: &ListenerContext,
    stream: TcpStream,
    buffer: &mut [u8],
) -> io::Result<ConnectionOutcome> {
    // BSD-derived platforms hand out accepted sockets in the listener's mode.
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(ctx.options.read_timeout))?;
    stream.set_write_timeout(Some(ctx.options.write_timeout))?;
    ctx.lifetime.track_connection(stream.try_clone()?);

    let len = match read_frame(&stream, buffer, ctx.options.coalesce_window)? {
        FrameRead::Complete(len) => len,
        FrameRead::Oversized => {
            discard_remaining(&stream, ctx.options.coalesce_window.max(OVERFLOW_WAIT));
            let reason = format!("payload exceeds {} MiB", MAX_PAYLOAD_BYTES / (1024 * 1024));
            return reject(ctx, stream, &reason);
        }
    };
    match Frame::classify(&buffer[..len]) {
        Frame::Empty => {
            ctx.lifetime.forget_connection();
            Ok(ConnectionOutcome::Empty)
        }
        Frame::Shutdown => {
            ctx.lifetime.forget_connection();
            Ok(ConnectionOutcome::Shutdown)
        }
        Frame::Command(payload) => {
            ctx.status
                .push(format!("[In] Received command ({len} bytes)"));
            log_debug_content(&format!("command payload: {}", preview(&payload)));
            ctx.commands
                .push(PendingCommand::new(payload, Some(ReplyStream::new(stream))));
            Ok(ConnectionOutcome::Queued)
        }
        Frame::NotUtf8 => reject(ctx, stream, "payload is not valid UTF-8"),
    }
}

/// Answer a frame that will not be queued with an error, then drop the connection.
fn reject(
    ctx: &ListenerContext,
    stream: TcpStream,
    reason: &str,
) -> io::Result<ConnectionOutcome> {
    ctx.lifetime.forget_connection();
    ctx.status.push(format!("[Warn] Rejected command: {reason}"));
    tracing::warn!(reason, "command rejected");
    ReplyStream::new(stream).send(&CommandResponse::error(reason))?;
    Ok(ConnectionOutcome::Rejected)
}

/// Read and drop what the peer is still sending so the error reply is not
/// lost to a reset on close.
fn discard_remaining(mut stream: &TcpStream, wait: Duration) {
    if stream.set_read_timeout(Some(wait)).is_err() {
        return;
    }
    let mut scratch = [0u8; 64 * 1024];
    let mut discarded = 0usize;
    while discarded < DISCARD_LIMIT {
        match stream.read(&mut scratch) {
            Ok(0) => break,
            Ok(n) => discarded += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    log_debug(&format!("command server: discarded {discarded} bytes of an oversized frame"));
}

/// Read one command frame: a first blocking read, then any trailing segments that
/// arrive within `coalesce` of each other.
///
/// A frame that fills `buffer` is only complete if the peer then closes or goes
/// quiet; anything more makes it [`FrameRead::Oversized`].
pub(super) fn read_frame(
    mut stream: &TcpStream,
    buffer: &mut [u8],
    coalesce: Duration,
) -> io::Result<FrameRead> {
    let mut filled = loop {
        match stream.read(buffer) {
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            other => break other?,
        }
    };
    if filled == 0 {
        return Ok(FrameRead::Complete(0));
    }

    if !coalesce.is_zero() {
        stream.set_read_timeout(Some(coalesce))?;
        while filled < buffer.len() {
            match stream.read(&mut buffer[filled..]) {
                Ok(0) => return Ok(FrameRead::Complete(filled)),
                Ok(n) => filled += n,
                Err(err) if is_quiet(&err) => return Ok(FrameRead::Complete(filled)),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    if filled < buffer.len() {
        return Ok(FrameRead::Complete(filled));
    }
    stream.set_read_timeout(Some(coalesce.max(OVERFLOW_WAIT)))?;
    let mut extra = [0u8; 1];
    loop {
        match stream.read(&mut extra) {
            Ok(0) => return Ok(FrameRead::Complete(filled)),
            Ok(_) => return Ok(FrameRead::Oversized),
            Err(err) if is_quiet(&err) => return Ok(FrameRead::Complete(filled)),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}

fn is_quiet(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

fn preview(payload: &str) -> String {
    const PREVIEW_CHARS: usize = 80;
    let mut out: String = payload.chars().take(PREVIEW_CHARS).collect();
    if payload.chars().count() > PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}
