use super::listener::{self, ListenerContext};
use super::protocol::{DEFAULT_COMMAND_PORT, SHUTDOWN_SENTINEL};
use crate::dispatch::{BridgeQueues, StatusLog};
use crate::{lock_or_recover, log_debug};
use std::{
    io::Write,
    net::{Ipv4Addr, Shutdown, SocketAddr, TcpStream},
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// Lifecycle of the loopback listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl ServerState {
    fn as_u8(self) -> u8 {
        match self {
            ServerState::Stopped => 0,
            ServerState::Starting => 1,
            ServerState::Running => 2,
            ServerState::Stopping => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ServerState::Starting,
            2 => ServerState::Running,
            3 => ServerState::Stopping,
            _ => ServerState::Stopped,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ServerState::Stopped => "stopped",
            ServerState::Starting => "starting",
            ServerState::Running => "running",
            ServerState::Stopping => "stopping",
        }
    }
}

/// Timing and port settings for [`CommandServer`].
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub port: u16,
    /// Total bind attempts before giving up.
    pub bind_attempts: u32,
    pub bind_backoff: Duration,
    /// Sleep between non-blocking accept polls.
    pub accept_poll: Duration,
    /// Upper bound on waiting for a connected worker to send its payload.
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Quiet period that ends a payload split across segments. Zero reads once.
    pub coalesce_window: Duration,
    pub join_timeout: Duration,
    pub stale_connect_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_COMMAND_PORT,
            bind_attempts: 3,
            bind_backoff: Duration::from_millis(500),
            accept_poll: Duration::from_millis(25),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(5),
            coalesce_window: Duration::from_millis(25),
            join_timeout: Duration::from_millis(200),
            stale_connect_timeout: Duration::from_millis(200),
        }
    }
}

impl ServerOptions {
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }
}

/// State shared between one listener thread and its owning server.
///
/// A fresh lifetime is created per `start()`, so a listener thread that outlives
/// a bounded join can never observe the state of its successor.
pub(super) struct Lifetime {
    state: AtomicU8,
    connection: Mutex<Option<TcpStream>>,
}

impl Lifetime {
    fn new(state: ServerState) -> Self {
        Self {
            state: AtomicU8::new(state.as_u8()),
            connection: Mutex::new(None),
        }
    }

    pub(super) fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(super) fn set_state(&self, state: ServerState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Move from `from` to `to`; fails if another party changed the state first.
    pub(super) fn transition(&self, from: ServerState, to: ServerState) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(super) fn track_connection(&self, stream: TcpStream) {
        *lock_or_recover(&self.connection, "listener connection") = Some(stream);
    }

    pub(super) fn forget_connection(&self) {
        lock_or_recover(&self.connection, "listener connection").take();
    }

    /// Shut down the live connection so a blocked read returns.
    fn close_connection(&self) -> bool {
        match lock_or_recover(&self.connection, "listener connection").take() {
            Some(stream) => {
                let _ = stream.shutdown(Shutdown::Both);
                true
            }
            None => false,
        }
    }
}

/// Loopback listener that accepts worker connections on a dedicated thread.
pub struct CommandServer {
    options: ServerOptions,
    queues: BridgeQueues,
    status: StatusLog,
    lifetime: Arc<Lifetime>,
    thread: Option<JoinHandle<()>>,
}

impl CommandServer {
    pub fn new(options: ServerOptions, queues: BridgeQueues) -> Self {
        let status = queues.status();
        Self {
            options,
            queues,
            status,
            lifetime: Arc::new(Lifetime::new(ServerState::Stopped)),
            thread: None,
        }
    }

    pub fn port(&self) -> u16 {
        self.options.port
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    pub fn state(&self) -> ServerState {
        self.lifetime.state()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state(), ServerState::Starting | ServerState::Running)
    }

    /// Spawn the listener thread. Binding (with retries) happens on that thread, so
    /// this returns immediately in `Starting`; a terminal bind failure is reported
    /// through the status log and leaves the server `Stopped`.
    ///
    /// Returns false only when the thread could not be spawned.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            log_debug("command server already running; start ignored");
            return true;
        }
        self.reap_finished_thread();

        let lifetime = Arc::new(Lifetime::new(ServerState::Starting));
        self.lifetime = Arc::clone(&lifetime);
        let context = ListenerContext {
            options: self.options.clone(),
            lifetime: Arc::clone(&lifetime),
            commands: self.queues.commands.clone(),
            status: self.status.clone(),
        };
        let spawned = thread::Builder::new()
            .name(format!("skillbridge-listener-{}", self.options.port))
            .spawn(move || listener::run(context));
        match spawned {
            Ok(handle) => {
                self.thread = Some(handle);
                true
            }
            Err(err) => {
                lifetime.set_state(ServerState::Stopped);
                self.status
                    .push(format!("[Error] Failed to spawn listener thread: {err}"));
                false
            }
        }
    }

    /// Stop accepting, close the live connection, drop queued work, and join the
    /// listener thread with a bounded wait.
    ///
    /// Returns false (and does nothing) when there was nothing to stop.
    pub fn stop(&mut self) -> bool {
        if self.thread.is_none() && self.state() == ServerState::Stopped {
            return false;
        }

        self.lifetime.set_state(ServerState::Stopping);
        if self.lifetime.close_connection() {
            log_debug("command server: closed live connection");
        }
        let (logs, commands) = self.queues.clear();
        if logs > 0 || commands > 0 {
            log_debug(&format!(
                "command server: discarded {logs} log lines and {commands} pending commands"
            ));
        }

        if let Some(handle) = self.thread.take() {
            if !join_with_timeout(handle, self.options.join_timeout) {
                log_debug(&format!(
                    "command server: listener thread still running after {}ms; detaching",
                    self.options.join_timeout.as_millis()
                ));
            }
        }
        self.lifetime.set_state(ServerState::Stopped);
        tracing::info!(port = self.options.port, "command server stopped");
        true
    }

    /// Ask whatever listener currently holds our port to shut down.
    pub fn signal_stale_listener(&self) -> bool {
        signal_listener(self.options.port, self.options.stale_connect_timeout)
    }

    /// Poll until the server reaches `target` or `timeout` elapses.
    pub fn wait_for_state(&self, target: ServerState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.state() == target {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn reap_finished_thread(&mut self) {
        if let Some(handle) = self.thread.take() {
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                // The lifetime is already stopped; the thread exits on its next poll.
                log_debug("command server: previous listener thread still winding down");
            }
        }
    }
}

impl Drop for CommandServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Connect to `port` and send the shutdown sentinel. Any failure means nobody is listening.
pub fn signal_listener(port: u16, timeout: Duration) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let Ok(mut stream) = TcpStream::connect_timeout(&addr, timeout) else {
        return false;
    };
    let _ = stream.set_write_timeout(Some(timeout));
    if stream.write_all(SHUTDOWN_SENTINEL.as_bytes()).is_err() {
        return false;
    }
    let _ = stream.shutdown(Shutdown::Write);
    log_debug(&format!("sent listener shutdown sentinel to port {port}"));
    true
}

fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
    let _ = handle.join();
    true
}
