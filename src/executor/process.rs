use super::{CommandExecutor, CommandOutput, ExecutionError};
use crate::log_debug;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::{
    io::{self, Read, Write},
    path::PathBuf,
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

const KILL_GRACE: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long output pipes may stay open after the child has been reaped.
/// Anything still holding them (a background grandchild) is abandoned.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(100);
const COLLECT_CHUNK: usize = 8 * 1024;

/// Executor that pipes each payload into an interpreter's stdin.
///
/// Stdout becomes the response: valid JSON is returned as `data`, any other
/// text as `message`, and empty output as `"Done."`.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl ProcessExecutor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl CommandExecutor for ProcessExecutor {
    fn execute(&mut self, command: &str) -> Result<CommandOutput, ExecutionError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| ExecutionError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        // Feed stdin off-thread so a chatty child cannot deadlock us on a full pipe.
        let writer = child.stdin.take().map(|mut stdin| {
            let payload = command.to_string();
            thread::spawn(move || write_payload_with_newline(&mut stdin, &payload))
        });
        let stdout = child.stdout.take().map(spawn_collector);
        let stderr = child.stderr.take().map(spawn_collector);

        let status = wait_with_timeout(&mut child, self.timeout);
        let drain_deadline = Instant::now() + OUTPUT_DRAIN_GRACE;
        let stdout = collect_until(stdout, drain_deadline, "stdout");
        let stderr = collect_until(stderr, drain_deadline, "stderr");
        if let Some(writer) = writer {
            if writer.is_finished() {
                if let Ok(Err(err)) = writer.join() {
                    // A child that exits without reading its input is not an error by itself.
                    log_debug(&format!("executor: stdin write failed: {err}"));
                }
            } else {
                log_debug("executor: stdin still held open after exit; detaching writer");
            }
        }

        let status = status?;
        if !status.success() {
            return Err(ExecutionError::ExitStatus {
                code: status.code(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        parse_stdout(&stdout)
    }
}

pub(super) fn write_payload_with_newline<W: Write>(writer: &mut W, payload: &str) -> io::Result<()> {
    writer.write_all(payload.as_bytes())?;
    if !payload.ends_with('\n') {
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

/// Forward pipe output in chunks so the caller can stop waiting at a deadline
/// even while another process keeps the pipe open.
fn spawn_collector<R: Read + Send + 'static>(mut reader: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::spawn(move || {
        let mut buf = vec![0u8; COLLECT_CHUNK];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    });
    rx
}

pub(super) fn collect_until(
    chunks: Option<Receiver<Vec<u8>>>,
    deadline: Instant,
    label: &str,
) -> Vec<u8> {
    let mut out = Vec::new();
    let Some(chunks) = chunks else {
        return out;
    };
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match chunks.recv_timeout(remaining) {
            Ok(chunk) => out.extend_from_slice(&chunk),
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                // Keep whatever is already buffered before giving up on the pipe.
                out.extend(chunks.try_iter().flatten());
                log_debug(&format!(
                    "executor: {label} still open after exit; detaching collector"
                ));
                break;
            }
        }
    }
    out
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<ExitStatus, ExecutionError> {
    let deadline = Instant::now() + timeout;
    let mut term_sent_at: Option<Instant> = None;
    loop {
        if let Some(status) = child.try_wait()? {
            return match term_sent_at {
                Some(_) => Err(ExecutionError::Timeout(timeout)),
                None => Ok(status),
            };
        }

        let now = Instant::now();
        match term_sent_at {
            None if now >= deadline => {
                log_debug(&format!(
                    "executor: pid {} exceeded {}ms; terminating",
                    child.id(),
                    timeout.as_millis()
                ));
                terminate(child);
                term_sent_at = Some(now);
            }
            Some(sent) if should_kill(sent, now) => {
                log_debug("executor: escalating to kill");
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExecutionError::Timeout(timeout));
            }
            _ => {}
        }
        thread::sleep(POLL_INTERVAL);
    }
}

pub(super) fn should_kill(term_sent_at: Instant, now: Instant) -> bool {
    now.duration_since(term_sent_at) >= KILL_GRACE
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    // SAFETY: the pid belongs to a child we have not reaped yet.
    let rc = unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        log_debug(&format!(
            "executor: SIGTERM to pid {} failed: {}",
            child.id(),
            io::Error::last_os_error()
        ));
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.kill();
}

pub(super) fn parse_stdout(bytes: &[u8]) -> Result<CommandOutput, ExecutionError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|err| ExecutionError::InvalidOutput(format!("stdout is not UTF-8: {err}")))?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(CommandOutput::Message("Done.".to_string()));
    }
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str(trimmed) {
            return Ok(CommandOutput::Data(value));
        }
    }
    Ok(CommandOutput::Message(trimmed.to_string()))
}
