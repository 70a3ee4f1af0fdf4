use super::Bridge;
use crate::app::panic_payload_text;
use crate::dispatch::PendingCommand;
use crate::executor::{CommandExecutor, ExecutionError};
use crate::ipc::{CommandResponse, ResponseStatus};
use crate::{log_debug, log_debug_content};
use std::{
    panic::{self, AssertUnwindSafe},
    time::{Duration, Instant},
};

/// What one `tick()` did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub logs_delivered: usize,
    pub execution: Option<ExecutionReport>,
}

/// Outcome of the command executed during a tick.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub status: ResponseStatus,
    /// Failure class name when the command failed.
    pub error_category: Option<&'static str>,
    pub elapsed: Duration,
    /// Time the command waited in the queue before running.
    pub queued_for: Duration,
    /// Bytes written back, or `None` when the reply could not be sent.
    pub bytes_sent: Option<usize>,
}

impl<E: CommandExecutor> Bridge<E> {
    /// One pass of the main loop: reap a dead worker, run at most one queued
    /// command, and deliver every queued status line in order.
    pub fn tick(&mut self) -> TickReport {
        self.supervisor.poll_exit();
        let execution = self
            .queues
            .commands
            .try_pop()
            .map(|command| self.run_command(command));
        let logs_delivered = self.flush_logs();
        TickReport {
            logs_delivered,
            execution,
        }
    }

    fn run_command(&mut self, command: PendingCommand) -> ExecutionReport {
        let PendingCommand {
            payload,
            reply,
            received_at,
        } = command;
        let queued_for = received_at.elapsed();

        self.status.push("[Run] Executing command...");
        log_debug_content(&format!("bridge: executing {} bytes: {payload}", payload.len()));

        let started = Instant::now();
        let executor = &mut self.executor;
        let result = panic::catch_unwind(AssertUnwindSafe(|| executor.execute(&payload)))
            .unwrap_or_else(|panic| Err(ExecutionError::Panicked(panic_payload_text(&*panic))));
        let elapsed = started.elapsed();

        let (response, error_category) = match result {
            Ok(output) => {
                self.status.push(format!(
                    "[OK] Execution finished ({}ms)",
                    elapsed.as_millis()
                ));
                (output.into_response(), None)
            }
            Err(err) => {
                let category = err.category();
                self.status
                    .push(format!("[Error] Execution failed: {category}"));
                tracing::warn!(category, error = %err, "command failed");
                (
                    CommandResponse::error(format!("Execution error: {err}")),
                    Some(category),
                )
            }
        };

        let bytes_sent = match reply {
            Some(reply) => {
                self.status.push(format!(
                    "[Out] Sending response ({} bytes)...",
                    response.to_json().len()
                ));
                match reply.send(&response) {
                    Ok(bytes) => {
                        self.status.push("[Done] Interaction complete");
                        Some(bytes)
                    }
                    Err(err) => {
                        self.status.push(format!("[Error] Send failed: {err}"));
                        None
                    }
                }
            }
            None => {
                log_debug("bridge: command had no reply stream; response dropped");
                None
            }
        };

        tracing::info!(
            elapsed_ms = elapsed.as_millis() as u64,
            queued_ms = queued_for.as_millis() as u64,
            ok = error_category.is_none(),
            "command executed"
        );
        ExecutionReport {
            status: response.status,
            error_category,
            elapsed,
            queued_for,
            bytes_sent,
        }
    }
}
