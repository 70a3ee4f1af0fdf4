//! Lifecycle of the external worker process.
//!
//! The supervisor owns at most one child at a time. Stopping is graceful first
//! (an HTTP shutdown request, which also reaches a worker whose handle was lost
//! across a host reload) and forceful second (kill and reap the local child).

mod launch;
mod locate;
mod shutdown;
#[cfg(test)]
mod tests;

use crate::dispatch::StatusLog;
use crate::ipc::DEFAULT_COMMAND_PORT;
use crate::log_debug;
use std::{
    fs,
    path::{Path, PathBuf},
    process::{Child, ExitStatus},
    thread,
    time::{Duration, Instant},
};

pub use locate::{locate_worker, InstallOrigin, WorkerInstall, WorkerLayout};

/// Settings for [`WorkerSupervisor`].
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub project_root: PathBuf,
    pub layout: WorkerLayout,
    /// Loopback port handed to the worker so it can connect back.
    pub command_port: u16,
    pub shutdown_timeout: Duration,
    /// How long a worker gets to exit on its own after the shutdown request.
    pub exit_grace: Duration,
}

impl SupervisorOptions {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            layout: WorkerLayout::default(),
            command_port: DEFAULT_COMMAND_PORT,
            shutdown_timeout: Duration::from_millis(500),
            exit_grace: Duration::from_millis(300),
        }
    }
}

pub struct WorkerSupervisor {
    options: SupervisorOptions,
    status: StatusLog,
    child: Option<Child>,
    launched_port: Option<u16>,
}

impl WorkerSupervisor {
    pub fn new(options: SupervisorOptions, status: StatusLog) -> Self {
        Self {
            options,
            status,
            child: None,
            launched_port: None,
        }
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    pub fn locate_worker(&self) -> Option<WorkerInstall> {
        locate_worker(&self.options.project_root, &self.options.layout)
    }

    /// Launch the worker. Any previous child is terminated first.
    ///
    /// Returns false (with an error on the status log) when no process was started.
    pub fn start(&mut self, worker_port: u16, history_path: &Path, show_console: bool) -> bool {
        if self.child.is_some() {
            log_debug("supervisor: replacing existing worker handle");
            self.kill_local();
        }

        let layout = &self.options.layout;
        let Some(install) = locate::find_install(&self.options.project_root, layout) else {
            self.status.push(format!(
                "[Error] Cannot find worker package '{}'",
                layout.package_name
            ));
            return false;
        };
        let script = install.script(layout);
        if !script.is_file() {
            self.status.push(format!(
                "[Error] Worker script not found at: {}",
                script.display()
            ));
            return false;
        }

        let history_path = self.absolute_history_path(history_path);
        if let Some(parent) = history_path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                log_debug(&format!(
                    "supervisor: cannot create history dir {}: {err}",
                    parent.display()
                ));
            }
        }

        let plan = launch::plan_launch(
            &install,
            layout,
            worker_port,
            self.options.command_port,
            &history_path,
        );
        if !plan.bundled {
            self.status.push(format!(
                "[Warn] Bundled interpreter not found. Trying system '{}'...",
                layout.fallback_interpreter
            ));
        }
        self.status.push(format!(
            "[System] Launching worker: {} (Console: {show_console})",
            plan.interpreter.display()
        ));

        match launch::spawn_worker(&plan, show_console) {
            Ok(child) => {
                tracing::info!(
                    pid = child.id(),
                    worker_port,
                    command_port = self.options.command_port,
                    "worker launched"
                );
                log_debug(&format!(
                    "supervisor: worker pid {} from {:?} install",
                    child.id(),
                    install.origin
                ));
                self.child = Some(child);
                self.launched_port = Some(worker_port);
                true
            }
            Err(err) => {
                tracing::error!(error = %err, "worker launch failed");
                self.status
                    .push(format!("[Error] Start worker failed: {err}"));
                false
            }
        }
    }

    /// Ask the worker to exit over HTTP, give it a short grace period, then kill the
    /// local child if it is still alive. Safe to call with no worker running.
    pub fn stop(&mut self, worker_port: u16) {
        let mut ports = vec![worker_port];
        if let Some(launched) = self.launched_port.take() {
            if launched != worker_port {
                ports.push(launched);
            }
        }
        let mut acknowledged = false;
        for port in ports {
            match shutdown::request_worker_shutdown(port, self.options.shutdown_timeout) {
                Ok(code) => {
                    log_debug(&format!("supervisor: shutdown on port {port} answered {code}"));
                    acknowledged = true;
                }
                Err(err) => log_debug(&format!("supervisor: shutdown request skipped: {err:#}")),
            }
        }

        if self.child.is_none() {
            return;
        }
        if self.wait_for_exit(self.options.exit_grace) {
            log_debug(&format!(
                "supervisor: worker exited on its own (shutdown acknowledged: {acknowledged})"
            ));
            return;
        }
        self.kill_local();
    }

    /// True while a launched worker has not exited.
    pub fn has_live_worker(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    pub fn worker_pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Reap a worker that exited on its own and release its handle.
    pub fn poll_exit(&mut self) -> Option<ExitStatus> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                self.child = None;
                self.launched_port = None;
                self.status
                    .push(format!("[Warn] Worker exited unexpectedly ({status})"));
                tracing::warn!(%status, "worker exited");
                Some(status)
            }
            Ok(None) => None,
            Err(err) => {
                log_debug(&format!("supervisor: try_wait failed: {err}"));
                None
            }
        }
    }

    fn wait_for_exit(&mut self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        loop {
            let Some(child) = self.child.as_mut() else {
                return true;
            };
            if let Ok(Some(_)) = child.try_wait() {
                self.child = None;
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn kill_local(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        let pid = child.id();
        match child.try_wait() {
            Ok(Some(status)) => {
                log_debug(&format!("supervisor: worker {pid} already exited ({status})"));
            }
            _ => {
                if let Err(err) = child.kill() {
                    log_debug(&format!("supervisor: kill {pid} failed: {err}"));
                }
                let _ = child.wait();
                log_debug(&format!("supervisor: worker {pid} killed"));
            }
        }
    }

    fn absolute_history_path(&self, history_path: &Path) -> PathBuf {
        if history_path.is_absolute() {
            history_path.to_path_buf()
        } else {
            self.options.project_root.join(history_path)
        }
    }
}

impl Drop for WorkerSupervisor {
    fn drop(&mut self) {
        self.kill_local();
    }
}
