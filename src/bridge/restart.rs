use super::Bridge;
use crate::executor::CommandExecutor;
use crate::log_debug;

impl<E: CommandExecutor> Bridge<E> {
    /// Tear down and/or bring up the worker and command server.
    ///
    /// `(true, true)` is a full restart, `(true, false)` is host shutdown or
    /// reload, and `(false, true)` starts without evicting anything.
    pub fn restart(&mut self, kill_and_restart: bool, start_new: bool) {
        tracing::info!(kill_and_restart, start_new, "bridge restart");
        if kill_and_restart {
            self.stop_services();
        }
        if start_new {
            self.shut_down = false;
            self.start_services();
        }
    }

    fn stop_services(&mut self) {
        self.status.push("[System] Stopping services...");
        self.supervisor.stop(self.config.port);

        // Stopping the server discards the log queue; hand pending lines out first.
        self.flush_logs();
        if !self.server.stop() {
            log_debug("bridge: command server was not running");
        }
        if self.server.signal_stale_listener() {
            log_debug("bridge: evicted a listener left over from an earlier host");
        }
        self.status.push("[System] Services stopped");
    }

    fn start_services(&mut self) {
        self.reload_config();
        let worker_port = self.config.port;
        self.status.push(format!(
            "[System] Starting services (Port {worker_port} <-> {})...",
            self.server.port()
        ));

        if !self.server.start() {
            return;
        }
        if !self.options.launch_worker {
            log_debug("bridge: worker launch disabled");
            return;
        }
        let history = self.options.paths.history_path.clone();
        let show_console = self.config.show_console;
        self.supervisor.start(worker_port, &history, show_console);
    }
}
