//! The bridge ties the command server, worker supervisor, and dispatch queues
//! together behind two calls the host makes: `restart()` and `tick()`.
//!
//! Everything here runs on the host's main thread. The only other thread is
//! the server's listener, which talks to the bridge exclusively through
//! [`BridgeQueues`].

mod restart;
mod tick;

use crate::config::{BridgeConfig, BridgePaths, ConfigStore, LoadOutcome};
use crate::dispatch::{BridgeQueues, ObserverId, ObserverRegistry, StatusLog};
use crate::executor::CommandExecutor;
use crate::ipc::{CommandServer, ServerOptions};
use crate::log_debug;
use crate::supervisor::{SupervisorOptions, WorkerSupervisor};
use anyhow::{Context, Result};
use std::path::Path;

pub use tick::{ExecutionReport, TickReport};

/// Everything needed to build a [`Bridge`].
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    pub paths: BridgePaths,
    pub server: ServerOptions,
    pub supervisor: SupervisorOptions,
    /// When false, `restart()` only manages the command server.
    pub launch_worker: bool,
}

impl BridgeOptions {
    pub fn new(project_root: &Path) -> Self {
        Self {
            paths: BridgePaths::for_project(project_root),
            server: ServerOptions::default(),
            supervisor: SupervisorOptions::new(project_root),
            launch_worker: true,
        }
    }

    pub fn with_command_port(mut self, port: u16) -> Self {
        self.server.port = port;
        self.supervisor.command_port = port;
        self
    }
}

pub struct Bridge<E: CommandExecutor> {
    options: BridgeOptions,
    store: ConfigStore,
    config: BridgeConfig,
    queues: BridgeQueues,
    status: StatusLog,
    server: CommandServer,
    supervisor: WorkerSupervisor,
    observers: ObserverRegistry,
    executor: E,
    shut_down: bool,
}

impl<E: CommandExecutor> Bridge<E> {
    /// Build an idle bridge and load the persisted settings. Nothing is started
    /// until the first `restart(_, true)`.
    pub fn new(mut options: BridgeOptions, executor: E) -> Self {
        // The worker must be told the port we actually listen on.
        options.supervisor.command_port = options.server.port;

        let queues = BridgeQueues::new();
        let status = queues.status();
        let store = ConfigStore::new(&options.paths.config_path);
        let server = CommandServer::new(options.server.clone(), queues.clone());
        let supervisor = WorkerSupervisor::new(options.supervisor.clone(), status.clone());

        let mut bridge = Self {
            options,
            store,
            config: BridgeConfig::default(),
            queues,
            status,
            server,
            supervisor,
            observers: ObserverRegistry::new(),
            executor,
            shut_down: false,
        };
        bridge.reload_config();
        bridge
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// Settings in effect since the last load. Edits apply at the next restart.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Validate and persist new settings.
    pub fn save_config(&mut self, config: BridgeConfig) -> Result<()> {
        config.validate().context("refusing to save invalid settings")?;
        self.store.save(&config)?;
        self.config = config;
        self.status.push(format!(
            "[System] Settings saved to {}",
            self.store.path().display()
        ));
        Ok(())
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&str) + 'static) -> ObserverId {
        self.observers.subscribe(Box::new(observer))
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Producer handle for hosts that want their own lines in the status stream.
    pub fn status_log(&self) -> StatusLog {
        self.status.clone()
    }

    pub fn queues(&self) -> &BridgeQueues {
        &self.queues
    }

    pub fn server(&self) -> &CommandServer {
        &self.server
    }

    pub fn supervisor(&self) -> &WorkerSupervisor {
        &self.supervisor
    }

    pub fn supervisor_mut(&mut self) -> &mut WorkerSupervisor {
        &mut self.supervisor
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    /// Run the stop phase once. Later calls do nothing until the next start.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.restart(true, false);
        self.flush_logs();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    fn reload_config(&mut self) {
        let (config, outcome) = self.store.load();
        match outcome {
            LoadOutcome::Loaded => log_debug(&format!(
                "bridge: settings loaded from {}",
                self.store.path().display()
            )),
            LoadOutcome::Created => self.status.push(format!(
                "[System] Created default settings at {}",
                self.store.path().display()
            )),
            LoadOutcome::Fallback(reason) => {
                tracing::warn!(path = %self.store.path().display(), %reason, "settings fallback");
                self.status
                    .push(format!("[Warn] Settings unreadable, using defaults: {reason}"));
            }
        }
        self.config = config;
    }

    /// Deliver every queued status line to the observers. Returns the count delivered.
    fn flush_logs(&mut self) -> usize {
        let lines = self.queues.logs.drain();
        self.observers.deliver(&lines);
        lines.len()
    }
}

impl<E: CommandExecutor> Drop for Bridge<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
