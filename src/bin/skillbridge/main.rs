//! SkillBridge host entrypoint: runs the bridge headless from a fixed-interval tick.
//!
//! # Architecture
//!
//! - Main thread: owns the bridge, ticks it, and runs every command
//! - Listener thread: accepts worker connections (inside the library)
//! - Worker process: launched and stopped by the bridge's supervisor
//!
//! SIGINT/SIGTERM end the tick loop; the stop phase then shuts the worker
//! down and releases the command port before exit.

mod signals;

use anyhow::Result;
use skillbridge::config::HostConfig;
use skillbridge::{
    init_logging, init_tracing, install_panic_hook, log_debug, log_file_path, Bridge,
    BridgeOptions, CommandExecutor, ProcessExecutor,
};
use std::io::{self, Write};
use std::thread;
use std::time::{Duration, Instant};

fn main() -> Result<()> {
    let config = HostConfig::parse_args()?;
    let log_settings = config.log_settings();
    init_logging(log_settings);
    init_tracing(log_settings);
    install_panic_hook();
    log_debug("=== SkillBridge Host Started ===");
    log_debug(&format!("Log file: {:?}", log_file_path()));

    signals::install_shutdown_handlers()?;

    let project_root = config.project_root();
    let mut options = BridgeOptions::new(&project_root).with_command_port(config.command_port);
    options.launch_worker = !config.no_worker;
    options.supervisor.layout.package_name = config.package_name.clone();
    if let Some(fallback) = &config.fallback_interpreter {
        options.supervisor.layout.fallback_interpreter = fallback.clone();
    }

    let executor = ProcessExecutor::new(&config.exec_cmd, config.exec_args.clone())
        .with_working_dir(&project_root)
        .with_timeout(Duration::from_millis(config.exec_timeout_ms));
    log_debug(&format!(
        "executor: {} {:?} (timeout {}ms)",
        executor.program(),
        config.exec_args,
        config.exec_timeout_ms
    ));

    let mut bridge = Bridge::new(options, executor);
    bridge.subscribe(print_status_line);
    bridge
        .status_log()
        .push(format!("[System] Project root: {}", project_root.display()));
    bridge.restart(true, true);

    run_tick_loop(&mut bridge, Duration::from_millis(config.tick_ms));

    bridge.shutdown();
    print_status_line("[System] SkillBridge stopped");
    log_debug("=== SkillBridge Host Exited ===");
    Ok(())
}

fn run_tick_loop<E: CommandExecutor>(bridge: &mut Bridge<E>, interval: Duration) {
    while !signals::shutdown_requested() {
        let started = Instant::now();
        let report = bridge.tick();
        if let Some(execution) = report.execution {
            log_debug(&format!(
                "tick: command {:?} in {}ms (queued {}ms)",
                execution.status,
                execution.elapsed.as_millis(),
                execution.queued_for.as_millis()
            ));
        }
        thread::sleep(interval.saturating_sub(started.elapsed()));
    }
    log_debug("shutdown signal received; leaving tick loop");
}

fn print_status_line(line: &str) {
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{line}");
    let _ = stdout.flush();
}
