use super::locate::{WorkerInstall, WorkerLayout};
use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
};

/// Everything needed to start one worker process.
#[derive(Debug, Clone)]
pub(super) struct LaunchPlan {
    pub(super) interpreter: PathBuf,
    pub(super) bundled: bool,
    pub(super) args: Vec<OsString>,
    pub(super) working_dir: PathBuf,
}

/// Prefer the bundled interpreter; otherwise resolve the fallback on `PATH`.
pub(super) fn resolve_interpreter(install: &WorkerInstall, layout: &WorkerLayout) -> (PathBuf, bool) {
    let bundled = install.bundled_interpreter(layout);
    if bundled.is_file() {
        return (bundled, true);
    }
    let fallback = which::which(&layout.fallback_interpreter)
        .unwrap_or_else(|_| PathBuf::from(&layout.fallback_interpreter));
    (fallback, false)
}

pub(super) fn worker_args(
    script: &Path,
    worker_port: u16,
    command_port: u16,
    history_path: &Path,
) -> Vec<OsString> {
    vec![
        script.as_os_str().to_os_string(),
        "--port".into(),
        worker_port.to_string().into(),
        "--bridge-port".into(),
        command_port.to_string().into(),
        "--history".into(),
        history_path.as_os_str().to_os_string(),
    ]
}

pub(super) fn plan_launch(
    install: &WorkerInstall,
    layout: &WorkerLayout,
    worker_port: u16,
    command_port: u16,
    history_path: &Path,
) -> LaunchPlan {
    let script = install.script(layout);
    let (interpreter, bundled) = resolve_interpreter(install, layout);
    let working_dir = script
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| install.root.clone());
    LaunchPlan {
        interpreter,
        bundled,
        args: worker_args(&script, worker_port, command_port, history_path),
        working_dir,
    }
}

/// Start the worker. A visible console inherits our stdio (and gets its own
/// window on Windows); a hidden one has all stdio discarded.
pub(super) fn spawn_worker(plan: &LaunchPlan, show_console: bool) -> io::Result<Child> {
    let mut command = Command::new(&plan.interpreter);
    command.args(&plan.args).current_dir(&plan.working_dir);
    if show_console {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
    } else {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NEW_CONSOLE: u32 = 0x0000_0010;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        command.creation_flags(if show_console {
            CREATE_NEW_CONSOLE
        } else {
            CREATE_NO_WINDOW
        });
    }

    command.spawn()
}
