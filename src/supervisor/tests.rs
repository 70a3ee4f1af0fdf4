use super::launch::{plan_launch, worker_args};
use super::locate::install_root_for;
use super::shutdown::shutdown_url;
use super::*;
use crate::dispatch::BridgeQueues;
use std::io::{Read, Write};
use std::net::{Ipv4Addr, TcpListener};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_project(label: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("skillbridge_supervisor_{label}_{nanos}"));
    fs::create_dir_all(&dir).unwrap();
    dir.canonicalize().unwrap()
}

fn free_port() -> u16 {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    listener.local_addr().unwrap().port()
}

fn write_worker_script(root: &Path, layout: &WorkerLayout) {
    let script = root.join(&layout.script_path);
    fs::create_dir_all(script.parent().unwrap()).unwrap();
    fs::write(script, "# worker entry\n").unwrap();
}

fn supervisor_for(project: &Path) -> (WorkerSupervisor, BridgeQueues) {
    let queues = BridgeQueues::new();
    let mut options = SupervisorOptions::new(project);
    options.shutdown_timeout = Duration::from_millis(200);
    options.exit_grace = Duration::from_millis(200);
    (WorkerSupervisor::new(options, queues.status()), queues)
}

#[test]
fn locate_prefers_package_over_source() {
    let project = temp_project("locate_order");
    let layout = WorkerLayout::default();
    let package = project.join("packages").join(&layout.package_name);
    let source = project.join("workers").join(&layout.package_name);
    write_worker_script(&source, &layout);

    let found = locate_worker(&project, &layout).unwrap();
    assert_eq!(found.origin, InstallOrigin::Source);
    assert_eq!(found.root, source);

    // A package directory without its entry script is not a usable install.
    fs::create_dir_all(&package).unwrap();
    assert_eq!(locate_worker(&project, &layout).unwrap().origin, InstallOrigin::Source);

    write_worker_script(&package, &layout);
    let found = locate_worker(&project, &layout).unwrap();
    assert_eq!(found.origin, InstallOrigin::Package);
    assert_eq!(found.root, package);
    let _ = fs::remove_dir_all(project);
}

#[test]
fn locate_falls_back_to_script_search() {
    let project = temp_project("locate_search");
    let layout = WorkerLayout::default();
    let root = project.join("vendor").join("bridge");
    write_worker_script(&root, &layout);
    // Hidden directories are never searched.
    write_worker_script(&project.join(".cache").join("bridge"), &layout);

    let found = locate_worker(&project, &layout).unwrap();
    assert_eq!(found.origin, InstallOrigin::Search);
    assert_eq!(found.root, root);
    assert_eq!(found.script(&layout), root.join("python/core/ai_server.py"));
    let _ = fs::remove_dir_all(project);
}

#[test]
fn incomplete_candidates_fall_through_to_search() {
    let project = temp_project("locate_incomplete");
    let layout = WorkerLayout::default();
    fs::create_dir_all(project.join("packages").join(&layout.package_name)).unwrap();
    fs::create_dir_all(project.join("workers").join(&layout.package_name)).unwrap();
    let root = project.join("vendor").join("bridge");
    write_worker_script(&root, &layout);

    let found = locate_worker(&project, &layout).unwrap();
    assert_eq!(found.origin, InstallOrigin::Search);
    assert_eq!(found.root, root);
    let _ = fs::remove_dir_all(project);
}

#[test]
fn locate_search_respects_depth() {
    let project = temp_project("locate_depth");
    let layout = WorkerLayout {
        search_depth: 1,
        ..WorkerLayout::default()
    };
    write_worker_script(&project.join("a").join("b").join("c"), &layout);
    assert!(locate_worker(&project, &layout).is_none());
    let _ = fs::remove_dir_all(project);
}

#[test]
fn install_root_strips_script_path() {
    let script_path = Path::new("python/core/ai_server.py");
    assert_eq!(
        install_root_for(Path::new("/p/w/python/core/ai_server.py"), script_path),
        Some(PathBuf::from("/p/w"))
    );
    assert_eq!(
        install_root_for(Path::new("/p/w/other/ai_server.py"), script_path),
        None
    );
}

#[test]
fn worker_args_carry_ports_and_history() {
    let args = worker_args(
        Path::new("/w/python/core/ai_server.py"),
        5000,
        8081,
        Path::new("/proj/.skillbridge/history.json"),
    );
    let args: Vec<String> = args
        .into_iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        args,
        vec![
            "/w/python/core/ai_server.py",
            "--port",
            "5000",
            "--bridge-port",
            "8081",
            "--history",
            "/proj/.skillbridge/history.json",
        ]
    );
}

#[test]
fn plan_uses_fallback_when_bundle_missing() {
    let project = temp_project("plan_fallback");
    let layout = WorkerLayout {
        fallback_interpreter: "definitely-not-an-interpreter".to_string(),
        ..WorkerLayout::default()
    };
    let install = WorkerInstall {
        root: project.clone(),
        origin: InstallOrigin::Source,
    };
    let plan = plan_launch(&install, &layout, 5000, 8081, Path::new("/h.json"));
    assert!(!plan.bundled);
    assert_eq!(plan.interpreter, PathBuf::from("definitely-not-an-interpreter"));
    assert_eq!(plan.working_dir, project.join("python/core"));
    let _ = fs::remove_dir_all(project);
}

#[test]
fn shutdown_url_targets_loopback() {
    assert_eq!(shutdown_url(5000), "http://127.0.0.1:5000/shutdown");
}

#[test]
fn missing_worker_logs_error_and_stop_is_safe() {
    let project = temp_project("missing");
    let (mut supervisor, queues) = supervisor_for(&project);
    assert!(!supervisor.start(free_port(), Path::new("history.json"), false));
    assert!(!supervisor.has_live_worker());
    assert_eq!(
        queues.logs.drain(),
        vec!["[Error] Cannot find worker package 'skillbridge-worker'"]
    );

    supervisor.stop(free_port());
    supervisor.stop(free_port());
    assert!(supervisor.worker_pid().is_none());
    let _ = fs::remove_dir_all(project);
}

#[test]
fn missing_script_is_reported() {
    let project = temp_project("no_script");
    let package = project.join("packages").join("skillbridge-worker");
    fs::create_dir_all(&package).unwrap();
    let (mut supervisor, queues) = supervisor_for(&project);
    assert!(!supervisor.start(free_port(), Path::new("history.json"), false));
    let logs = queues.logs.drain();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].starts_with("[Error] Worker script not found at: "));
    let _ = fs::remove_dir_all(project);
}

#[test]
fn stop_posts_shutdown_to_worker_port() {
    let project = temp_project("http_stop");
    let server = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = server.local_addr().unwrap().port();
    let handle = std::thread::spawn(move || {
        let (mut stream, _) = server.accept().unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !String::from_utf8_lossy(&request).contains("{}") {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .unwrap();
        String::from_utf8_lossy(&request).into_owned()
    });

    let (mut supervisor, _queues) = supervisor_for(&project);
    supervisor.stop(port);
    let request = handle.join().unwrap();
    assert!(request.starts_with("POST /shutdown HTTP/1.1"));
    let _ = fs::remove_dir_all(project);
}

#[cfg(unix)]
mod unix {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn install_stub_worker(project: &Path, body: &str) {
        let layout = WorkerLayout::default();
        let root = project.join("packages").join(&layout.package_name);
        write_worker_script(&root, &layout);
        let interpreter = root.join(&layout.bundled_interpreter);
        fs::create_dir_all(interpreter.parent().unwrap()).unwrap();
        fs::write(&interpreter, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&interpreter, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        true
    }

    #[test]
    fn start_launches_bundled_interpreter_with_args() {
        let project = temp_project("launch");
        let args_file = project.join("args.txt");
        install_stub_worker(
            &project,
            &format!("echo \"$@\" > '{}'\nexec sleep 30", args_file.display()),
        );
        let (mut supervisor, queues) = supervisor_for(&project);
        let worker_port = free_port();
        assert!(supervisor.start(worker_port, Path::new(".skillbridge/history.json"), false));
        assert!(supervisor.has_live_worker());
        assert!(supervisor.worker_pid().is_some());

        assert!(wait_until(|| fs::read_to_string(&args_file)
            .map(|text| text.ends_with('\n'))
            .unwrap_or(false)));
        let args = fs::read_to_string(&args_file).unwrap();
        let history = project.join(".skillbridge").join("history.json");
        assert!(args.trim().ends_with(&format!(
            "--port {worker_port} --bridge-port 8081 --history {}",
            history.display()
        )));
        assert!(history.parent().unwrap().is_dir());

        let logs = queues.logs.drain();
        assert!(logs
            .iter()
            .any(|line| line.starts_with("[System] Launching worker: ")
                && line.ends_with("(Console: false)")));

        supervisor.stop(free_port());
        assert!(!supervisor.has_live_worker());
        assert!(supervisor.worker_pid().is_none());
        let _ = fs::remove_dir_all(project);
    }

    #[test]
    fn start_skips_package_without_script() {
        let project = temp_project("source_fallback");
        let layout = WorkerLayout::default();
        let source = project.join("workers").join(&layout.package_name);
        let marker = project.join("launched.txt");
        write_worker_script(&source, &layout);
        let interpreter = source.join(&layout.bundled_interpreter);
        fs::create_dir_all(interpreter.parent().unwrap()).unwrap();
        fs::write(
            &interpreter,
            format!("#!/bin/sh\necho \"$1\" > '{}'\nexec sleep 30\n", marker.display()),
        )
        .unwrap();
        fs::set_permissions(&interpreter, fs::Permissions::from_mode(0o755)).unwrap();
        fs::create_dir_all(project.join("packages").join(&layout.package_name)).unwrap();

        let (mut supervisor, queues) = supervisor_for(&project);
        assert!(supervisor.start(free_port(), Path::new("history.json"), false));
        assert!(wait_until(|| fs::read_to_string(&marker)
            .map(|text| text.ends_with('\n'))
            .unwrap_or(false)));
        assert_eq!(
            fs::read_to_string(&marker).unwrap().trim(),
            source.join(&layout.script_path).display().to_string()
        );
        assert!(!queues
            .logs
            .drain()
            .iter()
            .any(|line| line.starts_with("[Error]")));

        supervisor.stop(free_port());
        assert!(!supervisor.has_live_worker());
        let _ = fs::remove_dir_all(project);
    }

    #[test]
    fn restarting_replaces_the_previous_worker() {
        let project = temp_project("replace");
        install_stub_worker(&project, "exec sleep 30");
        let (mut supervisor, _queues) = supervisor_for(&project);
        let port = free_port();
        assert!(supervisor.start(port, Path::new("history.json"), false));
        let first = supervisor.worker_pid().unwrap();
        assert!(supervisor.start(port, Path::new("history.json"), false));
        let second = supervisor.worker_pid().unwrap();
        assert_ne!(first, second);
        assert!(supervisor.has_live_worker());
        supervisor.stop(port);
        assert!(!supervisor.has_live_worker());
        let _ = fs::remove_dir_all(project);
    }

    #[test]
    fn poll_exit_reports_crashed_worker() {
        let project = temp_project("crash");
        install_stub_worker(&project, "exit 7");
        let (mut supervisor, queues) = supervisor_for(&project);
        assert!(supervisor.start(free_port(), Path::new("history.json"), false));

        let mut status = None;
        assert!(wait_until(|| {
            status = supervisor.poll_exit();
            status.is_some()
        }));
        assert_eq!(status.unwrap().code(), Some(7));
        assert!(supervisor.worker_pid().is_none());
        assert!(queues
            .logs
            .drain()
            .iter()
            .any(|line| line.starts_with("[Warn] Worker exited unexpectedly")));
        let _ = fs::remove_dir_all(project);
    }

    #[test]
    fn dropping_supervisor_kills_worker() {
        let project = temp_project("drop");
        install_stub_worker(&project, "exec sleep 30");
        let (mut supervisor, _queues) = supervisor_for(&project);
        assert!(supervisor.start(free_port(), Path::new("history.json"), false));
        let pid = supervisor.worker_pid().unwrap() as libc::pid_t;
        drop(supervisor);
        // SAFETY: signal 0 only probes whether the pid exists.
        let alive = unsafe { libc::kill(pid, 0) } == 0;
        assert!(!alive);
        let _ = fs::remove_dir_all(project);
    }
}
