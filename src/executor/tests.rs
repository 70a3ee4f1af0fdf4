use super::process::{collect_until, parse_stdout, should_kill, write_payload_with_newline};
use super::*;
use std::time::{Duration, Instant};

#[test]
fn empty_stdout_means_done() {
    assert_eq!(
        parse_stdout(b"  \n").unwrap(),
        CommandOutput::Message("Done.".to_string())
    );
}

#[test]
fn json_stdout_becomes_data() {
    assert_eq!(
        parse_stdout(b"{\"files\": 2}\n").unwrap(),
        CommandOutput::Data(serde_json::json!({"files": 2}))
    );
    assert_eq!(
        parse_stdout(b"[1, 2]").unwrap(),
        CommandOutput::Data(serde_json::json!([1, 2]))
    );
}

#[test]
fn malformed_json_stays_text() {
    assert_eq!(
        parse_stdout(b"{not json}").unwrap(),
        CommandOutput::Message("{not json}".to_string())
    );
    assert_eq!(
        parse_stdout(b"  created 3 assets \n").unwrap(),
        CommandOutput::Message("created 3 assets".to_string())
    );
}

#[test]
fn non_utf8_stdout_is_invalid_output() {
    let err = parse_stdout(&[0xff, 0xfe]).unwrap_err();
    assert_eq!(err.category(), "invalid-output");
}

#[test]
fn output_maps_to_response() {
    let response = CommandOutput::Message("hi".to_string()).into_response();
    assert_eq!(response.to_json(), r#"{"status":"ok","message":"hi"}"#);
    let response = CommandOutput::Data(serde_json::json!(true)).into_response();
    assert_eq!(response.to_json(), r#"{"status":"ok","data":true}"#);
}

#[test]
fn error_categories_are_stable() {
    let cases = [
        (
            ExecutionError::Spawn {
                program: "x".to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "missing"),
            },
            "spawn",
        ),
        (io::Error::other("pipe").into(), "io"),
        (
            ExecutionError::ExitStatus {
                code: Some(2),
                stderr: String::new(),
            },
            "exit-status",
        ),
        (ExecutionError::Timeout(Duration::from_secs(1)), "timeout"),
        (ExecutionError::InvalidOutput("x".to_string()), "invalid-output"),
        (ExecutionError::Rejected("x".to_string()), "rejected"),
        (ExecutionError::Panicked("x".to_string()), "panic"),
    ];
    for (err, category) in cases {
        assert_eq!(err.category(), category);
    }
}

#[test]
fn exit_status_display_includes_stderr() {
    let err = ExecutionError::ExitStatus {
        code: Some(1),
        stderr: "NameError: x".to_string(),
    };
    assert_eq!(err.to_string(), "exited with code 1: NameError: x");
}

#[test]
fn closures_are_executors() {
    let mut calls = 0;
    let mut executor = |command: &str| -> Result<CommandOutput, ExecutionError> {
        calls += 1;
        Ok(CommandOutput::Message(command.to_uppercase()))
    };
    assert_eq!(
        executor.execute("abc").unwrap(),
        CommandOutput::Message("ABC".to_string())
    );
    drop(executor);
    assert_eq!(calls, 1);
}

#[test]
fn payload_gets_trailing_newline_once() {
    let mut buf = Vec::new();
    write_payload_with_newline(&mut buf, "print(1)").unwrap();
    assert_eq!(buf, b"print(1)\n");

    let mut buf = Vec::new();
    write_payload_with_newline(&mut buf, "print(1)\n").unwrap();
    assert_eq!(buf, b"print(1)\n");
}

#[test]
fn kill_escalates_after_grace() {
    let sent = Instant::now();
    assert!(!should_kill(sent, sent + Duration::from_millis(100)));
    assert!(should_kill(sent, sent + Duration::from_millis(500)));
}

#[test]
fn collection_stops_at_deadline_while_pipe_stays_open() {
    let (tx, rx) = crossbeam_channel::unbounded();
    tx.send(b"partial ".to_vec()).unwrap();
    tx.send(b"output".to_vec()).unwrap();
    let started = Instant::now();
    let collected = collect_until(Some(rx), started + Duration::from_millis(50), "stdout");
    assert_eq!(collected, b"partial output");
    assert!(started.elapsed() < Duration::from_secs(1));
    drop(tx);
}

#[test]
fn collection_ends_when_pipe_closes() {
    let (tx, rx) = crossbeam_channel::unbounded();
    tx.send(b"all".to_vec()).unwrap();
    drop(tx);
    let far = Instant::now() + Duration::from_secs(30);
    assert_eq!(collect_until(Some(rx), far, "stdout"), b"all");
    assert!(collect_until(None, far, "stderr").is_empty());
}

#[cfg(unix)]
mod unix {
    use super::*;

    #[test]
    fn process_executor_echoes_stdin() {
        let mut executor = ProcessExecutor::new("cat", Vec::new());
        assert_eq!(
            executor.execute("hello bridge").unwrap(),
            CommandOutput::Message("hello bridge".to_string())
        );
    }

    #[test]
    fn process_executor_parses_json_stdout() {
        let mut executor = ProcessExecutor::new("sh", vec!["-s".to_string()]);
        let output = executor.execute("echo '{\"ok\": true}'").unwrap();
        assert_eq!(output, CommandOutput::Data(serde_json::json!({"ok": true})));
    }

    #[test]
    fn process_executor_reports_exit_status() {
        let mut executor = ProcessExecutor::new("sh", vec!["-s".to_string()]);
        let err = executor.execute("echo broken >&2; exit 3").unwrap_err();
        match err {
            ExecutionError::ExitStatus { code, stderr } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn background_children_do_not_hold_the_tick() {
        let mut executor = ProcessExecutor::new("sh", vec!["-s".to_string()])
            .with_timeout(Duration::from_millis(300));
        let started = Instant::now();
        let output = executor.execute("sleep 4 &\necho hi\n").unwrap();
        assert_eq!(output, CommandOutput::Message("hi".to_string()));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn process_executor_reports_spawn_failure() {
        let mut executor =
            ProcessExecutor::new("/nonexistent/skillbridge-interpreter", Vec::new());
        let err = executor.execute("noop").unwrap_err();
        assert_eq!(err.category(), "spawn");
    }

    #[test]
    fn process_executor_times_out() {
        let mut executor = ProcessExecutor::new("sh", vec!["-c".to_string(), "exec sleep 5".to_string()])
            .with_timeout(Duration::from_millis(100));
        let started = Instant::now();
        let err = executor.execute("ignored").unwrap_err();
        assert_eq!(err.category(), "timeout");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn process_executor_runs_in_working_dir() {
        let dir = std::env::temp_dir().canonicalize().unwrap();
        let mut executor =
            ProcessExecutor::new("sh", vec!["-s".to_string()]).with_working_dir(&dir);
        let output = executor.execute("pwd").unwrap();
        let CommandOutput::Message(text) = output else {
            panic!("expected text output");
        };
        assert_eq!(std::path::PathBuf::from(text).canonicalize().unwrap(), dir);
    }
}
