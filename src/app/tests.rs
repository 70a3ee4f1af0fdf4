use super::*;
use std::panic;

#[test]
fn panic_payload_text_handles_str_and_string() {
    let payload = panic::catch_unwind(|| panic!("static message")).unwrap_err();
    assert_eq!(panic_payload_text(&*payload), "static message");

    let payload = panic::catch_unwind(|| panic!("formatted {}", 42)).unwrap_err();
    assert_eq!(panic_payload_text(&*payload), "formatted 42");

    let payload = panic::catch_unwind(|| panic::panic_any(7_u8)).unwrap_err();
    assert_eq!(panic_payload_text(&*payload), "non-string panic payload");
}

#[test]
fn log_paths_use_skillbridge_names() {
    assert!(crash_log_path().ends_with("skillbridge_crash.log"));
    if std::env::var_os("SKILLBRIDGE_DEBUG_LOG").is_none() {
        assert!(log_file_path().ends_with("skillbridge.log"));
    }
}

#[test]
fn logging_is_off_by_default() {
    assert_eq!(
        LogSettings::default(),
        LogSettings {
            enabled: false,
            content: false
        }
    );
}

#[test]
fn install_panic_hook_is_idempotent() {
    install_panic_hook();
    install_panic_hook();
}
