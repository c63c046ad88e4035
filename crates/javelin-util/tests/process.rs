use std::time::Duration;

use javelin_util::cancel::CancellationToken;
use javelin_util::errors::JavelinError;
use javelin_util::process::CommandBuilder;

#[test]
fn test_builder_simple_command() {
    let output = CommandBuilder::new("echo").arg("hello").exec().unwrap();
    assert!(output.success());
    assert_eq!(output.stdout.trim(), "hello");
}

#[test]
fn test_builder_with_env() {
    let output = CommandBuilder::new("sh")
        .arg("-c")
        .arg("echo $JAVELIN_TEST_VAR")
        .env("JAVELIN_TEST_VAR", "javelin_test_value")
        .exec()
        .unwrap();
    assert!(output.success());
    assert_eq!(output.stdout.trim(), "javelin_test_value");
}

#[test]
fn test_builder_with_cwd() {
    let tmp = tempfile::TempDir::new().unwrap();
    let output = CommandBuilder::new("pwd").cwd(tmp.path()).exec().unwrap();
    assert!(output.success());
    assert_eq!(
        std::path::PathBuf::from(output.stdout.trim()),
        tmp.path().canonicalize().unwrap()
    );
}

#[test]
fn test_missing_program_is_tool_not_found() {
    let err = CommandBuilder::new("nonexistent_program_xyz_123")
        .exec()
        .unwrap_err();
    assert!(matches!(err, JavelinError::ToolNotFound { .. }));
}

#[test]
fn test_timeout_kills_child() {
    let err = CommandBuilder::new("sleep")
        .arg("5")
        .timeout(Duration::from_millis(100))
        .exec()
        .unwrap_err();
    assert!(matches!(err, JavelinError::Invocation { code: None, .. }));
}

#[test]
fn test_cancellation_kills_child() {
    let token = CancellationToken::new();
    let cancel = token.clone();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        cancel.cancel();
    });
    let err = CommandBuilder::new("sleep")
        .arg("5")
        .cancellation(token)
        .exec()
        .unwrap_err();
    assert!(matches!(err, JavelinError::Cancelled));
}

#[test]
fn test_nonzero_exit_is_captured() {
    let output = CommandBuilder::new("sh")
        .arg("-c")
        .arg("echo oops >&2; exit 3")
        .exec()
        .unwrap();
    assert!(!output.success());
    assert_eq!(output.code, Some(3));
    assert_eq!(output.stderr.trim(), "oops");
}
