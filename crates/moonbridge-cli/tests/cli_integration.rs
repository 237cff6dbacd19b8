//! Integration tests for the `moonbridge` binary.
//!
//! Runs the built executable against fixture scripts and checks exit
//! status, stdout and the handler output on stderr.

use std::path::PathBuf;
use std::process::{Command, Output};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn moonbridge(args: &[&str]) -> Output {
    let dir = tempfile::tempdir().unwrap();
    Command::new(env!("CARGO_BIN_EXE_moonbridge"))
        .args(args)
        .current_dir(dir.path())
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to spawn moonbridge")
}

fn fixture(name: &str) -> String {
    fixtures_dir().join(name).to_string_lossy().into_owned()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ===== run =====

#[test]
fn test_run_prints_and_sees_args() {
    let output = moonbridge(&["run", &fixture("hello.lua"), "first", "second"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("hello from hello.lua"), "{}", out);
    assert!(out.contains("arg\t1\tfirst"));
    assert!(out.contains("arg\t2\tsecond"));
}

#[test]
fn test_run_runtime_error_exits_nonzero() {
    let output = moonbridge(&["run", &fixture("fails.lua")]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("fails.lua:2:"), "{}", err);
    assert!(err.contains("attempt to index"));
}

#[test]
fn test_run_missing_file() {
    let output = moonbridge(&["run", "does-not-exist.lua"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("does-not-exist.lua"));
}

#[test]
fn test_run_traceback_flag() {
    let output = moonbridge(&["run", "--traceback", &fixture("fails.lua")]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("stack traceback:"));
}

#[test]
fn test_sandbox_blocks_os() {
    let plain = moonbridge(&["run", &fixture("escape.lua")]);
    assert_eq!(plain.status.code(), Some(3));

    let sandboxed = moonbridge(&["run", "--sandbox", &fixture("escape.lua")]);
    assert_eq!(sandboxed.status.code(), Some(1));
    assert!(stderr(&sandboxed).contains("os"));
}

// ===== eval =====

#[test]
fn test_eval_prints_results() {
    let output = moonbridge(&["eval", "return 1+1, 'moon'"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output).trim_end(), "2\tmoon");
}

#[test]
fn test_eval_syntax_error() {
    let output = moonbridge(&["eval", "this is not valid"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("[string \"this is not valid\"]:1:"));
    assert!(stdout(&output).is_empty());
}

#[test]
fn test_eval_no_std() {
    let output = moonbridge(&["eval", "--no-std", "return type"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim_end(), "<nil>");
}

// ===== check =====

#[test]
fn test_check_reports_each_file() {
    let output = moonbridge(&["check", &fixture("hello.lua"), &fixture("fails.lua")]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output).lines().count(), 2);
}

#[test]
fn test_check_syntax_error() {
    let output = moonbridge(&["check", &fixture("hello.lua"), &fixture("syntax.lua")]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("hello.lua: ok"));
    assert!(stderr(&output).contains("syntax.lua:1:"));
}

// ===== config =====

#[test]
fn test_config_file_enables_sandbox() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("strict.toml");
    std::fs::write(&config, "[state]\nsandbox = true\n").unwrap();

    let output = moonbridge(&[
        "--config",
        &config.to_string_lossy(),
        "eval",
        "return os",
    ]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim_end(), "nil");
}

#[test]
fn test_bad_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("bad.toml");
    std::fs::write(&config, "[gc]\nmode = 7\n").unwrap();

    let output = moonbridge(&["--config", &config.to_string_lossy(), "eval", "return 1"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).starts_with("Error:"));
}
