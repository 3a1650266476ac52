use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::tempdir;

use justice::{compile, CompileRequest, Outcome};

mod common;

fn justice_compile(basedir: &Path, filename: &str, timeout: u64, log_dir: &Path) -> Output {
  Command::new(env!("CARGO_BIN_EXE_justice"))
    .env("LOG_DIR", log_dir)
    .env_remove("JUSTICE_SENTRY_DSN")
    .arg("compile")
    .arg("--compiler")
    .arg("gcc")
    .arg("--basedir")
    .arg(basedir)
    .arg("--filename")
    .arg(filename)
    .arg("--timeout")
    .arg(timeout.to_string())
    .output()
    .unwrap()
}

fn read_logs(log_dir: &Path) -> String {
  let mut text = String::new();
  for entry in fs::read_dir(log_dir).unwrap() {
    text.push_str(&fs::read_to_string(entry.unwrap().path()).unwrap_or_default());
  }
  text
}

#[test]
fn it_should_print_compile_ok() {
  common::setup();
  if !common::has_compiler("gcc") {
    return;
  }
  let dir = tempdir().unwrap();
  let logs = tempdir().unwrap();
  common::copy_fixture("aplusb.c", dir.path());

  let output = justice_compile(dir.path(), "aplusb.c", 30000, logs.path());

  assert!(output.status.success());
  assert_eq!(String::from_utf8_lossy(&output.stdout), "Compile OK");
  assert!(dir.path().join("Main").exists());
}

#[test]
fn it_should_relay_compiler_diagnostics() {
  common::setup();
  if !common::has_compiler("gcc") {
    return;
  }
  let dir = tempdir().unwrap();
  let logs = tempdir().unwrap();
  common::copy_fixture("compile_error.c", dir.path());

  let output = justice_compile(dir.path(), "compile_error.c", 30000, logs.path());

  // failed compilations are still a successful run of the entry point
  assert!(output.status.success());
  assert!(output.stdout.is_empty());
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.starts_with("exit status 1"));
  assert!(stderr.contains("error"));
  assert!(!read_logs(logs.path()).contains("CompileTimeExceeded"));
}

#[test]
fn it_should_kill_compiler_bomb() {
  common::setup();
  if !common::has_compiler("gcc") {
    return;
  }
  let dir = tempdir().unwrap();
  let logs = tempdir().unwrap();
  common::copy_fixture("compiler_bomb.c", dir.path());

  let output = justice_compile(dir.path(), "compiler_bomb.c", 10, logs.path());

  assert!(output.status.success());
  assert!(output.stdout.is_empty());
  assert!(String::from_utf8_lossy(&output.stderr).contains("signal: killed"));
  assert!(read_logs(logs.path()).contains("CompileTimeExceeded"));
}

#[test]
fn it_should_escalate_bomb_once() {
  common::setup();
  if !common::has_compiler("gcc") {
    return;
  }
  let (supervisor, reporter) = common::supervisor();
  let dir = tempdir().unwrap();
  common::copy_fixture("compiler_bomb.c", dir.path());

  let request = CompileRequest::new(dir.path(), "compiler_bomb.c")
    .compiler("gcc")
    .timeout_ms(10);
  let report = compile(&supervisor, &request).unwrap();

  assert!(!report.is_ok());
  assert_eq!(report.result().outcome(), &Outcome::TimedOut);
  assert!(report.result().stderr().is_empty());

  let anomalies = reporter.anomalies();
  assert_eq!(anomalies.len(), 1);
  assert_eq!(anomalies[0].category(), "CompileTimeExceeded");
  assert_eq!(anomalies[0].working_dir(), dir.path().to_string_lossy());
}

#[test]
fn it_should_refuse_missing_basedir() {
  common::setup();
  let (supervisor, _) = common::supervisor();
  let request = CompileRequest::new("/definitely/not/here", "Main.c");
  assert!(compile(&supervisor, &request).is_err());
}
