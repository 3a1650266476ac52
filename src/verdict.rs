use std::fs;
use std::path::Path;

use log::info;
use nix::libc::STDOUT_FILENO;
use nix::sys::signal::Signal;
use nix::unistd::isatty;
use serde::{Deserialize, Serialize};

use crate::cgroup::ResourceUsage;
use crate::error::Result;
use crate::supervisor::{ExecutionResult, Outcome};

/// Numeric status codes understood by the judging service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerdictCodes {
  pub accepted: i32,
  pub presentation_error: i32,
  pub wrong_answer: i32,
  pub runtime_error: i32,
  pub restricted_function: i32,
  pub resource_violation: i32,
  pub system_error: i32,
}

/// Record handed back to the judging service after a run.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
  status: i32,
  result: String,
  stdout: String,
  stderr: String,
  outcome: String,
  time: u128,
  truncated: bool,
}

impl Default for VerdictCodes {
  fn default() -> Self {
    VerdictCodes {
      accepted: 0,
      presentation_error: 1,
      wrong_answer: 2,
      runtime_error: 3,
      restricted_function: 4,
      resource_violation: 5,
      system_error: 6,
    }
  }
}

impl VerdictCodes {
  /// Load overrides from a JSON file, missing keys keep their defaults
  pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
    let text = fs::read_to_string(path.as_ref())?;
    let codes = serde_json::from_str(&text)?;
    info!("Load verdict codes from {}", path.as_ref().display());
    Ok(codes)
  }
}

impl Verdict {
  pub fn new(result: &ExecutionResult, usage: &ResourceUsage, codes: &VerdictCodes) -> Self {
    let (status, label) = judge(result, usage, codes);
    Verdict {
      status,
      result: label.to_string(),
      stdout: result.stdout_text(),
      stderr: result.stderr_text(),
      outcome: result.outcome().name().to_string(),
      time: result.duration().as_millis(),
      truncated: result.stdout_truncated() || result.stderr_truncated() || result.output_detached(),
    }
  }

  pub fn status(&self) -> i32 {
    self.status
  }

  pub fn result(&self) -> &str {
    &self.result
  }

  pub fn to_json(&self) -> String {
    serde_json::to_string(self).unwrap_or_else(|err| {
      serde_json::json!({ "status": self.status, "result": err.to_string() }).to_string()
    })
  }

  pub fn report(&self) {
    let is_tty = isatty(STDOUT_FILENO).unwrap_or(false);
    if is_tty {
      self.report_human();
    } else {
      self.report_json();
    }
  }

  pub fn report_human(&self) {
    let color = if self.status == 0 { 2 } else { 1 };
    println!();
    println!("\x1b[1mStatus\x1b[22m     \x1b[9{}m{}\x1b[39m", color, self.status);
    println!("\x1b[1mResult\x1b[22m     {}", self.result);
    println!("\x1b[1mOutcome\x1b[22m    {}", self.outcome);
    println!("\x1b[1mTime\x1b[22m       {} ms", self.time);
    if self.truncated {
      println!("\x1b[1mOutput\x1b[22m     \x1b[93mtruncated\x1b[39m");
    }
    if !self.stdout.is_empty() {
      println!("\x1b[1mStdout\x1b[22m");
      println!("{}", self.stdout.trim_end());
    }
    if !self.stderr.is_empty() {
      println!("\x1b[1mStderr\x1b[22m");
      println!("{}", self.stderr.trim_end());
    }
    println!();
  }

  pub fn report_json(&self) {
    println!("{}", self.to_json());
  }
}

fn judge(result: &ExecutionResult, usage: &ResourceUsage, codes: &VerdictCodes) -> (i32, &'static str) {
  let killed = matches!(result.outcome(), Outcome::Signaled(Signal::SIGKILL));
  match result.outcome() {
    Outcome::LaunchError(_) | Outcome::SupervisorError(_) => (codes.system_error, "System Error"),
    _ if usage.exceeded_processes() => (codes.resource_violation, "Runtime Error"),
    _ if usage.exceeded_memory() || (killed && usage.touched_memory_limit()) => {
      (codes.resource_violation, "Runtime Error")
    }
    Outcome::Signaled(Signal::SIGSYS) => (codes.restricted_function, "Restricted Function"),
    Outcome::Success if result.stdout().is_empty() => (codes.wrong_answer, "Wrong Answer"),
    Outcome::Success => (codes.accepted, "Accepted"),
    Outcome::TimedOut | Outcome::Exited(_) | Outcome::Signaled(_) => {
      (codes.runtime_error, "Runtime Error")
    }
  }
}
