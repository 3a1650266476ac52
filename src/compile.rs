//! Compile a submission under a deadline and turn the run into the
//! `Compile OK` / diagnostics protocol of the judging service.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;

use crate::error::{JusticeError, Result};
use crate::preset::{detect_language, find_preset};
use crate::supervisor::{ExecutionRequest, ExecutionResult, Stage, Supervisor};

/// Name of the produced executable, relative to the base directory.
pub const EXECUTABLE: &str = "Main";

const MAX_ERRORS: &str = "-fmax-errors=10";

#[derive(Debug, Clone)]
pub struct CompileRequest {
  compiler: Option<String>,
  basedir: PathBuf,
  filename: String,
  timeout: Duration,
  standard: Option<String>,
  language: Option<String>,
  link_static: bool,
}

/// What the compile stage tells the judging service.
#[derive(Debug, Clone)]
pub struct CompileReport {
  result: ExecutionResult,
}

impl CompileRequest {
  pub fn new<P: Into<PathBuf>, FS: Into<String>>(basedir: P, filename: FS) -> Self {
    CompileRequest {
      compiler: None,
      basedir: basedir.into(),
      filename: filename.into(),
      timeout: Duration::from_secs(10),
      standard: None,
      language: None,
      link_static: false,
    }
  }

  /// Override the preset compiler
  pub fn compiler<S: Into<String>>(mut self, compiler: S) -> Self {
    self.compiler = Some(compiler.into());
    self
  }

  /// Set compile time limit (unit: ms)
  pub fn timeout_ms(mut self, value: u64) -> Self {
    self.timeout = Duration::from_millis(value);
    self
  }

  /// Override the preset language standard, e.g. `gnu++17`
  pub fn standard<S: Into<String>>(mut self, standard: S) -> Self {
    self.standard = Some(standard.into());
    self
  }

  pub fn language<S: Into<String>>(mut self, language: S) -> Self {
    self.language = Some(language.into());
    self
  }

  pub fn link_static(mut self, value: bool) -> Self {
    self.link_static = value;
    self
  }

  pub fn basedir(&self) -> &Path {
    &self.basedir
  }

  /// Resolve presets into the command run under the supervisor.
  pub fn to_execution(&self) -> Result<ExecutionRequest> {
    let language = detect_language(&self.language, &self.filename)
      .ok_or(JusticeError::cli("Can not detect submission language"))?;
    let preset = find_preset(&language)?;

    let compiler = self
      .compiler
      .clone()
      .unwrap_or(preset.compiler.to_string());
    let standard = self
      .standard
      .clone()
      .unwrap_or(preset.standard.to_string());

    let mut arguments = vec![
      self.filename.clone(),
      "-save-temps".to_string(),
      format!("-std={}", standard),
      MAX_ERRORS.to_string(),
    ];
    if self.link_static {
      arguments.push("-static".to_string());
    }
    arguments.push("-o".to_string());
    arguments.push(EXECUTABLE.to_string());

    Ok(
      ExecutionRequest::new(compiler, arguments)
        .label("compile")
        .stage(Stage::Compile)
        .cwd(&self.basedir)
        .deadline(self.timeout),
    )
  }
}

impl CompileReport {
  pub fn is_ok(&self) -> bool {
    self.result.outcome().is_success()
  }

  pub fn result(&self) -> &ExecutionResult {
    &self.result
  }

  /// Print `Compile OK` on stdout, or the outcome and the compiler's
  /// diagnostics on stderr.
  pub fn emit(&self) -> Result<()> {
    if self.is_ok() {
      let mut stdout = std::io::stdout().lock();
      stdout.write_all(b"Compile OK")?;
      stdout.flush()?;
    } else {
      let mut stderr = std::io::stderr().lock();
      writeln!(stderr, "{}", self.result.outcome())?;
      stderr.write_all(self.result.stderr())?;
      stderr.flush()?;
    }
    Ok(())
  }
}

/// Compile `request` in its base directory. Only infrastructure problems are
/// errors; a failed compilation is a report like any other.
pub fn compile(supervisor: &Supervisor, request: &CompileRequest) -> Result<CompileReport> {
  if !request.basedir.is_dir() {
    return Err(JusticeError::fs(format!(
      "base directory {} does not exist",
      request.basedir.display()
    )));
  }

  let execution = request.to_execution()?;
  info!(
    "Compile {} in {}",
    request.filename,
    request.basedir.display()
  );
  let result = supervisor.run(&execution);
  Ok(CompileReport { result })
}
