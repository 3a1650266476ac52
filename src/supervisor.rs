use std::env;
use std::ffi::CString;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::unix::prelude::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use nix::errno::Errno;
use nix::fcntl::{open, OFlag};
use nix::libc::{self, c_char};
use nix::poll::{poll, PollFd, PollFlags};
use nix::sys::signal::{self, killpg, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::stat::Mode;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{chdir, close, dup2, fork, setpgid, ForkResult, Pid};
use serde::Serialize;

use crate::cgroup::ResourceLimits;
use crate::error::{JusticeError, Result};
use crate::report::{Anomaly, AnomalyReporter};
use crate::utils::pipe::ChildReport;
use crate::utils::{into_c_string, JusticePipe, ReportWriter, SyncReader};

/// Per-stream ceiling on captured output.
pub const DEFAULT_CAPTURE_LIMIT: usize = 4 * 1024 * 1024;

const EXIT_SETUP_FAILURE: i32 = 126;

const EXIT_EXEC_FAILURE: i32 = 127;

/// How long capture keeps reading after the leader is reaped and its group
/// killed. Writers still holding the pipes after that left the group.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

const POLL_INTERVAL_MS: i32 = 50;

/// Which part of the judging pipeline a run belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
  Compile,
  Run,
}

/// One command to run under a deadline. Built per run, never reused.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
  label: String,
  stage: Stage,
  program: String,
  arguments: Vec<String>,
  cwd: PathBuf,
  deadline: Duration,
  stdin: Option<PathBuf>,
  env: Vec<(String, String)>,
  limits: Option<ResourceLimits>,
}

/// How a supervised run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
  Success,
  /// Exited on its own with a non-zero status
  Exited(i32),
  Signaled(Signal),
  /// Killed by the supervisor because the deadline fired first
  TimedOut,
  LaunchError(String),
  SupervisorError(String),
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
  outcome: Outcome,
  stdout: Vec<u8>,
  stderr: Vec<u8>,
  stdout_truncated: bool,
  stderr_truncated: bool,
  output_detached: bool,
  duration: Duration,
  limits: Option<ResourceLimits>,
}

/// Hooks into the launch sequence, used by containers to constrain and
/// isolate the child before it execs the payload.
pub trait LaunchHooks: Sync {
  /// Parent side. The child exists but is held before `execve`.
  fn attach(&self, _child: Pid) -> Result<()> {
    Ok(())
  }

  /// Child side, after stdio is redirected and the child is released. Only
  /// returns in the process that goes on to exec the payload.
  ///
  /// This runs between `fork` and `execve`. When the supervisor is driven
  /// from several threads at once, another thread may hold the allocator or
  /// logger lock at fork time, so implementations must not allocate or log
  /// outside of error paths. Resolve paths and build strings beforehand.
  fn enter(&self, _report: &ReportWriter) -> Result<()> {
    Ok(())
  }

  /// Parent side, called when the deadline fires and once the leader exits.
  fn terminate(&self) {}
}

/// Plain run in the caller's namespaces and groups.
pub struct NoHooks;

impl LaunchHooks for NoHooks {}

/// Runs commands with a hard wall-clock deadline and group-wide kill.
pub struct Supervisor {
  reporter: Arc<dyn AnomalyReporter>,
  capture_limit: usize,
}

#[derive(Default)]
struct Capture {
  bytes: Vec<u8>,
  truncated: bool,
  /// Gave up on a writer that outlived the drain grace
  detached: bool,
}

enum Exit {
  Code(i32),
  Signal(Signal),
}

/// Everything the child needs, allocated before `fork`.
struct Prepared {
  program: CString,
  cwd: CString,
  _argv: Vec<CString>,
  _envp: Vec<CString>,
  argv_ptrs: Vec<*const c_char>,
  envp_ptrs: Vec<*const c_char>,
}

impl Stage {
  /// Label attached to the anomaly sent for a silent timeout.
  pub fn anomaly_category(&self) -> &'static str {
    match self {
      Stage::Compile => "CompileTimeExceeded",
      Stage::Run => "RunTimeExceeded",
    }
  }
}

impl ExecutionRequest {
  pub fn new<PS: Into<String>, AS: Into<String>>(program: PS, arguments: Vec<AS>) -> Self {
    ExecutionRequest {
      label: "justice".to_string(),
      stage: Stage::Run,
      program: program.into(),
      arguments: arguments.into_iter().map(|a| a.into()).collect(),
      cwd: env::current_dir().unwrap_or(PathBuf::from("/")),
      deadline: Duration::from_millis(1000),
      stdin: None,
      env: vec![(
        "PATH".to_string(),
        env::var("PATH").unwrap_or("".to_string()),
      )],
      limits: None,
    }
  }

  /// Set label
  pub fn label<S: Into<String>>(mut self, label: S) -> Self {
    self.label = label.into();
    self
  }

  pub fn stage(mut self, stage: Stage) -> Self {
    self.stage = stage;
    self
  }

  /// Set work directory (inside the new root for containers)
  pub fn cwd<P: Into<PathBuf>>(mut self, path: P) -> Self {
    self.cwd = path.into();
    self
  }

  pub fn deadline(mut self, deadline: Duration) -> Self {
    self.deadline = deadline;
    self
  }

  /// Set deadline (unit: ms)
  pub fn timeout_ms(self, value: u64) -> Self {
    self.deadline(Duration::from_millis(value))
  }

  /// Set stdin redirection, `/dev/null` otherwise
  pub fn stdin<P: Into<PathBuf>>(mut self, path: P) -> Self {
    self.stdin = Some(path.into());
    self
  }

  /// Set stdin redirection or not
  pub fn set_stdin(mut self, path: Option<PathBuf>) -> Self {
    self.stdin = path;
    self
  }

  /// Pass env
  pub fn env<KS: Into<String>, VS: Into<String>>(mut self, key: KS, value: VS) -> Self {
    self.env.push((key.into(), value.into()));
    self
  }

  /// Limits enforced elsewhere, echoed into the result for reporting
  pub fn limits(mut self, limits: ResourceLimits) -> Self {
    self.limits = Some(limits);
    self
  }

  pub fn label_str(&self) -> &str {
    &self.label
  }

  pub fn stage_kind(&self) -> Stage {
    self.stage
  }

  pub fn program(&self) -> &str {
    &self.program
  }

  pub fn arguments(&self) -> &Vec<String> {
    &self.arguments
  }

  pub fn working_dir(&self) -> &Path {
    &self.cwd
  }

  pub fn timeout(&self) -> Duration {
    self.deadline
  }

  fn command_line(&self) -> String {
    [vec![self.program.clone()], self.arguments.clone()].concat().join(" ")
  }

  fn prepare(&self) -> Result<Prepared> {
    let program = into_c_string(&self.program)?;
    let cwd = into_c_string(&self.cwd)?;
    let mut argv = vec![program.clone()];
    for argument in self.arguments.iter() {
      argv.push(into_c_string(argument)?);
    }
    let mut envp = vec![];
    for (key, value) in self.env.iter() {
      envp.push(into_c_string(format!("{}={}", key, value))?);
    }

    let argv_ptrs = argv
      .iter()
      .map(|arg| arg.as_ptr())
      .chain(Some(ptr::null()))
      .collect::<Vec<*const c_char>>();
    let envp_ptrs = envp
      .iter()
      .map(|pair| pair.as_ptr())
      .chain(Some(ptr::null()))
      .collect::<Vec<*const c_char>>();

    Ok(Prepared {
      program,
      cwd,
      _argv: argv,
      _envp: envp,
      argv_ptrs,
      envp_ptrs,
    })
  }
}

impl Outcome {
  pub fn is_success(&self) -> bool {
    matches!(self, Outcome::Success)
  }

  pub fn is_timed_out(&self) -> bool {
    matches!(self, Outcome::TimedOut)
  }

  /// Short machine-readable name
  pub fn name(&self) -> &'static str {
    match self {
      Outcome::Success => "success",
      Outcome::Exited(_) => "exited",
      Outcome::Signaled(_) => "signaled",
      Outcome::TimedOut => "timed_out",
      Outcome::LaunchError(_) => "launch_error",
      Outcome::SupervisorError(_) => "supervisor_error",
    }
  }
}

impl Display for Outcome {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Outcome::Success => f.write_str("exit status 0"),
      Outcome::Exited(code) => f.write_fmt(format_args!("exit status {}", code)),
      Outcome::Signaled(signal) => f.write_fmt(format_args!("signal: {}", signal)),
      Outcome::TimedOut => f.write_str("signal: killed (deadline exceeded)"),
      Outcome::LaunchError(msg) => f.write_fmt(format_args!("launch error: {}", msg)),
      Outcome::SupervisorError(msg) => f.write_fmt(format_args!("supervisor error: {}", msg)),
    }
  }
}

impl ExecutionResult {
  pub(crate) fn new(outcome: Outcome, stdout: Vec<u8>, stderr: Vec<u8>, duration: Duration) -> Self {
    ExecutionResult {
      outcome,
      stdout,
      stderr,
      stdout_truncated: false,
      stderr_truncated: false,
      output_detached: false,
      duration,
      limits: None,
    }
  }

  fn failed(outcome: Outcome, limits: Option<ResourceLimits>) -> Self {
    let mut result = ExecutionResult::new(outcome, vec![], vec![], Duration::ZERO);
    result.limits = limits;
    result
  }

  pub fn outcome(&self) -> &Outcome {
    &self.outcome
  }

  pub fn stdout(&self) -> &[u8] {
    &self.stdout
  }

  pub fn stderr(&self) -> &[u8] {
    &self.stderr
  }

  pub fn stdout_text(&self) -> String {
    String::from_utf8_lossy(&self.stdout).to_string()
  }

  pub fn stderr_text(&self) -> String {
    String::from_utf8_lossy(&self.stderr).to_string()
  }

  pub fn stdout_truncated(&self) -> bool {
    self.stdout_truncated
  }

  pub fn stderr_truncated(&self) -> bool {
    self.stderr_truncated
  }

  /// Capture stopped while some process outside the group (one that called
  /// `setsid`, say) still held stdout or stderr open.
  pub fn output_detached(&self) -> bool {
    self.output_detached
  }

  /// Wall time from release of the child until output capture finished.
  pub fn duration(&self) -> Duration {
    self.duration
  }

  pub fn limits(&self) -> &Option<ResourceLimits> {
    &self.limits
  }

  /// A deadline kill that left no diagnostics behind.
  pub fn is_silent_timeout(&self) -> bool {
    self.outcome.is_timed_out() && self.stderr.is_empty()
  }
}

impl Supervisor {
  pub fn new(reporter: Arc<dyn AnomalyReporter>) -> Self {
    Supervisor {
      reporter,
      capture_limit: DEFAULT_CAPTURE_LIMIT,
    }
  }

  /// Set the per-stream capture ceiling (unit: bytes)
  pub fn capture_limit(mut self, bytes: usize) -> Self {
    self.capture_limit = bytes;
    self
  }

  pub fn reporter(&self) -> &Arc<dyn AnomalyReporter> {
    &self.reporter
  }

  pub fn run(&self, request: &ExecutionRequest) -> ExecutionResult {
    self.run_with(request, &NoHooks)
  }

  /// Run `request`, letting `hooks` constrain the child before it execs.
  pub fn run_with(&self, request: &ExecutionRequest, hooks: &dyn LaunchHooks) -> ExecutionResult {
    info!(
      "Start running {} ({}) with deadline {} ms",
      request.label,
      request.command_line(),
      request.deadline.as_millis()
    );

    let result = match self.launch(request, hooks) {
      Ok(result) => result,
      Err(failure) => {
        error!("Run {} fails before supervision: {}", request.label, failure);
        ExecutionResult::failed(failure, request.limits)
      }
    };

    info!(
      "Run {} finished: {} in {} ms",
      request.label,
      result.outcome,
      result.duration.as_millis()
    );

    if result.is_silent_timeout() {
      warn!(
        "Run {} hit its deadline without any diagnostics, escalating",
        request.label
      );
      self.reporter.notify(Anomaly::new(
        request.stage.anomaly_category(),
        &request.cwd,
        &request.program,
      ));
    }

    result
  }

  fn launch(&self, request: &ExecutionRequest, hooks: &dyn LaunchHooks) -> std::result::Result<ExecutionResult, Outcome> {
    let prepared = request
      .prepare()
      .map_err(|err| Outcome::LaunchError(err.to_string()))?;
    let stdin = open_stdin(&request.stdin).map_err(|err| Outcome::LaunchError(err.to_string()))?;

    let pipes = (|| -> Result<_> {
      Ok((
        JusticePipe::new()?,
        JusticePipe::new()?,
        JusticePipe::new()?,
        JusticePipe::new()?,
      ))
    })();
    let (stdout_pipe, stderr_pipe, hold_pipe, report_pipe) = match pipes {
      Ok(pipes) => pipes,
      Err(err) => {
        let _ = close(stdin);
        return Err(Outcome::SupervisorError(err.to_string()));
      }
    };

    match unsafe { fork() } {
      Ok(ForkResult::Parent { child, .. }) => {
        debug!("Forked child process #{} for {}", child, request.label);
        let _ = close(stdin);
        self.supervise(request, hooks, child, stdout_pipe, stderr_pipe, hold_pipe, report_pipe)
      }
      Ok(ForkResult::Child) => {
        child_main(&prepared, stdin, stdout_pipe, stderr_pipe, hold_pipe, report_pipe, hooks);
      }
      Err(errno) => {
        let _ = close(stdin);
        Err(Outcome::SupervisorError(format!("fork: {}", errno)))
      }
    }
  }

  #[allow(clippy::too_many_arguments)]
  fn supervise(
    &self,
    request: &ExecutionRequest,
    hooks: &dyn LaunchHooks,
    child: Pid,
    stdout_pipe: JusticePipe,
    stderr_pipe: JusticePipe,
    hold_pipe: JusticePipe,
    report_pipe: JusticePipe,
  ) -> std::result::Result<ExecutionResult, Outcome> {
    // the child does the same; whoever runs first wins, so a loss is harmless
    let _ = setpgid(child, child);

    let ends = (|| -> Result<_> {
      Ok((
        stdout_pipe.output_reader()?,
        stderr_pipe.output_reader()?,
        hold_pipe.sync_writer()?,
        report_pipe.report_reader()?,
      ))
    })();
    let (stdout, stderr, hold, report) = match ends {
      Ok(ends) => ends,
      Err(err) => {
        abort_child(child);
        return Err(Outcome::SupervisorError(err.to_string()));
      }
    };

    if let Err(err) = hooks.attach(child) {
      error!("Attach child process #{} fails: {}", child, err);
      abort_child(child);
      return Err(Outcome::SupervisorError(err.to_string()));
    }

    let capture_limit = self.capture_limit;
    let deadline = request.deadline;
    let fired = AtomicBool::new(false);
    let draining = AtomicBool::new(false);

    thread::scope(|scope| {
      let draining_flag = &draining;
      let stdout_capture = scope.spawn(move || capture(stdout, capture_limit, draining_flag));
      let stderr_capture = scope.spawn(move || capture(stderr, capture_limit, draining_flag));

      let started = Instant::now();
      if let Err(err) = hold.release() {
        error!("Release child process #{} fails: {}", child, err);
      }

      let (disarm, armed) = mpsc::channel::<()>();
      let fired_flag = &fired;
      let watchdog = scope.spawn(move || {
        if let Err(RecvTimeoutError::Timeout) = armed.recv_timeout(deadline) {
          fired_flag.store(true, Ordering::SeqCst);
          info!(
            "Child process #{} hit the deadline of {} ms, killing its process group",
            child,
            deadline.as_millis()
          );
          kill_group(child);
          hooks.terminate();
        }
      });

      let report = match report.read() {
        Ok(report) => report,
        Err(err) => Some(ChildReport::Setup(format!("read child report: {}", err))),
      };
      let exited = wait_exited(child);

      // fails only if the watchdog already fired and returned
      let _ = disarm.send(());
      // the watchdog does not panic
      let _ = watchdog.join();

      // leftovers of the group: the unreaped leader keeps the group id pinned
      kill_group(child);
      hooks.terminate();

      let status = match exited {
        Ok(_) => reap(child),
        Err(errno) => Err(errno),
      };

      // whatever still holds the pipes now escaped the group
      draining.store(true, Ordering::SeqCst);
      let stdout = stdout_capture.join().unwrap_or_default();
      let stderr = stderr_capture.join().unwrap_or_default();
      let duration = started.elapsed();

      let outcome = match status {
        Ok(exit) => classify(report, exit, fired.load(Ordering::SeqCst)),
        Err(errno) => Outcome::SupervisorError(format!("wait for #{}: {}", child, errno)),
      };
      if stdout.truncated || stderr.truncated {
        warn!(
          "Output of {} truncated at {} bytes (stdout: {}, stderr: {})",
          request.label, capture_limit, stdout.truncated, stderr.truncated
        );
      }
      let output_detached = stdout.detached || stderr.detached;
      if output_detached {
        warn!(
          "Output of {} is still held open outside its process group, stopped capturing after {} ms",
          request.label,
          DRAIN_GRACE.as_millis()
        );
      }

      Ok(ExecutionResult {
        outcome,
        stdout: stdout.bytes,
        stderr: stderr.bytes,
        stdout_truncated: stdout.truncated,
        stderr_truncated: stderr.truncated,
        output_detached,
        duration,
        limits: request.limits,
      })
    })
  }
}

fn child_main(
  prepared: &Prepared,
  stdin: RawFd,
  stdout_pipe: JusticePipe,
  stderr_pipe: JusticePipe,
  hold_pipe: JusticePipe,
  report_pipe: JusticePipe,
  hooks: &dyn LaunchHooks,
) -> ! {
  // no logging from here on: the logger's locks may be held by a parent thread
  let report = match report_pipe.report_writer() {
    Ok(report) => report,
    Err(_) => unsafe { libc::_exit(EXIT_SETUP_FAILURE) },
  };

  let ready = (|| -> Result<SyncReader> {
    setpgid(Pid::from_raw(0), Pid::from_raw(0))?;
    reset_signals()?;
    let stdout = stdout_pipe.output_writer()?;
    let stderr = stderr_pipe.output_writer()?;
    dup2(stdin, libc::STDIN_FILENO)?;
    dup2(stdout, libc::STDOUT_FILENO)?;
    dup2(stderr, libc::STDERR_FILENO)?;
    hold_pipe.sync_reader()
  })();
  let hold = match ready {
    Ok(hold) => hold,
    Err(err) => {
      report.setup(&format!("prepare child: {}", err));
      unsafe { libc::_exit(EXIT_SETUP_FAILURE) };
    }
  };

  if !hold.wait() {
    report.setup("supervisor never released the child");
    unsafe { libc::_exit(EXIT_SETUP_FAILURE) };
  }
  drop(hold);

  if let Err(err) = hooks.enter(&report) {
    report.setup(&err.to_string());
    unsafe { libc::_exit(EXIT_SETUP_FAILURE) };
  }

  if let Err(errno) = chdir(prepared.cwd.as_c_str()) {
    report.exec(&format!(
      "chdir {}: {}",
      prepared.cwd.to_string_lossy(),
      errno
    ));
    unsafe { libc::_exit(EXIT_EXEC_FAILURE) };
  }

  unsafe {
    libc::execvpe(
      prepared.program.as_ptr(),
      prepared.argv_ptrs.as_ptr(),
      prepared.envp_ptrs.as_ptr(),
    )
  };
  let errno = Errno::last();
  report.exec(&format!(
    "execvpe {}: {}",
    prepared.program.to_string_lossy(),
    errno.desc()
  ));
  unsafe { libc::_exit(EXIT_EXEC_FAILURE) };
}

/// Undo what the supervisor process may have changed: Rust ignores SIGPIPE
/// and threads may block signals.
fn reset_signals() -> Result<()> {
  unsafe { signal::signal(Signal::SIGPIPE, SigHandler::SigDfl) }?;
  signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None)?;
  Ok(())
}

fn open_stdin(path: &Option<PathBuf>) -> Result<RawFd> {
  let path = path.clone().unwrap_or(PathBuf::from("/dev/null"));
  open(&path, OFlag::O_RDONLY | OFlag::O_CLOEXEC, Mode::empty())
    .map_err(|errno| JusticeError::exec(format!("open stdin {}: {}", path.display(), errno)))
}

/// Read `reader` until EOF, keeping at most `limit` bytes. Once `draining`
/// is set, reading goes on for at most [`DRAIN_GRACE`].
fn capture(mut reader: File, limit: usize, draining: &AtomicBool) -> Capture {
  let mut bytes = vec![];
  let mut truncated = false;
  let mut buf = [0u8; 8192];
  let mut give_up_at: Option<Instant> = None;
  loop {
    if give_up_at.is_none() && draining.load(Ordering::SeqCst) {
      give_up_at = Some(Instant::now() + DRAIN_GRACE);
    }
    if matches!(give_up_at, Some(at) if Instant::now() >= at) {
      return Capture {
        bytes,
        truncated,
        detached: true,
      };
    }

    let mut fds = [PollFd::new(reader.as_raw_fd(), PollFlags::POLLIN)];
    match poll(&mut fds, POLL_INTERVAL_MS) {
      Ok(0) | Err(Errno::EINTR) => continue,
      Ok(_) => {}
      Err(errno) => {
        warn!("Poll output fails: {}", errno);
        break;
      }
    }

    match reader.read(&mut buf) {
      Ok(0) => break,
      Ok(size) => {
        let room = limit.saturating_sub(bytes.len());
        if size > room {
          truncated = true;
        }
        bytes.extend_from_slice(&buf[..size.min(room)]);
      }
      Err(err) if err.kind() == ErrorKind::Interrupted => continue,
      Err(err) => {
        warn!("Capture output fails: {}", err);
        break;
      }
    }
  }
  Capture {
    bytes,
    truncated,
    detached: false,
  }
}

fn kill_group(leader: Pid) {
  match killpg(leader, Signal::SIGKILL) {
    Ok(_) | Err(Errno::ESRCH) => {}
    Err(errno) => warn!("Kill process group #{} fails: {}", leader, errno),
  }
}

fn abort_child(child: Pid) {
  kill_group(child);
  let _ = waitpid(child, None);
}

/// Block until `pid` exits, leaving it unreaped so its pid and process group
/// id cannot be recycled yet.
fn wait_exited(pid: Pid) -> std::result::Result<(), Errno> {
  loop {
    let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
    let ret = unsafe {
      libc::waitid(
        libc::P_PID,
        pid.as_raw() as libc::id_t,
        &mut info,
        libc::WEXITED | libc::WNOWAIT,
      )
    };
    if ret == 0 {
      return Ok(());
    }
    match Errno::last() {
      Errno::EINTR => continue,
      errno => return Err(errno),
    }
  }
}

fn reap(pid: Pid) -> std::result::Result<Exit, Errno> {
  loop {
    match waitpid(pid, None)? {
      WaitStatus::Exited(pid, status) => {
        info!("Child process #{} exited with status {}", pid, status);
        return Ok(Exit::Code(status));
      }
      WaitStatus::Signaled(pid, signal, _) => {
        info!("Child process #{} is signaled by {}", pid, signal);
        return Ok(Exit::Signal(signal));
      }
      _ => continue,
    }
  }
}

fn classify(report: Option<ChildReport>, exit: Exit, fired: bool) -> Outcome {
  match report {
    Some(ChildReport::Setup(msg)) => return Outcome::SupervisorError(msg),
    Some(ChildReport::Exec(msg)) => return Outcome::LaunchError(msg),
    None => {}
  }
  match exit {
    Exit::Signal(Signal::SIGKILL) if fired => Outcome::TimedOut,
    Exit::Code(0) => Outcome::Success,
    Exit::Code(code) => Outcome::Exited(code),
    Exit::Signal(signal) => Outcome::Signaled(signal),
  }
}
