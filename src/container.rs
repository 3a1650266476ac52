use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{close, fork, ForkResult, Pid};

use crate::cgroup::{ContainerId, ResourceGroupManager, ResourceLimits, ResourceUsage};
use crate::error::{JusticeError, Result};
use crate::namespace::{isolate_new_root, NamespaceContext, NewRoot};
use crate::supervisor::LaunchHooks;
use crate::utils::ReportWriter;

/// One sandbox instance: a set of resource groups plus fresh namespaces and
/// an optional root filesystem.
pub struct Container<'a> {
  id: ContainerId,
  limits: ResourceLimits,
  groups: &'a ResourceGroupManager,
  root: Option<std::result::Result<NewRoot, String>>,
  created: AtomicBool,
}

impl<'a> Container<'a> {
  pub fn new(id: ContainerId, limits: ResourceLimits, groups: &'a ResourceGroupManager) -> Self {
    Container {
      id,
      limits,
      groups,
      root: None,
      created: AtomicBool::new(false),
    }
  }

  /// Set the directory that becomes `/` inside the container. It is checked
  /// here, before any fork; a bad root fails the run at attach time.
  pub fn root<P: Into<PathBuf>>(mut self, path: P) -> Self {
    let path = path.into();
    self.root = Some(NewRoot::new(&path).map_err(|err| err.to_string()));
    self
  }

  pub fn id(&self) -> &ContainerId {
    &self.id
  }

  pub fn limits(&self) -> &ResourceLimits {
    &self.limits
  }

  pub fn usage(&self) -> ResourceUsage {
    self.groups.usage(&self.id)
  }

  /// Whether this container created its groups (and may remove them).
  pub fn owns_groups(&self) -> bool {
    self.created.load(Ordering::SeqCst)
  }

  /// Remove the groups. Fails while any task is still inside, or when the
  /// groups belong to another instance with the same id.
  pub fn release(&self) -> Result<()> {
    if !self.owns_groups() {
      return Err(JusticeError::cgroup(format!(
        "container {} did not create its groups",
        self.id
      )));
    }
    self.groups.release_limits(&self.id)
  }

  /// Release the groups if this container created them, otherwise there is
  /// nothing to clean up.
  pub fn release_owned(&self) -> Result<()> {
    if self.owns_groups() {
      self.release()
    } else {
      Ok(())
    }
  }
}

impl LaunchHooks for Container<'_> {
  fn attach(&self, child: Pid) -> Result<()> {
    if let Some(Err(msg)) = &self.root {
      return Err(JusticeError::invalid_root(msg.clone()));
    }
    if self.groups.contains(&self.id) {
      return Err(JusticeError::cgroup(format!(
        "container {} is already in use",
        self.id
      )));
    }
    self.created.store(true, Ordering::SeqCst);
    self.groups.apply_limits(child, &self.id, &self.limits)
  }

  // Runs in the forked child. Paths were resolved in `root`, so only error
  // paths allocate here.
  fn enter(&self, report: &ReportWriter) -> Result<()> {
    let context = NamespaceContext::unshare()?;

    // the caller only moves into the new pid namespace through its children
    match unsafe { fork() } {
      Ok(ForkResult::Child) => {
        if let Some(Ok(root)) = &self.root {
          isolate_new_root(&context, root)?;
        }
        Ok(())
      }
      Ok(ForkResult::Parent { child, .. }) => mirror(child, report),
      Err(errno) => Err(JusticeError::fork(format!("fork namespace init: {}", errno))),
    }
  }

  fn terminate(&self) {
    let killed = self.groups.kill_all(&self.id);
    if killed > 0 {
      debug!("Killed {} tasks left in container {}", killed, self.id);
    }
  }
}

/// Wait for the namespace init and leave the same way it did, so the
/// supervisor sees the payload's status on the process it forked.
fn mirror(child: Pid, report: &ReportWriter) -> ! {
  for fd in [
    libc::STDIN_FILENO,
    libc::STDOUT_FILENO,
    libc::STDERR_FILENO,
    report.as_raw_fd(),
  ] {
    let _ = close(fd);
  }

  loop {
    match waitpid(child, None) {
      Ok(WaitStatus::Exited(_, code)) => unsafe { libc::_exit(code) },
      Ok(WaitStatus::Signaled(_, signal, _)) => exit_by(signal),
      Ok(_) | Err(Errno::EINTR) => continue,
      Err(_) => unsafe { libc::_exit(libc::EXIT_FAILURE) },
    }
  }
}

fn exit_by(signal: Signal) -> ! {
  unsafe {
    let _ = signal::signal(signal, SigHandler::SigDfl);
  }
  let _ = signal::raise(signal);
  unsafe { libc::_exit(128 + signal as i32) }
}
