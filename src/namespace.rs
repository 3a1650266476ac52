//! One-time root filesystem swap for a container's init process.

use std::fs::{create_dir_all, remove_dir};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use nix::errno::Errno;
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::sched::{unshare, CloneFlags};
use nix::unistd::{chdir, pivot_root, sethostname};
use path_absolutize::Absolutize;

use crate::error::{JusticeError, Result};

/// Hostname every container sees.
pub const SANDBOX_HOSTNAME: &str = "justice";

/// Staging directory for the old root, relative to the new root.
pub const PIVOT_STAGING: &str = ".pivot_root";

const PROC_MOUNT: &str = "/proc";

static ISOLATED: AtomicBool = AtomicBool::new(false);

/// Proof that the current process owns fresh mount, UTS and PID namespaces.
///
/// [`isolate_root`] is irreversible and only safe inside such a process, so
/// it takes this token instead of trusting ambient process state.
#[derive(Debug)]
pub struct NamespaceContext {
  _private: (),
}

impl NamespaceContext {
  /// Enter fresh mount, UTS, IPC, network and PID namespaces and stop mount
  /// events from propagating back to the host.
  ///
  /// Only children forked after this call live in the new PID namespace, so
  /// the caller has to fork once more before running the payload.
  pub fn unshare() -> Result<Self> {
    unshare(
      CloneFlags::CLONE_NEWNS
        | CloneFlags::CLONE_NEWUTS
        | CloneFlags::CLONE_NEWIPC
        | CloneFlags::CLONE_NEWNET
        | CloneFlags::CLONE_NEWPID,
    )
    .map_err(|errno| JusticeError::namespace(format!("unshare: {}", errno)))?;

    mount::<str, str, str, str>(None, "/", None, MsFlags::MS_REC | MsFlags::MS_PRIVATE, None)
      .map_err(|errno| JusticeError::namespace(format!("make / private: {}", errno)))?;

    Ok(NamespaceContext { _private: () })
  }

  /// Trust that the namespaces were entered by someone else (for example
  /// `unshare --mount --uts --pid --fork`).
  ///
  /// # Safety
  ///
  /// Calling [`isolate_root`] with this context outside of fresh namespaces
  /// replaces the root filesystem of the host's mount namespace.
  pub unsafe fn assume_entered() -> Self {
    NamespaceContext { _private: () }
  }
}

/// A checked new root with every path the swap needs, resolved ahead of time
/// so that [`isolate_new_root`] does not allocate in a freshly forked child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoot {
  root: PathBuf,
  put_old: PathBuf,
  detached: PathBuf,
}

impl NewRoot {
  pub fn new(path: &Path) -> Result<Self> {
    let root = checked_root(path)?;
    Ok(NewRoot {
      put_old: root.join(PIVOT_STAGING),
      detached: Path::new("/").join(PIVOT_STAGING),
      root,
    })
  }

  pub fn path(&self) -> &Path {
    &self.root
  }
}

/// Swap the root filesystem of this process to `new_root`, set the sandbox
/// hostname and mount a fresh `/proc`.
///
/// Works at most once per process: a second call fails with
/// [`JusticeError::AlreadyIsolated`] even if the first one failed half-way,
/// because a half-isolated process has to be discarded anyway. Nothing is
/// rolled back on failure.
pub fn isolate_root(context: &NamespaceContext, new_root: &Path) -> Result<()> {
  if ISOLATED.swap(true, Ordering::SeqCst) {
    return Err(JusticeError::AlreadyIsolated);
  }
  let new_root = NewRoot::new(new_root)?;
  enter_root(context, &new_root)
}

/// [`isolate_root`] with a root checked before `fork`. Only error paths
/// allocate.
pub fn isolate_new_root(context: &NamespaceContext, new_root: &NewRoot) -> Result<()> {
  if ISOLATED.swap(true, Ordering::SeqCst) {
    return Err(JusticeError::AlreadyIsolated);
  }
  enter_root(context, new_root)
}

/// Whether this process already went through [`isolate_root`].
pub fn is_isolated() -> bool {
  ISOLATED.load(Ordering::SeqCst)
}

fn enter_root(_context: &NamespaceContext, new_root: &NewRoot) -> Result<()> {
  swap_root(new_root)?;

  sethostname(SANDBOX_HOSTNAME)
    .map_err(|errno| JusticeError::namespace(format!("sethostname: {}", errno)))?;

  mount_proc()?;
  Ok(())
}

fn checked_root(new_root: &Path) -> Result<PathBuf> {
  if !new_root.is_absolute() {
    return Err(JusticeError::invalid_root(format!(
      "new root {} must be an absolute path",
      new_root.display()
    )));
  }
  if !new_root.is_dir() {
    return Err(JusticeError::invalid_root(format!(
      "new root {} is not a directory",
      new_root.display()
    )));
  }
  // drop `.` and `..` so the staging dir is strictly beneath the new root
  let new_root = new_root.absolutize()?.to_path_buf();
  if new_root == Path::new("/") {
    return Err(JusticeError::invalid_root("new root must not be the current root"));
  }
  Ok(new_root)
}

fn swap_root(new_root: &NewRoot) -> Result<()> {
  let NewRoot {
    root,
    put_old,
    detached,
  } = new_root;

  // pivot_root(2) only accepts a mount point as new root
  mount::<Path, Path, str, str>(
    Some(root.as_path()),
    root.as_path(),
    None,
    MsFlags::MS_BIND | MsFlags::MS_REC,
    None,
  )
  .map_err(|errno| JusticeError::namespace(format!("bind {}: {}", root.display(), errno)))?;

  create_dir_all(put_old)?;

  pivot_root(root.as_path(), put_old.as_path()).map_err(|errno| match errno {
    Errno::EINVAL | Errno::EBUSY => JusticeError::invalid_root(format!(
      "pivot_root {} -> {}: {}",
      root.display(),
      put_old.display(),
      errno
    )),
    errno => JusticeError::namespace(format!("pivot_root: {}", errno)),
  })?;

  // the cwd reference is stale after the swap
  chdir("/")?;

  umount2(detached.as_path(), MntFlags::MNT_DETACH)
    .map_err(|errno| JusticeError::namespace(format!("detach old root: {}", errno)))?;
  // empty once the old root is detached
  remove_dir(detached)?;
  Ok(())
}

fn mount_proc() -> Result<()> {
  let target = Path::new(PROC_MOUNT);
  create_dir_all(target)?;
  mount::<str, Path, str, str>(
    Some("proc"),
    target,
    Some("proc"),
    MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC,
    None,
  )
  .map_err(|errno| JusticeError::namespace(format!("mount /proc: {}", errno)))?;
  Ok(())
}
