use std::env;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use cgroups_rs::cpu::CpuController;
use cgroups_rs::memory::MemController;
use cgroups_rs::pid::PidController;
use cgroups_rs::{hierarchies, Cgroup, CgroupPid, Controller, Hierarchy, MaxValue, Subsystem};
use log::{debug, error, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::Serialize;

use crate::error::{JusticeError, Result};

pub const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";

const CONTROLLERS: [&str; 3] = ["cpu", "pids", "memory"];

/// Name of one submission's sandbox instance, used as the group directory
/// under every controller root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(String);

/// CPU share, process ceiling and memory ceiling of one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceLimits {
  cpu_quota_us: u64,
  cpu_period_us: u64,
  max_processes: u64,
  memory_mb: u64,
}

/// Mount points of the cgroup v1 controllers. Also serves as the hierarchy
/// every container group is loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerRoots {
  pub cpu: PathBuf,
  pub pids: PathBuf,
  pub memory: PathBuf,
}

/// Counters read back from a container's groups after its run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResourceUsage {
  /// Forks rejected because `pids.max` was reached
  pub fork_rejections: u64,
  pub memory_failcnt: u64,
  pub oom_kills: u64,
  pub memory_peak_bytes: u64,
}

/// Owns every group directory keyed by a [`ContainerId`].
#[derive(Debug, Clone)]
pub struct ResourceGroupManager {
  roots: ControllerRoots,
}

impl ContainerId {
  pub fn new<S: Into<String>>(id: S) -> Result<Self> {
    let id: String = id.into();
    if id.is_empty() || id == "." || id == ".." || id.contains('/') || id.contains('\0') {
      return Err(JusticeError::cgroup(format!("invalid container id {:?}", id)));
    }
    Ok(ContainerId(id))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl Display for ContainerId {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

impl Default for ResourceLimits {
  fn default() -> Self {
    ResourceLimits {
      cpu_quota_us: 2000,
      cpu_period_us: 100000,
      max_processes: 2,
      memory_mb: 256,
    }
  }
}

impl ResourceLimits {
  /// Reference limits (2% of one core, 2 tasks) with the given memory ceiling.
  pub fn new(memory_mb: u64) -> Self {
    ResourceLimits {
      memory_mb,
      ..Default::default()
    }
  }

  pub fn cpu_quota(mut self, quota_us: u64) -> Self {
    self.cpu_quota_us = quota_us;
    self
  }

  pub fn cpu_period(mut self, period_us: u64) -> Self {
    self.cpu_period_us = period_us;
    self
  }

  pub fn max_processes(mut self, value: u64) -> Self {
    self.max_processes = value;
    self
  }

  pub fn memory_mb(mut self, value: u64) -> Self {
    self.memory_mb = value;
    self
  }

  pub fn cpu_quota_us(&self) -> u64 {
    self.cpu_quota_us
  }

  pub fn cpu_period_us(&self) -> u64 {
    self.cpu_period_us
  }

  /// Fraction of one logical core.
  pub fn cpu_share(&self) -> f64 {
    self.cpu_quota_us as f64 / self.cpu_period_us as f64
  }

  pub fn process_limit(&self) -> u64 {
    self.max_processes
  }

  pub fn memory_limit_mb(&self) -> u64 {
    self.memory_mb
  }

  pub fn memory_bytes(&self) -> u64 {
    self.memory_mb * 1024 * 1024
  }

  pub fn validate(&self) -> Result<()> {
    if self.cpu_quota_us < 1000 {
      return Err(JusticeError::cgroup("cpu quota must be at least 1000us"));
    }
    if !(1000..=1_000_000).contains(&self.cpu_period_us) {
      return Err(JusticeError::cgroup("cpu period must be between 1000us and 1s"));
    }
    if self.max_processes == 0 {
      return Err(JusticeError::cgroup("process limit must be greater than 0"));
    }
    if self.memory_mb == 0 {
      return Err(JusticeError::cgroup("memory limit must be greater than 0"));
    }
    Ok(())
  }
}

impl ControllerRoots {
  pub fn from_base<P: AsRef<Path>>(base: P) -> Self {
    let base = base.as_ref();
    ControllerRoots {
      cpu: base.join("cpu"),
      pids: base.join("pids"),
      memory: base.join("memory"),
    }
  }

  /// `JUSTICE_CGROUP_ROOT` or `/sys/fs/cgroup`
  pub fn from_env() -> Self {
    let base = env::var("JUSTICE_CGROUP_ROOT").unwrap_or(DEFAULT_CGROUP_ROOT.to_string());
    Self::from_base(base)
  }
}

impl ResourceUsage {
  pub fn exceeded_processes(&self) -> bool {
    self.fork_rejections > 0
  }

  pub fn exceeded_memory(&self) -> bool {
    self.oom_kills > 0
  }

  pub fn touched_memory_limit(&self) -> bool {
    self.memory_failcnt > 0 || self.oom_kills > 0
  }
}

impl Hierarchy for ControllerRoots {
  fn subsystems(&self) -> Vec<Subsystem> {
    vec![
      Subsystem::Cpu(CpuController::new(self.cpu.clone(), false)),
      Subsystem::Pid(PidController::new(self.pids.clone(), false)),
      Subsystem::Mem(MemController::new(self.memory.clone(), false)),
    ]
  }

  fn root(&self) -> PathBuf {
    self.cpu.parent().map(Path::to_path_buf).unwrap_or_else(|| self.cpu.clone())
  }

  fn root_control_group(&self) -> Cgroup {
    Cgroup::load(Box::new(self.clone()), "")
  }

  fn parent_control_group(&self, path: &str) -> Cgroup {
    let parent = Path::new(path).parent().unwrap_or(Path::new(""));
    Cgroup::load(Box::new(self.clone()), parent)
  }

  fn v2(&self) -> bool {
    false
  }
}

impl ResourceGroupManager {
  pub fn new(roots: ControllerRoots) -> Self {
    ResourceGroupManager { roots }
  }

  /// Probe the host hierarchy and check that every controller we need is mounted.
  pub fn detect() -> Result<Self> {
    let hierarchy = hierarchies::auto();
    if hierarchy.v2() {
      error!("cgroup v2 unified hierarchy detected");
      return Err(JusticeError::cgroup(
        "cgroup v1 controllers are required, but the host runs a unified cgroup v2 hierarchy",
      ));
    }

    let mounted = hierarchy
      .subsystems()
      .iter()
      .map(|subsystem| subsystem.controller_name())
      .collect::<Vec<String>>();
    let missing = CONTROLLERS
      .iter()
      .filter(|name| !mounted.iter().any(|mounted| mounted == *name))
      .map(|name| name.to_string())
      .collect::<Vec<String>>();
    for name in missing.iter() {
      warn!("cgroup {} is not supported", name);
    }
    if !missing.is_empty() {
      return Err(JusticeError::cgroup(format!(
        "missing cgroup controllers: {}",
        missing.join(", ")
      )));
    }

    let roots = match env::var("JUSTICE_CGROUP_ROOT") {
      Ok(base) => ControllerRoots::from_base(base),
      Err(_) => ControllerRoots::from_base(hierarchy.root()),
    };
    debug!("Detected cgroup controller roots {:?}", roots);
    Ok(ResourceGroupManager { roots })
  }

  pub fn roots(&self) -> &ControllerRoots {
    &self.roots
  }

  /// Handle on the cpu, pids and memory groups of `id`, which may not exist yet.
  fn group(&self, id: &ContainerId) -> Cgroup {
    Cgroup::load(Box::new(self.roots.clone()), id.as_str())
  }

  /// Create the cpu, pids and memory groups of `id`, attach `pid`, then write
  /// the limits. `pid` must not have exec'd the payload yet.
  pub fn apply_limits(&self, pid: Pid, id: &ContainerId, limits: &ResourceLimits) -> Result<()> {
    limits.validate()?;
    info!(
      "Apply limits to #{} in container {} (cpu {}/{}us, {} tasks, {} MB)",
      pid,
      id,
      limits.cpu_quota_us,
      limits.cpu_period_us,
      limits.max_processes,
      limits.memory_mb
    );

    for root in self.controller_roots() {
      if !root.is_dir() {
        return Err(JusticeError::cgroup(format!(
          "controller root {} is not mounted",
          root.display()
        )));
      }
    }

    let cgroup = self.group(id);
    if cgroup.exists() {
      return Err(JusticeError::cgroup(format!(
        "group {} already exists, refusing to reuse it",
        id
      )));
    }
    cgroup.create()?;
    // controllers only warn when mkdir fails
    for subsystem in cgroup.subsystems() {
      let controller = subsystem.to_controller();
      if !controller.exists() {
        return Err(JusticeError::cgroup(format!(
          "create {}",
          controller.path().display()
        )));
      }
      debug!("Create cgroup {}", controller.path().display());
    }
    cgroup.add_task_by_tgid(CgroupPid::from(pid.as_raw() as u64))?;

    // https://www.kernel.org/doc/Documentation/scheduler/sched-bwc.txt
    let cpu: &CpuController = cgroup
      .controller_of()
      .ok_or_else(|| JusticeError::cgroup("cpu controller is missing"))?;
    cpu.set_cfs_period(limits.cpu_period_us)?;
    cpu.set_cfs_quota(limits.cpu_quota_us as i64)?;

    // https://www.kernel.org/doc/Documentation/cgroup-v1/pids.txt
    let pids: &PidController = cgroup
      .controller_of()
      .ok_or_else(|| JusticeError::cgroup("pids controller is missing"))?;
    pids.set_pid_max(MaxValue::Value(limits.max_processes as i64))?;

    // https://www.kernel.org/doc/Documentation/cgroup-v1/memory.txt
    let memory: &MemController = cgroup
      .controller_of()
      .ok_or_else(|| JusticeError::cgroup("memory controller is missing"))?;
    let bytes = limits.memory_bytes() as i64;
    memory.set_limit(bytes)?;
    // no paging out of an over-limit container: the OOM killer has to fire
    memory.set_swappiness(0)?;
    if let Err(err) = memory.set_kmem_limit(bytes) {
      warn!("Kernel memory accounting is not supported, skip: {}", err);
    }

    debug!("Limits of container {} written", id);
    Ok(())
  }

  /// Remove the groups of `id`. A group still holding tasks cannot be removed
  /// and the error is returned after every controller has been tried.
  pub fn release_limits(&self, id: &ContainerId) -> Result<()> {
    let cgroup = self.group(id);
    if !cgroup.exists() {
      return Err(JusticeError::cgroup(format!("no group named {}", id)));
    }

    let mut first_error = None;
    for subsystem in cgroup.subsystems() {
      let controller = subsystem.to_controller();
      // busy groups are retried with backoff before this fails
      match controller.delete() {
        Ok(_) => debug!("Delete created cgroup {}", controller.path().display()),
        Err(err) => {
          error!("Release {} fails: {}", controller.path().display(), err);
          first_error.get_or_insert(JusticeError::from(err));
        }
      }
    }

    match first_error {
      Some(err) => Err(err),
      None => {
        info!("Released limits of container {}", id);
        Ok(())
      }
    }
  }

  /// Whether any controller still has a group for `id`.
  pub fn contains(&self, id: &ContainerId) -> bool {
    self.group(id).exists()
  }

  pub fn usage(&self, id: &ContainerId) -> ResourceUsage {
    let cgroup = self.group(id);
    let mut usage = ResourceUsage::default();

    let pids: Option<&PidController> = cgroup.controller_of();
    if let Some(pids) = pids {
      usage.fork_rejections = pids.get_pid_events().unwrap_or(0);
    }
    let memory: Option<&MemController> = cgroup.controller_of();
    if let Some(memory) = memory {
      let stat = memory.memory_stat();
      usage.memory_failcnt = stat.fail_cnt;
      usage.oom_kills = stat.oom_control.oom_kill;
      usage.memory_peak_bytes = stat.max_usage_in_bytes;
    }

    debug!("Usage of container {}: {:?}", id, usage);
    usage
  }

  /// SIGKILL every task of the container, wherever it sits in the process
  /// tree. Returns the number of tasks signalled.
  pub fn kill_all(&self, id: &ContainerId) -> usize {
    let cgroup = self.group(id);
    let pids: Option<&PidController> = cgroup.controller_of();
    let procs = match pids {
      Some(pids) => pids.procs(),
      None => return 0,
    };

    let mut count = 0;
    for task in procs.iter().filter(|task| task.pid > 0) {
      match kill(Pid::from_raw(task.pid as i32), Signal::SIGKILL) {
        Ok(_) => count += 1,
        Err(Errno::ESRCH) => {}
        Err(errno) => warn!("Kill #{} in container {} fails: {}", task.pid, id, errno),
      }
    }
    if count > 0 {
      debug!("Killed {} tasks of container {}", count, id);
    }
    count
  }

  fn controller_roots(&self) -> [&PathBuf; 3] {
    [&self.roots.cpu, &self.roots.pids, &self.roots.memory]
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;
  use tempfile::tempdir;

  fn fake_roots(base: &Path) -> ControllerRoots {
    let roots = ControllerRoots::from_base(base);
    for root in [&roots.cpu, &roots.pids, &roots.memory] {
      fs::create_dir_all(root).unwrap();
    }
    roots
  }

  #[test]
  fn it_should_reject_bad_container_ids() {
    assert!(ContainerId::new("").is_err());
    assert!(ContainerId::new("..").is_err());
    assert!(ContainerId::new("a/b").is_err());
    assert_eq!(ContainerId::new("sub-42").unwrap().as_str(), "sub-42");
  }

  #[test]
  fn it_should_validate_limits() {
    assert!(ResourceLimits::new(64).validate().is_ok());
    assert!(ResourceLimits::new(0).validate().is_err());
    assert!(ResourceLimits::new(64).max_processes(0).validate().is_err());
    assert!(ResourceLimits::new(64).cpu_quota(10).validate().is_err());
    assert!(ResourceLimits::new(64).cpu_period(10_000_000).validate().is_err());

    let limits = ResourceLimits::new(64);
    assert!((limits.cpu_share() - 0.02).abs() < f64::EPSILON);
    assert_eq!(limits.memory_bytes(), 64 * 1024 * 1024);
  }

  #[test]
  fn it_should_write_limits_to_every_controller() {
    let base = tempdir().unwrap();
    let manager = ResourceGroupManager::new(fake_roots(base.path()));
    let id = ContainerId::new("sub-1").unwrap();

    manager
      .apply_limits(Pid::from_raw(4242), &id, &ResourceLimits::new(64))
      .unwrap();

    let read = |path: PathBuf| fs::read_to_string(path).unwrap();
    let roots = manager.roots();
    assert_eq!(read(roots.cpu.join("sub-1/cgroup.procs")), "4242");
    assert_eq!(read(roots.cpu.join("sub-1/cpu.cfs_period_us")), "100000");
    assert_eq!(read(roots.cpu.join("sub-1/cpu.cfs_quota_us")), "2000");
    assert_eq!(read(roots.pids.join("sub-1/cgroup.procs")), "4242");
    assert_eq!(read(roots.pids.join("sub-1/pids.max")), "2");
    assert_eq!(read(roots.memory.join("sub-1/memory.limit_in_bytes")), "67108864");
    assert_eq!(read(roots.memory.join("sub-1/memory.kmem.limit_in_bytes")), "67108864");
    assert_eq!(read(roots.memory.join("sub-1/memory.swappiness")), "0");
    assert!(manager.contains(&id));
  }

  #[test]
  fn it_should_refuse_stale_group() {
    let base = tempdir().unwrap();
    let roots = fake_roots(base.path());
    fs::create_dir(roots.cpu.join("stale")).unwrap();
    let manager = ResourceGroupManager::new(roots);

    let id = ContainerId::new("stale").unwrap();
    let err = manager
      .apply_limits(Pid::from_raw(1), &id, &ResourceLimits::new(64))
      .unwrap_err();
    assert!(format!("{}", err).contains("already exists"));
  }

  #[test]
  fn it_should_fail_without_controller_root() {
    let base = tempdir().unwrap();
    let manager = ResourceGroupManager::new(ControllerRoots::from_base(base.path()));
    let id = ContainerId::new("sub-2").unwrap();
    assert!(manager
      .apply_limits(Pid::from_raw(1), &id, &ResourceLimits::new(64))
      .is_err());
  }

  #[test]
  fn it_should_release_empty_groups() {
    let base = tempdir().unwrap();
    let roots = fake_roots(base.path());
    for root in [&roots.cpu, &roots.pids, &roots.memory] {
      fs::create_dir(root.join("done")).unwrap();
    }
    let manager = ResourceGroupManager::new(roots);
    let id = ContainerId::new("done").unwrap();

    manager.release_limits(&id).unwrap();
    assert!(!manager.contains(&id));
    assert!(manager.release_limits(&id).is_err());
  }

  #[test]
  fn it_should_surface_busy_group() {
    let base = tempdir().unwrap();
    let roots = fake_roots(base.path());
    for root in [&roots.cpu, &roots.pids, &roots.memory] {
      fs::create_dir(root.join("busy")).unwrap();
    }
    // a regular file keeps the directory non-empty, like a live task does on cgroupfs
    fs::write(roots.pids.join("busy/leak"), "1").unwrap();
    let manager = ResourceGroupManager::new(roots.clone());
    let id = ContainerId::new("busy").unwrap();

    assert!(manager.release_limits(&id).is_err());
    assert!(!roots.cpu.join("busy").exists());
    assert!(roots.pids.join("busy").exists());
  }

  #[test]
  fn it_should_read_usage_counters() {
    let base = tempdir().unwrap();
    let roots = fake_roots(base.path());
    fs::create_dir(roots.pids.join("bomb")).unwrap();
    fs::create_dir(roots.memory.join("bomb")).unwrap();
    fs::write(roots.pids.join("bomb/pids.events"), "max 17\n").unwrap();
    fs::write(roots.memory.join("bomb/memory.failcnt"), "3\n").unwrap();
    fs::write(
      roots.memory.join("bomb/memory.oom_control"),
      "oom_kill_disable 0\nunder_oom 0\noom_kill 1\n",
    )
    .unwrap();
    fs::write(roots.memory.join("bomb/memory.max_usage_in_bytes"), "8388608\n").unwrap();

    let manager = ResourceGroupManager::new(roots);
    let usage = manager.usage(&ContainerId::new("bomb").unwrap());
    assert_eq!(usage.fork_rejections, 17);
    assert_eq!(usage.memory_failcnt, 3);
    assert_eq!(usage.oom_kills, 1);
    assert_eq!(usage.memory_peak_bytes, 8388608);
    assert!(usage.exceeded_processes());
    assert!(usage.exceeded_memory());

    let empty = manager.usage(&ContainerId::new("nothing").unwrap());
    assert_eq!(empty, ResourceUsage::default());
  }

  #[test]
  fn it_should_skip_kill_for_missing_group() {
    let base = tempdir().unwrap();
    let manager = ResourceGroupManager::new(fake_roots(base.path()));
    assert_eq!(manager.kill_all(&ContainerId::new("gone").unwrap()), 0);
  }
}
