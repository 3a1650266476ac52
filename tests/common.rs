#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Once};

use flexi_logger::Logger;
use log::info;
use nix::unistd::Uid;

use justice::{MemoryReporter, ResourceGroupManager, Supervisor};

static INIT: Once = Once::new();

pub fn setup() {
  INIT.call_once(|| {
    Logger::try_with_str("justice=debug,info")
      .unwrap()
      .start()
      .unwrap();
  });
}

pub fn supervisor() -> (Supervisor, Arc<MemoryReporter>) {
  let reporter = MemoryReporter::new();
  (Supervisor::new(reporter.clone()), reporter)
}

pub fn is_root() -> bool {
  Uid::effective().is_root()
}

/// The cgroup v1 hierarchy when this host can run containers, logging why not otherwise.
pub fn container_host() -> Option<ResourceGroupManager> {
  if !is_root() {
    info!("Skip: containers need root");
    return None;
  }
  match ResourceGroupManager::detect() {
    Ok(groups) => Some(groups),
    Err(err) => {
      info!("Skip: {}", err);
      None
    }
  }
}

pub fn has_command(command: &str) -> bool {
  let found = Command::new(command)
    .arg("--version")
    .output()
    .map(|output| output.status.success())
    .unwrap_or(false);
  if !found {
    info!("Skip: {} is not installed", command);
  }
  found
}

pub fn has_compiler(compiler: &str) -> bool {
  has_command(compiler)
}

pub fn fixture(name: &str) -> PathBuf {
  Path::new(env!("CARGO_MANIFEST_DIR"))
    .join("fixtures/c")
    .join(name)
}

/// Copy a C fixture into `dir` under its own name.
pub fn copy_fixture(name: &str, dir: &Path) -> PathBuf {
  let target = dir.join(name);
  fs::copy(fixture(name), &target).unwrap();
  target
}

/// Build a C fixture into `dir/Main` with the host compiler.
pub fn build_fixture(name: &str, dir: &Path, link_static: bool) -> Option<PathBuf> {
  let executable = dir.join("Main");
  let mut command = Command::new("gcc");
  command.arg(fixture(name)).arg("-o").arg(&executable);
  if link_static {
    command.arg("-static");
  }
  let output = command.output().ok()?;
  if output.status.success() {
    Some(executable)
  } else {
    info!(
      "Skip: build {} fails: {}",
      name,
      String::from_utf8_lossy(&output.stderr)
    );
    None
  }
}
