use std::process::Command;
use std::time::Duration;

use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tempfile::tempdir;

use justice::{
  Container, ContainerId, ExecutionRequest, JusticeError, LaunchHooks, Outcome, ResourceLimits,
  Verdict, VerdictCodes,
};

mod common;

fn container_id(name: &str) -> ContainerId {
  ContainerId::new(format!("justice-test-{}-{}", name, std::process::id())).unwrap()
}

#[test]
fn it_should_stop_fork_bomb() {
  common::setup();
  let groups = match common::container_host() {
    Some(groups) => groups,
    None => return,
  };
  let dir = tempdir().unwrap();
  let executable = match common::build_fixture("fork_bomb.c", dir.path(), false) {
    Some(executable) => executable,
    None => return,
  };
  let (supervisor, _) = common::supervisor();

  let container = Container::new(container_id("fork-bomb"), ResourceLimits::new(64), &groups);
  let request = ExecutionRequest::new(executable.to_string_lossy(), Vec::<String>::new())
    .cwd(dir.path())
    .timeout_ms(1000);
  let result = supervisor.run_with(&request, &container);
  let usage = container.usage();
  container.release().unwrap();

  assert!(usage.exceeded_processes());
  let verdict = Verdict::new(&result, &usage, &VerdictCodes::default());
  assert_eq!(verdict.status(), VerdictCodes::default().resource_violation);
  assert_eq!(verdict.result(), "Runtime Error");
  assert!(!groups.contains(container.id()));
}

#[test]
fn it_should_kill_at_memory_ceiling() {
  common::setup();
  let groups = match common::container_host() {
    Some(groups) => groups,
    None => return,
  };
  let dir = tempdir().unwrap();
  let executable = match common::build_fixture("memory_allocation.c", dir.path(), false) {
    Some(executable) => executable,
    None => return,
  };
  let (supervisor, _) = common::supervisor();

  let container = Container::new(container_id("memory"), ResourceLimits::new(8), &groups);
  let request = ExecutionRequest::new(executable.to_string_lossy(), Vec::<String>::new())
    .cwd(dir.path())
    .timeout_ms(5000);
  let result = supervisor.run_with(&request, &container);
  let usage = container.usage();
  container.release().unwrap();

  // the OOM killer fires before malloc ever returns NULL
  assert_eq!(result.outcome(), &Outcome::Signaled(Signal::SIGKILL));
  assert!(usage.exceeded_memory());
  assert!(usage.memory_failcnt > 0);
  let verdict = Verdict::new(&result, &usage, &VerdictCodes::default());
  assert_eq!(verdict.status(), VerdictCodes::default().resource_violation);
  assert_eq!(verdict.result(), "Runtime Error");
}

#[test]
fn it_should_stop_infinite_loop() {
  common::setup();
  let groups = match common::container_host() {
    Some(groups) => groups,
    None => return,
  };
  let dir = tempdir().unwrap();
  let executable = match common::build_fixture("infinite_loop.c", dir.path(), false) {
    Some(executable) => executable,
    None => return,
  };
  let (supervisor, reporter) = common::supervisor();

  let container = Container::new(container_id("loop"), ResourceLimits::default(), &groups);
  let request = ExecutionRequest::new(executable.to_string_lossy(), Vec::<String>::new())
    .cwd(dir.path())
    .timeout_ms(1000);
  let result = supervisor.run_with(&request, &container);
  let usage = container.usage();
  container.release().unwrap();

  assert_eq!(result.outcome(), &Outcome::TimedOut);
  assert!(result.duration() < Duration::from_secs(3));
  assert!(!usage.exceeded_processes());
  assert!(!usage.exceeded_memory());
  let verdict = Verdict::new(&result, &usage, &VerdictCodes::default());
  assert_eq!(verdict.status(), VerdictCodes::default().runtime_error);
  assert_eq!(reporter.anomalies().len(), 1);
}

#[test]
fn it_should_time_out_inside_container() {
  common::setup();
  let groups = match common::container_host() {
    Some(groups) => groups,
    None => return,
  };
  let (supervisor, reporter) = common::supervisor();

  let container = Container::new(container_id("sleep"), ResourceLimits::default(), &groups);
  let request = ExecutionRequest::new("sleep", vec!["5"]).timeout_ms(1000);
  let result = supervisor.run_with(&request, &container);
  container.release().unwrap();

  assert_eq!(result.outcome(), &Outcome::TimedOut);
  assert!(result.stderr().is_empty());
  assert!(result.duration() < Duration::from_secs(3));
  assert_eq!(reporter.anomalies().len(), 1);
}

#[test]
fn it_should_run_in_new_root() {
  common::setup();
  let groups = match common::container_host() {
    Some(groups) => groups,
    None => return,
  };
  let rootfs = tempdir().unwrap();
  if common::build_fixture("hello.c", rootfs.path(), true).is_none() {
    return;
  }
  let (supervisor, _) = common::supervisor();

  let container = Container::new(container_id("rootfs"), ResourceLimits::default(), &groups)
    .root(rootfs.path());
  let request = ExecutionRequest::new("/Main", Vec::<String>::new())
    .cwd("/")
    .timeout_ms(5000);
  let result = supervisor.run_with(&request, &container);
  container.release().unwrap();

  assert_eq!(result.outcome(), &Outcome::Success);
  assert_eq!(result.stdout_text(), "hello\n");
  // the staging dir is gone and the host is untouched
  assert!(!rootfs.path().join(".pivot_root").exists());
  assert!(!justice::is_isolated());
}

#[test]
fn it_should_refuse_release_while_tasks_live() {
  common::setup();
  let groups = match common::container_host() {
    Some(groups) => groups,
    None => return,
  };
  let id = container_id("release");

  let mut child = Command::new("sleep").arg("30").spawn().unwrap();
  let pid = Pid::from_raw(child.id() as i32);
  groups
    .apply_limits(pid, &id, &ResourceLimits::default())
    .unwrap();

  // a second instance with the same id must not take over
  assert!(groups
    .apply_limits(pid, &id, &ResourceLimits::default())
    .is_err());
  assert!(groups.release_limits(&id).is_err());
  assert!(groups.contains(&id));

  child.kill().unwrap();
  child.wait().unwrap();

  groups.release_limits(&id).unwrap();
  assert!(!groups.contains(&id));
  assert!(!groups.roots().pids.join(id.as_str()).exists());
}

#[test]
fn it_should_surface_failed_release() {
  common::setup();
  let groups = match common::container_host() {
    Some(groups) => groups,
    None => return,
  };

  // nothing was created, so there is nothing to release
  let idle = Container::new(container_id("idle"), ResourceLimits::default(), &groups);
  assert!(idle.release_owned().is_ok());
  assert!(idle.release().is_err());

  let container = Container::new(container_id("leak"), ResourceLimits::default(), &groups);
  let mut child = Command::new("sleep").arg("30").spawn().unwrap();
  container
    .attach(Pid::from_raw(child.id() as i32))
    .unwrap();
  assert!(container.owns_groups());

  // a live task pins the groups, and the error has to reach the caller
  assert!(matches!(container.release_owned(), Err(JusticeError::Cgroup(_))));
  assert!(groups.contains(container.id()));

  child.kill().unwrap();
  child.wait().unwrap();
  container.release_owned().unwrap();
  assert!(!groups.contains(container.id()));
}

#[test]
fn it_should_check_root_before_launch() {
  common::setup();
  let groups = match common::container_host() {
    Some(groups) => groups,
    None => return,
  };
  let (supervisor, _) = common::supervisor();

  let container = Container::new(container_id("bad-root"), ResourceLimits::default(), &groups)
    .root("/definitely/not/here");
  let request = ExecutionRequest::new("/Main", Vec::<String>::new()).timeout_ms(1000);
  let result = supervisor.run_with(&request, &container);

  assert!(matches!(result.outcome(), Outcome::SupervisorError(msg) if msg.contains("not a directory")));
  assert!(!container.owns_groups());
  assert!(!groups.contains(container.id()));
}
