pub use cgroup::{ContainerId, ControllerRoots, ResourceGroupManager, ResourceLimits, ResourceUsage};
pub use compile::{compile, CompileReport, CompileRequest};
pub use container::Container;
pub use error::{JusticeError, JusticeExit, Result};
pub use namespace::{is_isolated, isolate_new_root, isolate_root, NamespaceContext, NewRoot};
pub use preset::{detect_language, find_preset, LanguagePreset};
pub use report::{Anomaly, AnomalyReporter, LogReporter, MemoryReporter, SentryReporter};
pub use supervisor::{
  ExecutionRequest, ExecutionResult, LaunchHooks, NoHooks, Outcome, Stage, Supervisor,
};
pub use utils::{default_format, parse_env};
pub use verdict::{Verdict, VerdictCodes};

mod cgroup;
mod compile;
mod container;
mod error;
mod namespace;
mod preset;
mod report;
mod supervisor;
mod utils;
mod verdict;
