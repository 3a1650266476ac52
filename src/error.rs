use std::{
  error::Error,
  fmt::{Debug, Display},
  process::{ExitCode, Termination},
};

use flexi_logger::FlexiLoggerError;
use nix::{errno::Errno, libc::STDOUT_FILENO, unistd::isatty};

pub type Result<T> = std::result::Result<T, JusticeError>;

pub enum JusticeError {
  InvalidRoot(String),
  AlreadyIsolated,
  Namespace(String),
  Cgroup(String),
  Fork(String),
  Exec(String),
  Nix(Errno),
  Fs(String),
  Cli(String),
  Config(String),
  Report(String),
  Logger(FlexiLoggerError),
}

pub enum JusticeExit {
  Ok,
  Err(JusticeError),
}

impl JusticeError {
  pub fn invalid_root<MS: Into<String>>(msg: MS) -> JusticeError {
    JusticeError::InvalidRoot(msg.into())
  }

  pub fn namespace<MS: Into<String>>(msg: MS) -> JusticeError {
    JusticeError::Namespace(msg.into())
  }

  pub fn cgroup<MS: Into<String>>(msg: MS) -> JusticeError {
    JusticeError::Cgroup(msg.into())
  }

  pub fn fork<MS: Into<String>>(msg: MS) -> JusticeError {
    JusticeError::Fork(msg.into())
  }

  pub fn exec<MS: Into<String>>(msg: MS) -> JusticeError {
    JusticeError::Exec(msg.into())
  }

  pub fn fs<MS: Into<String>>(msg: MS) -> JusticeError {
    JusticeError::Fs(msg.into())
  }

  pub fn cli<MS: Into<String>>(msg: MS) -> JusticeError {
    JusticeError::Cli(msg.into())
  }

  pub fn config<MS: Into<String>>(msg: MS) -> JusticeError {
    JusticeError::Config(msg.into())
  }

  pub fn report<MS: Into<String>>(msg: MS) -> JusticeError {
    JusticeError::Report(msg.into())
  }
}

impl Debug for JusticeError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    std::fmt::Display::fmt(&self, f)
  }
}

impl Display for JusticeError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match &self {
      JusticeError::InvalidRoot(msg) => f.write_fmt(format_args!("Justice Invalid Root Error: {}", msg)),
      JusticeError::AlreadyIsolated => f.write_str("Justice Namespace Error: root filesystem has already been swapped in this process"),
      JusticeError::Namespace(msg) => f.write_fmt(format_args!("Justice Namespace Error: {}", msg)),
      JusticeError::Cgroup(msg) => f.write_fmt(format_args!("Justice Cgroup Error: {}", msg)),
      JusticeError::Fork(msg) => f.write_fmt(format_args!("Justice Fork Error: {}", msg)),
      JusticeError::Exec(msg) => f.write_fmt(format_args!("Justice Exec Error: {}", msg)),
      JusticeError::Nix(errno) => f.write_fmt(format_args!("Justice Nix Error: {}", errno)),
      JusticeError::Fs(msg) => f.write_fmt(format_args!("Justice File System Error: {}", msg)),
      JusticeError::Cli(msg) => f.write_fmt(format_args!("Justice CLI Error: {}", msg)),
      JusticeError::Config(msg) => f.write_fmt(format_args!("Justice Config Error: {}", msg)),
      JusticeError::Report(msg) => f.write_fmt(format_args!("Justice Report Error: {}", msg)),
      JusticeError::Logger(err) => f.write_fmt(format_args!("Justice Logger Error: {}", err)),
    }
  }
}

impl From<Errno> for JusticeError {
  fn from(errno: Errno) -> Self {
    JusticeError::Nix(errno)
  }
}

impl From<std::io::Error> for JusticeError {
  fn from(err: std::io::Error) -> Self {
    JusticeError::Fs(err.to_string())
  }
}

impl From<cgroups_rs::error::Error> for JusticeError {
  fn from(err: cgroups_rs::error::Error) -> Self {
    JusticeError::Cgroup(err.to_string())
  }
}

impl From<serde_json::Error> for JusticeError {
  fn from(err: serde_json::Error) -> Self {
    JusticeError::Config(err.to_string())
  }
}

impl From<FlexiLoggerError> for JusticeError {
  fn from(err: FlexiLoggerError) -> Self {
    JusticeError::Logger(err)
  }
}

impl Error for JusticeError {}

impl From<Result<()>> for JusticeExit {
  fn from(result: Result<()>) -> Self {
    match result {
      Ok(_) => JusticeExit::Ok,
      Err(err) => JusticeExit::Err(err),
    }
  }
}

impl Termination for JusticeExit {
  fn report(self) -> ExitCode {
    match self {
      JusticeExit::Ok => ExitCode::SUCCESS.report(),
      JusticeExit::Err(err) => {
        let text = format!("{}", err);
        let text = match text.split_once(": ") {
          Some((prefix, message)) => {
            let is_tty = isatty(STDOUT_FILENO).unwrap_or(false);
            if is_tty {
              format!("\x1b[1m\x1b[91m{}\x1b[39m\x1b[22m  {}", prefix, message)
            } else {
              serde_json::json!({
                "ok": false,
                "type": prefix,
                "message": message,
              })
              .to_string()
            }
          }
          None => text,
        };
        eprintln!("{}", text);
        ExitCode::FAILURE.report()
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn it_should_prefix_error_kind() {
    let err = JusticeError::cgroup("group cpu/abc already exists");
    assert_eq!(format!("{}", err), "Justice Cgroup Error: group cpu/abc already exists");

    let err = JusticeError::from(Errno::EBUSY);
    assert!(format!("{}", err).starts_with("Justice Nix Error: "));
  }

  #[test]
  fn it_should_convert_io_error() {
    let err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    match JusticeError::from(err) {
      JusticeError::Fs(msg) => assert_eq!(msg, "missing"),
      other => panic!("unexpected error {}", other),
    }
  }
}
