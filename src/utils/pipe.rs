use std::fs::File;
use std::os::unix::prelude::{FromRawFd, RawFd};

use nix::{
  errno::Errno,
  fcntl::OFlag,
  unistd::{self, close, pipe2},
};

use crate::error::JusticeError;

/// Pipe created before `fork`, split into one end per process afterwards.
///
/// Every descriptor is close-on-exec, so nothing leaks into the payload unless
/// it is explicitly `dup2`ed onto a standard stream.
pub struct JusticePipe(RawFd, RawFd);

/// Child side of the hold pipe: blocks until the parent releases it.
pub struct SyncReader(RawFd);

/// Parent side of the hold pipe.
pub struct SyncWriter(RawFd);

/// Parent side of the report pipe: EOF means `execve` succeeded.
pub struct ReportReader(RawFd);

/// Child side of the report pipe.
pub struct ReportWriter(RawFd);

/// What a child managed to say before it died.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildReport {
  Setup(String),
  Exec(String),
}

const TAG_SETUP: u8 = b'S';
const TAG_EXEC: u8 = b'E';

impl JusticePipe {
  pub fn new() -> Result<Self, JusticeError> {
    let (read, write) = pipe2(OFlag::O_CLOEXEC)?;
    Ok(JusticePipe(read, write))
  }

  pub fn sync_reader(self) -> Result<SyncReader, JusticeError> {
    close(self.1)?;
    Ok(SyncReader(self.0))
  }

  pub fn sync_writer(self) -> Result<SyncWriter, JusticeError> {
    close(self.0)?;
    Ok(SyncWriter(self.1))
  }

  pub fn report_reader(self) -> Result<ReportReader, JusticeError> {
    close(self.1)?;
    Ok(ReportReader(self.0))
  }

  pub fn report_writer(self) -> Result<ReportWriter, JusticeError> {
    close(self.0)?;
    Ok(ReportWriter(self.1))
  }

  /// Keep the read end as a `File` for draining output.
  pub fn output_reader(self) -> Result<File, JusticeError> {
    close(self.1)?;
    Ok(unsafe { File::from_raw_fd(self.0) })
  }

  /// Keep the raw write end so the child can `dup2` it onto stdout / stderr.
  pub fn output_writer(self) -> Result<RawFd, JusticeError> {
    close(self.0)?;
    Ok(self.1)
  }
}

impl SyncReader {
  /// Returns `true` once the parent has written the go byte, `false` if the
  /// parent closed its end without releasing us.
  pub fn wait(&self) -> bool {
    let mut buf = [0u8; 1];
    loop {
      match unistd::read(self.0, &mut buf) {
        Ok(1) => return true,
        Ok(_) => return false,
        Err(Errno::EINTR) => continue,
        Err(_) => return false,
      }
    }
  }
}

impl Drop for SyncReader {
  fn drop(&mut self) {
    let _ = close(self.0);
  }
}

impl SyncWriter {
  pub fn release(self) -> Result<(), JusticeError> {
    unistd::write(self.0, &[1u8])?;
    Ok(())
  }
}

impl Drop for SyncWriter {
  fn drop(&mut self) {
    let _ = close(self.0);
  }
}

impl ReportReader {
  /// Blocks until the child either `execve`s (EOF, no report) or writes a report.
  pub fn read(&self) -> Result<Option<ChildReport>, JusticeError> {
    let mut bytes = vec![];
    let mut buf = [0u8; 512];
    loop {
      match unistd::read(self.0, &mut buf) {
        Ok(0) => break,
        Ok(size) => bytes.extend_from_slice(&buf[..size]),
        Err(Errno::EINTR) => continue,
        Err(errno) => return Err(errno.into()),
      }
    }
    Ok(decode_report(&bytes))
  }
}

impl Drop for ReportReader {
  fn drop(&mut self) {
    let _ = close(self.0);
  }
}

impl ReportWriter {
  pub fn setup(&self, message: &str) {
    self.send(TAG_SETUP, message);
  }

  pub fn exec(&self, message: &str) {
    self.send(TAG_EXEC, message);
  }

  pub fn as_raw_fd(&self) -> RawFd {
    self.0
  }

  fn send(&self, tag: u8, message: &str) {
    let mut bytes = Vec::with_capacity(message.len() + 1);
    bytes.push(tag);
    bytes.extend_from_slice(message.as_bytes());
    let _ = unistd::write(self.0, &bytes);
  }
}

impl Drop for ReportWriter {
  fn drop(&mut self) {
    let _ = close(self.0);
  }
}

fn decode_report(bytes: &[u8]) -> Option<ChildReport> {
  let (tag, message) = bytes.split_first()?;
  let message = String::from_utf8_lossy(message).to_string();
  match *tag {
    TAG_EXEC => Some(ChildReport::Exec(message)),
    _ => Some(ChildReport::Setup(message)),
  }
}
