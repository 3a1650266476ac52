use std::env;
use std::ffi::{CString, OsStr};
use std::os::unix::ffi::OsStrExt;

use flexi_logger::DeferredNow;
use log::{error, info, Record};

pub use pipe::{JusticePipe, ReportWriter, SyncReader};

use crate::JusticeError;

pub mod pipe;

/// A logline-formatter that produces log lines like <br>
/// ```[datetime: INFO] Task successfully read from conf.json```
pub fn default_format(
  w: &mut dyn std::io::Write,
  now: &mut DeferredNow,
  record: &Record,
) -> Result<(), std::io::Error> {
  write!(
    w,
    "[{}: {:5}] {}",
    now.format("%Y-%m-%d %H:%M:%S"),
    record.level(),
    record.args()
  )
}

pub(crate) fn into_c_string<S: AsRef<OsStr>>(string: S) -> Result<CString, JusticeError> {
  let bytes = string.as_ref().as_bytes();
  CString::new(bytes).map_err(|_| {
    JusticeError::exec(format!(
      "{} contains an interior NUL byte",
      String::from_utf8_lossy(bytes)
    ))
  })
}

pub fn parse_env(text: String) -> Result<(String, String), JusticeError> {
  match text.split_once('=') {
    Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
    Some(_) => {
      error!("Wrong environment variable string ({}) format", &text);
      Err(JusticeError::cli("Wrong environment variable string format"))
    }
    None => {
      let value = env::var(&text).unwrap_or("".to_string());
      info!("Read environment variable {} = {}", text, value);
      Ok((text, value))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn it_should_parse_env_pair() {
    let (key, value) = parse_env("LANG=C.UTF-8".to_string()).unwrap();
    assert_eq!(key, "LANG");
    assert_eq!(value, "C.UTF-8");

    let (key, value) = parse_env("OPTS=a=b".to_string()).unwrap();
    assert_eq!(key, "OPTS");
    assert_eq!(value, "a=b");

    assert!(parse_env("=oops".to_string()).is_err());
  }

  #[test]
  fn it_should_reject_nul_bytes() {
    assert!(into_c_string("/bin/true").is_ok());
    assert!(into_c_string("bad\0path").is_err());
  }
}
