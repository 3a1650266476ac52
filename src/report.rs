//! Escalation of runs that went wrong without telling anyone why.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};
use reqwest::blocking::Client;
use reqwest::Url;
use serde::Serialize;
use serde_json::json;

use crate::error::{JusticeError, Result};

const SENTRY_TIMEOUT: Duration = Duration::from_secs(5);

static EVENT_COUNTER: AtomicU32 = AtomicU32::new(0);

/// A silent deadline kill, tagged with where it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anomaly {
  category: String,
  working_dir: String,
  program: String,
}

/// Sink for anomalies. Delivery is best-effort and must not block the caller
/// for long.
pub trait AnomalyReporter: Send + Sync {
  fn notify(&self, anomaly: Anomaly);

  /// Wait for in-flight deliveries. Called once before the process exits.
  fn flush(&self) {}
}

/// Writes anomalies to the log only.
pub struct LogReporter;

/// Keeps anomalies in memory, for embedding callers and tests.
#[derive(Default)]
pub struct MemoryReporter {
  anomalies: Mutex<Vec<Anomaly>>,
}

/// Posts anomalies to a Sentry project through its store endpoint.
pub struct SentryReporter {
  client: Client,
  endpoint: Url,
  auth: String,
  pending: Mutex<Vec<JoinHandle<()>>>,
}

impl Anomaly {
  pub fn new<CS: Into<String>, PS: Into<String>>(category: CS, working_dir: &Path, program: PS) -> Self {
    Anomaly {
      category: category.into(),
      working_dir: working_dir.to_string_lossy().to_string(),
      program: program.into(),
    }
  }

  pub fn category(&self) -> &str {
    &self.category
  }

  pub fn working_dir(&self) -> &str {
    &self.working_dir
  }

  pub fn program(&self) -> &str {
    &self.program
  }
}

impl AnomalyReporter for LogReporter {
  fn notify(&self, anomaly: Anomaly) {
    warn!(
      "Anomaly {} in {} (program: {})",
      anomaly.category, anomaly.working_dir, anomaly.program
    );
  }
}

impl MemoryReporter {
  pub fn new() -> Arc<Self> {
    Arc::new(MemoryReporter::default())
  }

  pub fn anomalies(&self) -> Vec<Anomaly> {
    match self.anomalies.lock() {
      Ok(anomalies) => anomalies.clone(),
      Err(poisoned) => poisoned.into_inner().clone(),
    }
  }
}

impl AnomalyReporter for MemoryReporter {
  fn notify(&self, anomaly: Anomaly) {
    let mut anomalies = match self.anomalies.lock() {
      Ok(anomalies) => anomalies,
      Err(poisoned) => poisoned.into_inner(),
    };
    anomalies.push(anomaly);
  }
}

impl SentryReporter {
  /// Parse a DSN of the form `https://<key>[:<secret>]@<host>[/<prefix>]/<project>`.
  pub fn new(dsn: &str) -> Result<Self> {
    let (endpoint, auth) = parse_dsn(dsn)?;
    let client = Client::builder()
      .timeout(SENTRY_TIMEOUT)
      .build()
      .map_err(|err| JusticeError::report(format!("build http client: {}", err)))?;
    info!("Report anomalies to {}", endpoint);
    Ok(SentryReporter {
      client,
      endpoint,
      auth,
      pending: Mutex::new(vec![]),
    })
  }

  pub fn endpoint(&self) -> &Url {
    &self.endpoint
  }

  fn pending(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
    match self.pending.lock() {
      Ok(pending) => pending,
      Err(poisoned) => poisoned.into_inner(),
    }
  }
}

impl AnomalyReporter for SentryReporter {
  fn notify(&self, anomaly: Anomaly) {
    let client = self.client.clone();
    let endpoint = self.endpoint.clone();
    let auth = self.auth.clone();
    let event = sentry_event(&anomaly);

    let spawned = thread::Builder::new()
      .name("justice-sentry".to_string())
      .spawn(move || {
        let response = client
          .post(endpoint)
          .header("X-Sentry-Auth", auth)
          .json(&event)
          .send();
        match response {
          Ok(response) if response.status().is_success() => {
            debug!("Anomaly {} delivered", anomaly.category);
          }
          Ok(response) => {
            error!(
              "Sentry rejected anomaly {}: {}",
              anomaly.category,
              response.status()
            );
          }
          Err(err) => {
            error!("Deliver anomaly {} fails: {}", anomaly.category, err);
          }
        }
      });

    match spawned {
      Ok(handle) => self.pending().push(handle),
      Err(err) => error!("Spawn anomaly delivery fails: {}", err),
    }
  }

  fn flush(&self) {
    let handles = std::mem::take(&mut *self.pending());
    for handle in handles {
      let _ = handle.join();
    }
  }
}

fn parse_dsn(dsn: &str) -> Result<(Url, String)> {
  let url = Url::parse(dsn).map_err(|err| JusticeError::report(format!("invalid dsn: {}", err)))?;
  let key = url.username();
  if key.is_empty() {
    return Err(JusticeError::report("dsn has no public key"));
  }
  let host = url
    .host_str()
    .ok_or(JusticeError::report("dsn has no host"))?;

  let path = url.path().trim_matches('/');
  let (prefix, project) = match path.rsplit_once('/') {
    Some((prefix, project)) => (format!("/{}", prefix), project),
    None => ("".to_string(), path),
  };
  if project.is_empty() || !project.chars().all(|c| c.is_ascii_digit()) {
    return Err(JusticeError::report(format!("dsn has no project id: {}", dsn)));
  }

  let port = match url.port() {
    Some(port) => format!(":{}", port),
    None => "".to_string(),
  };
  let endpoint = format!(
    "{}://{}{}{}/api/{}/store/",
    url.scheme(),
    host,
    port,
    prefix,
    project
  );
  let endpoint = Url::parse(&endpoint).map_err(|err| JusticeError::report(err.to_string()))?;

  let mut auth = format!(
    "Sentry sentry_version=7, sentry_client=justice/{}, sentry_key={}",
    env!("CARGO_PKG_VERSION"),
    key
  );
  if let Some(secret) = url.password() {
    auth.push_str(&format!(", sentry_secret={}", secret));
  }

  Ok((endpoint, auth))
}

fn event_id() -> String {
  let now = Utc::now();
  let nanos = now.timestamp_nanos_opt().unwrap_or(now.timestamp_micros() * 1000) as u64;
  let counter = EVENT_COUNTER.fetch_add(1, Ordering::Relaxed);
  format!("{:016x}{:08x}{:08x}", nanos, std::process::id(), counter)
}

fn sentry_event(anomaly: &Anomaly) -> serde_json::Value {
  json!({
    "event_id": event_id(),
    "timestamp": Utc::now().to_rfc3339(),
    "level": "error",
    "logger": "justice",
    "platform": "other",
    "message": anomaly.working_dir,
    "tags": {
      "error": anomaly.category,
    },
    "extra": {
      "program": anomaly.program,
    },
  })
}
