//! Scrape runs. A run is one end-to-end invocation of the collection process.
//!
//! A run row is created when a session starts and updated once when it
//! finishes. Runs are never hard-deleted.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, profile::Profile};

// ─── Identity ────────────────────────────────────────────────────────────────

/// Opaque, time-derived run identifier.
///
/// Generated ids look like `run_20240501T101500123Z_medium_3fa2c1`. The
/// timestamp prefix is fixed-width, so lexicographic order is creation order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
  pub fn generate(profile: Profile, now: DateTime<Utc>) -> Self {
    let suffix = Uuid::new_v4().simple().to_string();
    Self(format!(
      "run_{}_{}_{}",
      now.format("%Y%m%dT%H%M%S%3fZ"),
      profile,
      &suffix[..6]
    ))
  }

  /// Accept an externally supplied id (e.g. from the scheduler).
  ///
  /// Ids end up in file names, so path separators and `..` are refused.
  pub fn parse(s: &str) -> Result<Self, Error> {
    let s = s.trim();
    if s.is_empty()
      || s.contains('/')
      || s.contains('\\')
      || s.contains("..")
    {
      return Err(Error::InvalidRunId(s.to_owned()));
    }
    Ok(Self(s.to_owned()))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for RunId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl FromStr for RunId {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> { Self::parse(s) }
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
  Running,
  Success,
  Failed,
}

impl RunStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      RunStatus::Running => "running",
      RunStatus::Success => "success",
      RunStatus::Failed => "failed",
    }
  }

  pub fn is_terminal(self) -> bool { !matches!(self, RunStatus::Running) }
}

impl FromStr for RunStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "running" => Ok(RunStatus::Running),
      "success" => Ok(RunStatus::Success),
      "failed" => Ok(RunStatus::Failed),
      other => Err(Error::UnknownRunStatus(other.to_owned())),
    }
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// A persisted scrape run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRun {
  pub id:            RunId,
  pub started_at:    DateTime<Utc>,
  pub completed_at:  Option<DateTime<Utc>>,
  pub profile:       Profile,
  pub headless:      bool,
  pub status:        RunStatus,
  pub message_count: i64,
  pub error_message: Option<String>,
  /// Relative artifact paths, browsable under the API's `/artifacts` route.
  pub log_path:      Option<String>,
  pub video_path:    Option<String>,
  pub trace_path:    Option<String>,
  /// Output captured from the scraper process, when a launcher recorded it.
  pub log_text:      Option<String>,
  pub deleted_at:    Option<DateTime<Utc>>,
}

/// Input for creating a run in status `running`.
#[derive(Debug, Clone)]
pub struct NewRun {
  pub id:         RunId,
  pub profile:    Profile,
  pub headless:   bool,
  pub started_at: DateTime<Utc>,
}

/// A partial update to a run. `None` fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct RunUpdate {
  pub status:        Option<RunStatus>,
  pub completed_at:  Option<DateTime<Utc>>,
  pub message_count: Option<i64>,
  pub error_message: Option<String>,
  pub log_path:      Option<String>,
  pub video_path:    Option<String>,
  pub trace_path:    Option<String>,
  pub log_text:      Option<String>,
}

impl RunUpdate {
  /// A terminal update recording a failure at `at`.
  pub fn failed(error: impl Into<String>, at: DateTime<Utc>) -> Self {
    Self {
      status: Some(RunStatus::Failed),
      completed_at: Some(at),
      error_message: Some(error.into()),
      ..Self::default()
    }
  }
}
