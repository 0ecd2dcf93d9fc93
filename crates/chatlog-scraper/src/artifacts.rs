//! Per-run artifact layout.
//!
//! ```text
//! <data_dir>/raw/<R>.json            export of every collected message
//! <data_dir>/video/<R>/frame_N.png   screen recording, one frame per tick
//! <data_dir>/trace/<R>.jsonl         lifecycle trace, one JSON object per line
//! <data_dir>/screenshots/<R>/        screenshots of failed targets
//! <logs_dir>/<R>.log                 structured log of the scrape process
//! ```
//!
//! The run row stores paths relative to the artifact route (`/logs/...`,
//! `/data/...`) so the API can serve them without knowing the host layout.

use std::path::{Path, PathBuf};

use chatlog_core::{message::NewMessage, profile::Profile, run::RunId};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{Result, Settings};

/// Paths recorded on the run row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelativePaths {
  pub log:   String,
  pub video: String,
  pub trace: String,
}

impl RelativePaths {
  pub fn for_run(id: &RunId) -> Self {
    Self {
      log:   format!("/logs/{id}.log"),
      video: format!("/data/video/{id}/"),
      trace: format!("/data/trace/{id}.jsonl"),
    }
  }
}

/// Root directories under which run artifacts are allocated.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
  data_dir: PathBuf,
  logs_dir: PathBuf,
}

impl ArtifactStore {
  pub fn new(data_dir: impl Into<PathBuf>, logs_dir: impl Into<PathBuf>) -> Self {
    Self { data_dir: data_dir.into(), logs_dir: logs_dir.into() }
  }

  pub fn from_settings(settings: &Settings) -> Self {
    Self::new(&settings.data_dir, &settings.logs_dir)
  }

  pub fn data_dir(&self) -> &Path { &self.data_dir }

  pub fn logs_dir(&self) -> &Path { &self.logs_dir }

  /// File the scrape process logs into for run `id`.
  pub fn log_file(&self, id: &RunId) -> PathBuf {
    self.logs_dir.join(format!("{id}.log"))
  }

  /// Create every directory run `id` writes into.
  pub async fn allocate(&self, id: &RunId) -> Result<RunArtifacts> {
    let artifacts = RunArtifacts {
      run_id:         id.clone(),
      export_file:    self.data_dir.join("raw").join(format!("{id}.json")),
      video_dir:      self.data_dir.join("video").join(id.as_str()),
      trace_file:     self.data_dir.join("trace").join(format!("{id}.jsonl")),
      screenshot_dir: self.data_dir.join("screenshots").join(id.as_str()),
      log_file:       self.log_file(id),
    };

    for dir in [
      self.data_dir.join("raw"),
      self.data_dir.join("trace"),
      artifacts.video_dir.clone(),
      artifacts.screenshot_dir.clone(),
      self.logs_dir.clone(),
    ] {
      tokio::fs::create_dir_all(&dir).await?;
    }
    Ok(artifacts)
  }
}

/// The allocated artifact paths of a single run.
#[derive(Debug, Clone)]
pub struct RunArtifacts {
  pub run_id:         RunId,
  pub export_file:    PathBuf,
  pub video_dir:      PathBuf,
  pub trace_file:     PathBuf,
  pub screenshot_dir: PathBuf,
  pub log_file:       PathBuf,
}

impl RunArtifacts {
  pub fn relative_paths(&self) -> RelativePaths { RelativePaths::for_run(&self.run_id) }

  pub fn frame_path(&self, index: u64) -> PathBuf {
    self.video_dir.join(format!("frame_{index:05}.png"))
  }

  /// Where to put the screenshot taken when `label` failed.
  pub fn error_screenshot_path(&self, label: &str, at: DateTime<Utc>) -> PathBuf {
    let label: String = label
      .chars()
      .map(|c| if c.is_alphanumeric() { c } else { '_' })
      .collect();
    self
      .screenshot_dir
      .join(format!("{label}_{}.png", at.format("%H%M%S%3f")))
  }

  /// Write the message export as pretty-printed JSON.
  pub async fn write_export(&self, export: &RunExport<'_>) -> Result<&Path> {
    let body = serde_json::to_vec_pretty(export)?;
    tokio::fs::write(&self.export_file, body).await?;
    Ok(&self.export_file)
  }
}

/// The JSON export of a run, kept for audit and replay.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunExport<'a> {
  pub run_id:        &'a RunId,
  pub profile:       Profile,
  pub timestamp:     DateTime<Utc>,
  pub message_count: usize,
  pub messages:      &'a [NewMessage],
}

impl<'a> RunExport<'a> {
  pub fn new(run_id: &'a RunId, profile: Profile, messages: &'a [NewMessage]) -> Self {
    Self {
      run_id,
      profile,
      timestamp: Utc::now(),
      message_count: messages.len(),
      messages,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn run_id() -> RunId { RunId::parse("run_20240501T100000000Z_medium_abc123").unwrap() }

  #[test]
  fn relative_paths_are_rooted_at_artifact_routes() {
    let paths = RelativePaths::for_run(&run_id());
    assert_eq!(paths.log, "/logs/run_20240501T100000000Z_medium_abc123.log");
    assert_eq!(paths.video, "/data/video/run_20240501T100000000Z_medium_abc123/");
    assert_eq!(paths.trace, "/data/trace/run_20240501T100000000Z_medium_abc123.jsonl");
  }

  #[tokio::test]
  async fn allocate_creates_directories() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path().join("data"), dir.path().join("logs"));
    let artifacts = store.allocate(&run_id()).await.unwrap();

    assert!(artifacts.video_dir.is_dir());
    assert!(artifacts.screenshot_dir.is_dir());
    assert!(artifacts.trace_file.parent().unwrap().is_dir());
    assert!(artifacts.export_file.parent().unwrap().is_dir());
    assert!(dir.path().join("logs").is_dir());
    assert_eq!(
      artifacts.frame_path(7).file_name().unwrap(),
      "frame_00007.png"
    );
  }

  #[tokio::test]
  async fn export_uses_camel_case_fields() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path().join("data"), dir.path().join("logs"));
    let id = run_id();
    let artifacts = store.allocate(&id).await.unwrap();

    let messages = vec![NewMessage::new("Ops", "Alice", "hi", Utc::now())];
    let path = artifacts
      .write_export(&RunExport::new(&id, Profile::Medium, &messages))
      .await
      .unwrap()
      .to_path_buf();

    let json: serde_json::Value =
      serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
    assert_eq!(json["runId"], id.as_str());
    assert_eq!(json["profile"], "medium");
    assert_eq!(json["messageCount"], 1);
    assert_eq!(json["messages"][0]["sender"], "Alice");
  }

  #[test]
  fn error_screenshot_label_is_sanitised() {
    let artifacts = RunArtifacts {
      run_id:         run_id(),
      export_file:    PathBuf::new(),
      video_dir:      PathBuf::new(),
      trace_file:     PathBuf::new(),
      screenshot_dir: PathBuf::from("shots"),
      log_file:       PathBuf::new(),
    };
    let path = artifacts.error_screenshot_path("Ops / Channel", Utc::now());
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("Ops___Channel_"));
    assert!(name.ends_with(".png"));
  }
}
