//! Session recording.
//!
//! [`Recorder`] captures a screenshot of the browser every frame interval for
//! the whole life of a session. [`TraceLog`] appends one JSON object per
//! lifecycle step. Both are best-effort: write failures are logged and never
//! end a run.

use std::{path::PathBuf, sync::Arc, time::Duration};

use chatlog_core::run::RunId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::{
  io::AsyncWriteExt as _,
  sync::{Mutex, oneshot},
  task::JoinHandle,
  time::MissedTickBehavior,
};

use crate::{artifacts::RunArtifacts, lifecycle::RunPhase, session::BrowserSession};

// ─── Frames ───────────────────────────────────────────────────────────────────

/// A running screen recording. Call [`Recorder::stop`] to finish it.
pub struct Recorder {
  stop:   oneshot::Sender<()>,
  handle: JoinHandle<u64>,
}

impl Recorder {
  /// Start capturing frames from `session` into the run's video directory.
  pub fn start<B>(session: Arc<B>, artifacts: &RunArtifacts, every: Duration) -> Self
  where
    B: BrowserSession + 'static,
  {
    let (stop, mut stopped) = oneshot::channel();
    let artifacts = artifacts.clone();

    let handle = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(every);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
      let mut frames = 0u64;

      loop {
        tokio::select! {
          _ = &mut stopped => break,
          _ = ticker.tick() => {}
        }
        match session.screenshot().await {
          Ok(png) => {
            let path = artifacts.frame_path(frames);
            match tokio::fs::write(&path, png).await {
              Ok(()) => frames += 1,
              Err(e) => tracing::warn!(?path, error = %e, "failed to write frame"),
            }
          }
          Err(e) => tracing::debug!(error = %e, "frame capture failed"),
        }
      }
      frames
    });

    Self { stop, handle }
  }

  /// Stop recording and return the number of frames written.
  pub async fn stop(self) -> u64 {
    let _ = self.stop.send(());
    match self.handle.await {
      Ok(frames) => frames,
      Err(e) => {
        tracing::warn!(error = %e, "recorder task failed");
        0
      }
    }
  }
}

// ─── Trace ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct TraceEvent<'a> {
  at:     DateTime<Utc>,
  run_id: &'a RunId,
  phase:  RunPhase,
  #[serde(skip_serializing_if = "Option::is_none")]
  target: Option<&'a str>,
  #[serde(skip_serializing_if = "Value::is_null")]
  detail: Value,
}

/// Append-only JSON-lines trace of a run.
pub struct TraceLog {
  run_id: RunId,
  path:   PathBuf,
  file:   Mutex<Option<tokio::fs::File>>,
}

impl TraceLog {
  pub fn new(artifacts: &RunArtifacts) -> Self {
    Self {
      run_id: artifacts.run_id.clone(),
      path:   artifacts.trace_file.clone(),
      file:   Mutex::new(None),
    }
  }

  pub async fn record(&self, phase: RunPhase, target: Option<&str>, detail: Value) {
    let event = TraceEvent {
      at: Utc::now(),
      run_id: &self.run_id,
      phase,
      target,
      detail,
    };
    if let Err(e) = self.append(&event).await {
      tracing::warn!(path = ?self.path, error = %e, "failed to write trace");
    }
  }

  async fn append(&self, event: &TraceEvent<'_>) -> crate::Result<()> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');

    let mut file = self.file.lock().await;
    if file.is_none() {
      let opened = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&self.path)
        .await?;
      *file = Some(opened);
    }
    if let Some(f) = file.as_mut() {
      f.write_all(&line).await?;
      f.flush().await?;
    }
    Ok(())
  }
}
