//! The run lifecycle controller.
//!
//! ```text
//! INIT -> NAVIGATING -> (per target: OPENING -> SCROLLING -> EXTRACTING)
//!      -> SAVING -> FINALIZED(success | failed)
//! ```
//!
//! [`RunController::run`] never returns an error. Whatever happens inside the
//! run, including a panic, it ends in [`RunController::finalize`], which stops
//! the recording, closes the browser and writes the final status exactly once.
//!
//! Failures while opening, scrolling or extracting a single target only cost
//! that target's messages. Failures anywhere else fail the run.

use std::{any::Any, fmt, panic::AssertUnwindSafe, sync::Arc};

use chatlog_core::{
  message::NewMessage,
  profile::Profile,
  run::{NewRun, RunId, RunStatus, RunUpdate},
  store::ChatStore,
  target::{TargetChat, TargetFilter},
};
use chrono::{DateTime, Utc};
use futures::FutureExt as _;
use serde::Serialize;
use serde_json::json;
use tracing::Instrument as _;

use crate::{
  Error, Result, Settings,
  artifacts::{ArtifactStore, RelativePaths, RunArtifacts, RunExport},
  incremental,
  recorder::{Recorder, TraceLog},
  session::{BrowserSession, SessionFactory, SessionSpec},
  strategy::ChatStrategy,
};

// ─── Phases and reports ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
  Init,
  Navigating,
  Opening,
  Scrolling,
  Extracting,
  Saving,
  Finalized,
}

impl RunPhase {
  pub fn as_str(self) -> &'static str {
    match self {
      RunPhase::Init => "init",
      RunPhase::Navigating => "navigating",
      RunPhase::Opening => "opening",
      RunPhase::Scrolling => "scrolling",
      RunPhase::Extracting => "extracting",
      RunPhase::Saving => "saving",
      RunPhase::Finalized => "finalized",
    }
  }

  /// Noun used in error messages: `"navigation failed: ..."`.
  pub fn label(self) -> &'static str {
    match self {
      RunPhase::Init => "init",
      RunPhase::Navigating => "navigation",
      RunPhase::Opening => "open",
      RunPhase::Scrolling => "scroll",
      RunPhase::Extracting => "extraction",
      RunPhase::Saving => "save",
      RunPhase::Finalized => "finalize",
    }
  }
}

impl fmt::Display for RunPhase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Why history loading stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollStop {
  /// The oldest rendered message is at or before the stored boundary.
  BoundaryReached,
  /// Content height stopped growing.
  Exhausted,
  MaxIterations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScrollOutcome {
  pub iterations: u32,
  pub stop:       ScrollStop,
}

/// What happened to one target during a run.
#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
  pub target_id:    i64,
  pub chat_name:    String,
  pub found:        bool,
  pub new_messages: usize,
  pub scroll:       Option<ScrollOutcome>,
  pub error:        Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
  pub run_id:        RunId,
  pub status:        RunStatus,
  pub message_count: usize,
  pub error:         Option<String>,
  pub targets:       Vec<TargetReport>,
}

/// Per-invocation parameters.
#[derive(Debug, Clone)]
pub struct RunOptions {
  pub run_id:   RunId,
  pub profile:  Profile,
  pub headless: bool,
}

// ─── Controller ───────────────────────────────────────────────────────────────

/// Resources acquired during a run, released by `finalize`.
struct RunState<B> {
  session:   Option<Arc<B>>,
  recorder:  Option<Recorder>,
  trace:     Option<TraceLog>,
  artifacts: Option<RunArtifacts>,
  messages:  Vec<NewMessage>,
  targets:   Vec<TargetReport>,
}

impl<B> Default for RunState<B> {
  fn default() -> Self {
    Self {
      session:   None,
      recorder:  None,
      trace:     None,
      artifacts: None,
      messages:  Vec::new(),
      targets:   Vec::new(),
    }
  }
}

impl<B> RunState<B> {
  async fn trace(&self, phase: RunPhase, target: Option<&str>, detail: serde_json::Value) {
    if let Some(trace) = &self.trace {
      trace.record(phase, target, detail).await;
    }
  }
}

/// Drives one scrape run against a store, a browser, and a strategy.
pub struct RunController<S, F, T> {
  store:     Arc<S>,
  sessions:  F,
  strategy:  T,
  artifacts: ArtifactStore,
  settings:  Settings,
}

impl<S, F, T> RunController<S, F, T>
where
  S: ChatStore,
  F: SessionFactory,
  T: ChatStrategy<F::Session>,
{
  pub fn new(store: Arc<S>, sessions: F, strategy: T, settings: Settings) -> Self {
    Self {
      store,
      sessions,
      strategy,
      artifacts: ArtifactStore::from_settings(&settings),
      settings,
    }
  }

  /// Execute a full run and report how it ended.
  pub async fn run(&self, opts: RunOptions) -> RunReport {
    let span = tracing::info_span!("run", run_id = %opts.run_id, profile = %opts.profile);
    async {
      let mut state = RunState::default();
      let outcome = AssertUnwindSafe(self.execute(&opts, &mut state))
        .catch_unwind()
        .await;

      let error = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e),
        Err(panic) => Some(Error::Panicked(panic_message(panic.as_ref()))),
      };
      self.finalize(&opts.run_id, state, error).await
    }
    .instrument(span)
    .await
  }

  async fn execute(&self, opts: &RunOptions, state: &mut RunState<F::Session>) -> Result<()> {
    // ── Init ────────────────────────────────────────────────────────────
    tracing::info!(phase = %RunPhase::Init, headless = opts.headless, "starting run");
    self
      .store
      .create_run(NewRun {
        id:         opts.run_id.clone(),
        profile:    opts.profile,
        headless:   opts.headless,
        started_at: Utc::now(),
      })
      .await
      .map_err(|e| Error::store(e).in_phase(RunPhase::Init))?;

    let artifacts = self
      .artifacts
      .allocate(&opts.run_id)
      .await
      .map_err(|e| e.in_phase(RunPhase::Init))?;
    state.trace = Some(TraceLog::new(&artifacts));
    state.artifacts = Some(artifacts.clone());
    state
      .trace(RunPhase::Init, None, json!({ "profile": opts.profile, "headless": opts.headless }))
      .await;

    let targets = self
      .store
      .list_targets(TargetFilter { active_only: true, profile: Some(opts.profile) })
      .await
      .map_err(|e| Error::store(e).in_phase(RunPhase::Init))?;

    let session = self
      .sessions
      .open(SessionSpec {
        viewport:           self.settings.viewport(opts.profile),
        headless:           opts.headless,
        user_data_dir:      self.settings.user_data_dir.clone(),
        navigation_timeout: self.settings.navigation_timeout(),
      })
      .await
      .map_err(|e| e.in_phase(RunPhase::Init))?;
    let session = Arc::new(session);
    state.session = Some(session.clone());
    state.recorder = Some(Recorder::start(
      session.clone(),
      &artifacts,
      self.settings.frame_interval(),
    ));

    // ── Navigating ──────────────────────────────────────────────────────
    tracing::info!(phase = %RunPhase::Navigating, url = %self.settings.target_url, "loading chat client");
    state
      .trace(RunPhase::Navigating, None, json!({ "url": self.settings.target_url }))
      .await;
    session
      .navigate(self.settings.target_url.clone())
      .await
      .map_err(|e| e.in_phase(RunPhase::Navigating))?;
    tokio::time::sleep(self.settings.settle_delay()).await;

    // ── Targets ─────────────────────────────────────────────────────────
    if targets.is_empty() {
      tracing::warn!("no active targets for this profile");
    }
    for target in &targets {
      let report = self.process_target(&session, target, &artifacts, state).await;
      state.targets.push(report);
    }

    // ── Saving ──────────────────────────────────────────────────────────
    let count = state.messages.len();
    tracing::info!(phase = %RunPhase::Saving, messages = count, "saving results");
    state.trace(RunPhase::Saving, None, json!({ "messages": count })).await;

    let export = RunExport::new(&opts.run_id, opts.profile, &state.messages);
    let path = artifacts
      .write_export(&export)
      .await
      .map_err(|e| e.in_phase(RunPhase::Saving))?;
    tracing::debug!(?path, "export written");

    if count > 0 {
      self
        .store
        .upsert_messages(opts.run_id.clone(), state.messages.clone())
        .await
        .map_err(|e| Error::store(e).in_phase(RunPhase::Saving))?;
    }
    Ok(())
  }

  /// Collect one target. Never fails the run.
  async fn process_target(
    &self,
    session: &F::Session,
    target: &TargetChat,
    artifacts: &RunArtifacts,
    state: &mut RunState<F::Session>,
  ) -> TargetReport {
    let name = target.chat_name.as_str();
    let mut report = TargetReport {
      target_id:    target.id,
      chat_name:    target.chat_name.clone(),
      found:        false,
      new_messages: 0,
      scroll:       None,
      error:        None,
    };

    match self.collect_target(session, name, state).await {
      Ok(None) => {
        tracing::warn!(target = name, "chat not found in chat list, skipping");
        state
          .trace(RunPhase::Opening, Some(name), json!({ "found": false }))
          .await;
      }
      Ok(Some((messages, scroll))) => {
        report.found = true;
        report.new_messages = messages.len();
        report.scroll = Some(scroll);
        tracing::info!(
          target = name,
          new_messages = messages.len(),
          iterations = scroll.iterations,
          stop = ?scroll.stop,
          "target collected"
        );
        state.messages.extend(messages);

        if let Err(e) = self
          .store
          .record_target_scrape(target.id, Utc::now(), report.new_messages as i64)
          .await
        {
          tracing::warn!(target = name, error = %e, "failed to update target metadata");
        }
      }
      Err(e) => {
        tracing::error!(target = name, error = %e, "target failed, continuing");
        state
          .trace(RunPhase::Extracting, Some(name), json!({ "error": e.to_string() }))
          .await;
        self.error_screenshot(session, name, artifacts).await;
        report.error = Some(e.to_string());
      }
    }
    report
  }

  async fn collect_target(
    &self,
    session: &F::Session,
    name: &str,
    state: &RunState<F::Session>,
  ) -> Result<Option<(Vec<NewMessage>, ScrollOutcome)>> {
    let boundary = self
      .store
      .latest_timestamp(name.to_owned())
      .await
      .map_err(|e| Error::store(e).in_phase(RunPhase::Opening))?;

    state
      .trace(RunPhase::Opening, Some(name), json!({ "boundary": boundary }))
      .await;
    let found = self
      .strategy
      .open_target(session, name)
      .await
      .map_err(|e| e.in_phase(RunPhase::Opening))?;
    if !found {
      return Ok(None);
    }

    let scroll = self
      .scroll_history(session, boundary)
      .await
      .map_err(|e| e.in_phase(RunPhase::Scrolling))?;
    state
      .trace(RunPhase::Scrolling, Some(name), json!(scroll))
      .await;

    let visible = self
      .strategy
      .extract_visible(session)
      .await
      .map_err(|e| e.in_phase(RunPhase::Extracting))?;
    let seen = visible.len();
    let messages = incremental::select_new(name, visible, boundary);
    state
      .trace(
        RunPhase::Extracting,
        Some(name),
        json!({ "visible": seen, "new": messages.len() }),
      )
      .await;

    Ok(Some((messages, scroll)))
  }

  /// Load older history until the boundary shows up, nothing more loads,
  /// or the iteration limit is hit.
  pub async fn scroll_history(
    &self,
    session: &F::Session,
    boundary: Option<DateTime<Utc>>,
  ) -> Result<ScrollOutcome> {
    let max = self.settings.max_scrolls;
    let mut previous = None;

    for iteration in 1..=max {
      let height = self.strategy.load_older(session).await?;
      tracing::debug!(iteration, max, height, "loaded older history");

      if let Some(boundary) = boundary
        && self.strategy.has_reached_boundary(session, boundary).await?
      {
        return Ok(ScrollOutcome { iterations: iteration, stop: ScrollStop::BoundaryReached });
      }
      if previous == Some(height) {
        return Ok(ScrollOutcome { iterations: iteration, stop: ScrollStop::Exhausted });
      }
      previous = Some(height);
    }
    Ok(ScrollOutcome { iterations: max, stop: ScrollStop::MaxIterations })
  }

  async fn error_screenshot(&self, session: &F::Session, name: &str, artifacts: &RunArtifacts) {
    let path = artifacts.error_screenshot_path(name, Utc::now());
    let written = match session.screenshot().await {
      Ok(png) => tokio::fs::write(&path, png).await.map_err(Error::from),
      Err(e) => Err(e),
    };
    match written {
      Ok(()) => tracing::info!(?path, "error screenshot saved"),
      Err(e) => tracing::warn!(error = %e, "could not save error screenshot"),
    }
  }

  /// Release everything the run acquired and write its final state.
  async fn finalize(
    &self,
    run_id: &RunId,
    mut state: RunState<F::Session>,
    error: Option<Error>,
  ) -> RunReport {
    let frames = match state.recorder.take() {
      Some(recorder) => recorder.stop().await,
      None => 0,
    };

    if let Some(session) = state.session.take()
      && let Err(e) = session.close().await
    {
      tracing::warn!(error = %e, "failed to close browser session");
    }

    let status = if error.is_some() { RunStatus::Failed } else { RunStatus::Success };
    let error = error.map(|e| e.to_string());
    let message_count = state.messages.len();

    state
      .trace(
        RunPhase::Finalized,
        None,
        json!({ "status": status.as_str(), "messages": message_count, "frames": frames, "error": error }),
      )
      .await;

    let paths = state
      .artifacts
      .as_ref()
      .map(RunArtifacts::relative_paths)
      .unwrap_or_else(|| RelativePaths::for_run(run_id));
    let update = RunUpdate {
      status:        Some(status),
      completed_at:  Some(Utc::now()),
      message_count: Some(message_count as i64),
      error_message: error.clone(),
      log_path:      Some(paths.log),
      video_path:    Some(paths.video),
      trace_path:    Some(paths.trace),
      log_text:      None,
    };
    match self.store.update_run(run_id.clone(), update).await {
      Ok(true) => {}
      Ok(false) => tracing::error!("run row missing at finalize"),
      Err(e) => tracing::error!(error = %e, "failed to write final run status"),
    }

    match &error {
      None => tracing::info!(phase = %RunPhase::Finalized, messages = message_count, frames, "run succeeded"),
      Some(e) => tracing::error!(phase = %RunPhase::Finalized, error = %e, frames, "run failed"),
    }

    RunReport {
      run_id: run_id.clone(),
      status,
      message_count,
      error,
      targets: state.targets,
    }
  }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
  if let Some(s) = panic.downcast_ref::<&str>() {
    (*s).to_owned()
  } else if let Some(s) = panic.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic".to_owned()
  }
}
