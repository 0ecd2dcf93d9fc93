//! Periodic scrape runs with bounded retries.
//!
//! Each cycle launches one scrape and, if it fails, retries it up to
//! `max_retries` more times with exponential backoff. Cycles never overlap:
//! the next one starts only after the current one, including its retries,
//! has finished.

use std::{sync::Arc, time::Duration};

use chatlog_core::{
  profile::Profile,
  run::{NewRun, RunId, RunStatus, RunUpdate},
  store::ChatStore,
};
use chrono::Utc;
use tokio::{sync::watch, time::MissedTickBehavior};

use crate::{
  Settings,
  artifacts::RelativePaths,
  launcher::{LaunchRequest, RunLauncher},
};

// ─── Single attempt ───────────────────────────────────────────────────────────

/// Result of one launched run after its row has been reconciled.
#[derive(Debug, Clone)]
pub struct AttemptResult {
  pub run_id: RunId,
  pub status: RunStatus,
  pub error:  Option<String>,
}

impl AttemptResult {
  pub fn succeeded(&self) -> bool { self.status == RunStatus::Success }
}

/// Launch run `run_id` and make sure its row reflects how it ended.
///
/// The child normally creates and finalizes its own row. If it never got that
/// far, or it died while the row still said `running`, the row is created or
/// marked `failed` here. The captured output is attached either way.
pub async fn run_attempt<S, L>(
  store: &S,
  launcher: &L,
  run_id: RunId,
  profile: Profile,
  headless: bool,
) -> AttemptResult
where
  S: ChatStore,
  L: RunLauncher,
{
  let outcome = launcher
    .launch(LaunchRequest { run_id: run_id.clone(), profile, headless })
    .await;

  let (failure, log_tail) = match outcome {
    Ok(o) if o.success => (None, o.log_tail),
    Ok(o) => {
      let why = match o.exit_code {
        Some(code) => format!("scraper exited with code {code}"),
        None => "scraper terminated by signal".to_owned(),
      };
      (Some(why), o.log_tail)
    }
    Err(e) => (Some(e.to_string()), String::new()),
  };

  let existing = match store.get_run(run_id.clone()).await {
    Ok(run) => run,
    Err(e) => {
      tracing::error!(run_id = %run_id, error = %e, "failed to read run row");
      None
    }
  };

  if existing.is_none() {
    let created = store
      .create_run(NewRun {
        id: run_id.clone(),
        profile,
        headless,
        started_at: Utc::now(),
      })
      .await;
    if let Err(e) = created {
      tracing::error!(run_id = %run_id, error = %e, "failed to create run row");
    }
  }

  let child_status = existing.as_ref().map(|r| r.status);
  let mark_failed = match (&failure, child_status) {
    (Some(_), Some(status)) => status == RunStatus::Running,
    (Some(_), None) => true,
    // Exit code 0 but the row was never finalized.
    (None, Some(RunStatus::Running) | None) => true,
    (None, Some(_)) => false,
  };

  let mut update = RunUpdate {
    log_text: (!log_tail.is_empty()).then_some(log_tail),
    ..RunUpdate::default()
  };
  let error = if mark_failed {
    let message = failure.unwrap_or_else(|| "scraper exited without finalizing its run".into());
    update.status = Some(RunStatus::Failed);
    update.completed_at = Some(Utc::now());
    update.error_message = Some(message.clone());
    update.log_path = Some(RelativePaths::for_run(&run_id).log);
    Some(message)
  } else {
    existing.as_ref().and_then(|r| r.error_message.clone()).or(failure)
  };

  if let Err(e) = store.update_run(run_id.clone(), update).await {
    tracing::error!(run_id = %run_id, error = %e, "failed to reconcile run row");
  }

  let status = if mark_failed {
    RunStatus::Failed
  } else {
    child_status.unwrap_or(RunStatus::Failed)
  };
  // A clean exit with a failed row is still a failure; so is the reverse.
  let status = if error.is_some() && status == RunStatus::Success {
    RunStatus::Failed
  } else {
    status
  };

  AttemptResult { run_id, status, error }
}

// ─── Scheduler ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
  pub profile:     Profile,
  pub headless:    bool,
  pub interval:    Duration,
  pub max_retries: u32,
  pub base_delay:  Duration,
}

impl SchedulerConfig {
  pub fn from_settings(settings: &Settings) -> Self {
    Self {
      profile:     settings.profile,
      headless:    settings.headless,
      interval:    settings.scrape_interval(),
      max_retries: settings.max_retries,
      base_delay:  settings.retry_base_delay(),
    }
  }

  /// Delay before retry number `attempt + 1`: `base × 2^attempt`.
  pub fn backoff(&self, attempt: u32) -> Duration {
    self.base_delay.saturating_mul(1u32 << attempt.min(20))
  }
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
  Succeeded { run_id: RunId, attempts: u32 },
  GaveUp { attempts: u32 },
  /// Shutdown was requested while waiting to retry.
  Cancelled { attempts: u32 },
}

pub struct Scheduler<S, L> {
  store:    Arc<S>,
  launcher: L,
  config:   SchedulerConfig,
}

impl<S, L> Scheduler<S, L>
where
  S: ChatStore,
  L: RunLauncher,
{
  pub fn new(store: Arc<S>, launcher: L, config: SchedulerConfig) -> Self {
    Self { store, launcher, config }
  }

  /// Run cycles until `shutdown` turns `true` (or its sender is dropped).
  ///
  /// The first cycle starts immediately. An in-flight launch is always
  /// awaited; shutdown only prevents new ones.
  pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(self.config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(
      profile = %self.config.profile,
      interval_secs = self.config.interval.as_secs(),
      max_retries = self.config.max_retries,
      "scheduler started"
    );

    loop {
      tokio::select! {
        biased;
        _ = stopped(&mut shutdown) => break,
        _ = ticker.tick() => {}
      }
      match self.cycle(&mut shutdown).await {
        CycleOutcome::Succeeded { run_id, attempts } => {
          tracing::info!(run_id = %run_id, attempts, "scheduled run succeeded")
        }
        CycleOutcome::GaveUp { attempts } => {
          tracing::error!(attempts, "scheduled run failed, waiting for next interval")
        }
        CycleOutcome::Cancelled { attempts } => {
          tracing::info!(attempts, "retries cancelled by shutdown")
        }
      }
    }
    tracing::info!("scheduler stopped");
  }

  /// One scheduled run, including its retries.
  pub async fn cycle(&self, shutdown: &mut watch::Receiver<bool>) -> CycleOutcome {
    let total = self.config.max_retries + 1;

    for attempt in 0..total {
      let run_id = RunId::generate(self.config.profile, Utc::now());
      tracing::info!(run_id = %run_id, attempt = attempt + 1, total, "launching scrape");

      let result = run_attempt(
        self.store.as_ref(),
        &self.launcher,
        run_id,
        self.config.profile,
        self.config.headless,
      )
      .await;
      if result.succeeded() {
        return CycleOutcome::Succeeded { run_id: result.run_id, attempts: attempt + 1 };
      }

      tracing::warn!(
        run_id = %result.run_id,
        attempt = attempt + 1,
        error = result.error.as_deref().unwrap_or("unknown"),
        "scrape attempt failed"
      );
      if attempt + 1 == total {
        break;
      }

      let delay = self.config.backoff(attempt);
      tracing::info!(delay_secs = delay.as_secs_f64(), "retrying after backoff");
      tokio::select! {
        _ = stopped(shutdown) => {
          return CycleOutcome::Cancelled { attempts: attempt + 1 };
        }
        _ = tokio::time::sleep(delay) => {}
      }
    }
    CycleOutcome::GaveUp { attempts: total }
  }
}

/// Resolves once shutdown is requested or its sender is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
  let _ = shutdown.wait_for(|stop| *stop).await;
}
