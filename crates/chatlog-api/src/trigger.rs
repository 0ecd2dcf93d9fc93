//! `POST /api/trigger-scrape`: start a run outside the schedule.

use axum::{Json, body::Bytes, extract::State};
use chatlog_core::{profile::Profile, run::RunId, store::ChatStore};
use chatlog_scraper::{launcher::RunLauncher, scheduler::run_attempt};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{ApiError, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct TriggerBody {
  pub profile: Option<String>,
}

/// Accepts an optional `{"profile": "..."}` body.
///
/// The run is launched in the background and always headless; the response
/// carries the id to poll `/api/runs/{id}` with.
pub async fn trigger<S, L>(
  State(state): State<AppState<S, L>>,
  body: Bytes,
) -> Result<Json<Value>, ApiError>
where
  S: ChatStore + 'static,
  L: RunLauncher + 'static,
{
  let body: TriggerBody = if body.iter().all(u8::is_ascii_whitespace) {
    TriggerBody::default()
  } else {
    serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
  };
  let profile = match body.profile {
    Some(p) => p
      .parse::<Profile>()
      .map_err(|e| ApiError::BadRequest(e.to_string()))?,
    None => state.settings.profile,
  };

  let run_id = RunId::generate(profile, Utc::now());
  tracing::info!(run_id = %run_id, %profile, "manual scrape triggered");

  let store = state.store.clone();
  let launcher = state.launcher.clone();
  let id = run_id.clone();
  tokio::spawn(async move {
    let result = run_attempt(store.as_ref(), launcher.as_ref(), id, profile, true).await;
    match &result.error {
      None => tracing::info!(run_id = %result.run_id, "manual scrape finished"),
      Some(e) => tracing::warn!(run_id = %result.run_id, error = %e, "manual scrape failed"),
    }
  });

  Ok(Json(json!({
    "status": "accepted",
    "run_id": run_id,
    "profile": profile,
  })))
}
