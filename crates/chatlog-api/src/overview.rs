//! `/health` and the `/api` overview.

use axum::{Json, extract::State};
use chatlog_core::{message::MessageQuery, page::Page, store::ChatStore};
use chatlog_scraper::launcher::RunLauncher;
use chrono::Utc;
use serde_json::{Value, json};

use crate::{ApiError, AppState};

/// Items shown per section of the overview.
const RECENT: i64 = 10;

/// `GET /health`
pub async fn health<S, L>(State(state): State<AppState<S, L>>) -> Json<Value>
where
  S: ChatStore,
  L: RunLauncher,
{
  Json(json!({
    "status": "ok",
    "timestamp": Utc::now(),
    "port": state.settings.port,
  }))
}

/// `GET /api`: the latest runs and messages.
pub async fn summary<S, L>(State(state): State<AppState<S, L>>) -> Result<Json<Value>, ApiError>
where
  S: ChatStore,
  L: RunLauncher,
{
  let runs = state
    .store
    .list_runs(Page::new(RECENT, 0))
    .await
    .map_err(ApiError::store)?;
  let messages = state
    .store
    .list_messages(MessageQuery { page: Page::new(RECENT, 0), ..MessageQuery::default() })
    .await
    .map_err(ApiError::store)?;

  Ok(Json(json!({
    "status": "ok",
    "summary": {
      "recent_runs": runs.len(),
      "recent_messages": messages.len(),
    },
    "runs": runs,
    "messages": messages,
  })))
}
