//! Handlers for scrape runs and their captured logs.

use axum::{
  Json,
  extract::{
    Path, Query, State,
    rejection::{PathRejection, QueryRejection},
  },
};
use chatlog_core::{page::Page, run::RunId, store::ChatStore};
use chatlog_scraper::launcher::RunLauncher;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{ApiError, AppState};

const DEFAULT_LIMIT: i64 = 20;

fn parse_id(raw: &str) -> Result<RunId, ApiError> {
  RunId::parse(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Relative artifact path to the URL it is served under.
fn artifact_url(path: Option<&str>) -> Option<String> {
  path.map(|p| format!("/artifacts{p}"))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub limit:  Option<i64>,
  pub offset: Option<i64>,
}

/// `GET /api/runs[?limit&offset]`
pub async fn list<S, L>(
  State(state): State<AppState<S, L>>,
  params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError>
where
  S: ChatStore,
  L: RunLauncher,
{
  let Query(params) = params?;
  let page = Page::from_params(params.limit, params.offset, DEFAULT_LIMIT);
  let runs = state.store.list_runs(page).await.map_err(ApiError::store)?;

  Ok(Json(json!({
    "count": runs.len(),
    "limit": page.limit(),
    "offset": page.offset(),
    "runs": runs,
  })))
}

/// `GET /api/runs/{id}`: the run plus URLs for its artifacts.
pub async fn get_one<S, L>(
  State(state): State<AppState<S, L>>,
  id: Result<Path<String>, PathRejection>,
) -> Result<Json<Value>, ApiError>
where
  S: ChatStore,
  L: RunLauncher,
{
  let Path(id) = id?;
  let id = parse_id(&id)?;
  let run = state
    .store
    .get_run(id.clone())
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("run {id} not found")))?;

  let artifacts = json!({
    "log": artifact_url(run.log_path.as_deref()),
    "video": artifact_url(run.video_path.as_deref()),
    "trace": artifact_url(run.trace_path.as_deref()),
  });
  let mut body = json!(run);
  if let Value::Object(map) = &mut body {
    map.insert("artifacts".to_owned(), artifacts);
  }
  Ok(Json(body))
}

/// `GET /api/runs/{id}/log`
///
/// Prefers the output captured in the database and falls back to the log
/// file the run wrote itself.
pub async fn log<S, L>(
  State(state): State<AppState<S, L>>,
  id: Result<Path<String>, PathRejection>,
) -> Result<Json<Value>, ApiError>
where
  S: ChatStore,
  L: RunLauncher,
{
  let Path(id) = id?;
  let id = parse_id(&id)?;
  let run = state
    .store
    .get_run(id.clone())
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("run {id} not found")))?;

  if let Some(text) = run.log_text.filter(|t| !t.is_empty()) {
    return Ok(Json(json!({ "run_id": id, "source": "database", "log": text })));
  }

  let path = state.settings.logs_dir.join(format!("{id}.log"));
  match tokio::fs::read_to_string(&path).await {
    Ok(text) => Ok(Json(json!({ "run_id": id, "source": "file", "log": text }))),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      Err(ApiError::NotFound(format!("no log recorded for run {id}")))
    }
    Err(e) => Err(e.into()),
  }
}

/// `DELETE /api/runs/{id}`: soft delete.
pub async fn delete_one<S, L>(
  State(state): State<AppState<S, L>>,
  id: Result<Path<String>, PathRejection>,
) -> Result<Json<Value>, ApiError>
where
  S: ChatStore,
  L: RunLauncher,
{
  let Path(id) = id?;
  let id = parse_id(&id)?;
  let deleted = state
    .store
    .soft_delete_run(id.clone())
    .await
    .map_err(ApiError::store)?;
  if !deleted {
    return Err(ApiError::NotFound(format!("run {id} not found")));
  }
  Ok(Json(json!({ "status": "deleted", "id": id })))
}
