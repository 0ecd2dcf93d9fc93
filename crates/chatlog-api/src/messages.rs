//! Handlers for messages, search, and channels.

use axum::{
  Json,
  extract::{
    Path, Query, State,
    rejection::{PathRejection, QueryRejection},
  },
};
use chatlog_core::{message::MessageQuery, page::Page, store::ChatStore};
use chatlog_scraper::launcher::RunLauncher;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{ApiError, AppState};

const DEFAULT_LIMIT: i64 = 50;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub limit:           Option<i64>,
  pub offset:          Option<i64>,
  pub channel:         Option<String>,
  #[serde(default)]
  pub include_deleted: bool,
}

/// `GET /api/messages[?limit&offset&channel&include_deleted]`
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
  let channel = params.channel.filter(|c| !c.is_empty());

  let messages = state
    .store
    .list_messages(MessageQuery {
      page,
      channel: channel.clone(),
      include_deleted: params.include_deleted,
    })
    .await
    .map_err(ApiError::store)?;

  Ok(Json(json!({
    "count": messages.len(),
    "limit": page.limit(),
    "offset": page.offset(),
    "filters": {
      "channel": channel,
      "include_deleted": params.include_deleted,
    },
    "messages": messages,
  })))
}

// ─── Get / delete one ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GetParams {
  #[serde(default)]
  pub include_deleted: bool,
}

/// `GET /api/messages/{id}[?include_deleted]`
pub async fn get_one<S, L>(
  State(state): State<AppState<S, L>>,
  id: Result<Path<i64>, PathRejection>,
  params: Result<Query<GetParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError>
where
  S: ChatStore,
  L: RunLauncher,
{
  let Path(id) = id?;
  let Query(params) = params?;
  let message = state
    .store
    .get_message(id, params.include_deleted)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("message {id} not found")))?;
  Ok(Json(json!(message)))
}

/// `DELETE /api/messages/{id}`: soft delete.
pub async fn delete_one<S, L>(
  State(state): State<AppState<S, L>>,
  id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Value>, ApiError>
where
  S: ChatStore,
  L: RunLauncher,
{
  let Path(id) = id?;
  let deleted = state
    .store
    .soft_delete_message(id)
    .await
    .map_err(ApiError::store)?;
  if !deleted {
    return Err(ApiError::NotFound(format!("message {id} not found")));
  }
  Ok(Json(json!({ "status": "deleted", "id": id })))
}

// ─── Search ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SearchParams {
  pub q:      Option<String>,
  pub limit:  Option<i64>,
  pub offset: Option<i64>,
}

/// `GET /api/search?q=<text>[&limit&offset]`
pub async fn search<S, L>(
  State(state): State<AppState<S, L>>,
  params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError>
where
  S: ChatStore,
  L: RunLauncher,
{
  let Query(params) = params?;
  let query = params
    .q
    .filter(|q| !q.trim().is_empty())
    .ok_or_else(|| ApiError::BadRequest("query parameter \"q\" is required".into()))?;
  let page = Page::from_params(params.limit, params.offset, DEFAULT_LIMIT);

  let results = state
    .store
    .search_messages(query.clone(), page)
    .await
    .map_err(ApiError::store)?;

  Ok(Json(json!({
    "query": query,
    "count": results.len(),
    "results": results,
  })))
}

// ─── Channels ─────────────────────────────────────────────────────────────────

/// `GET /api/channels`
pub async fn channels<S, L>(State(state): State<AppState<S, L>>) -> Result<Json<Value>, ApiError>
where
  S: ChatStore,
  L: RunLauncher,
{
  let channels = state.store.list_channels().await.map_err(ApiError::store)?;
  Ok(Json(json!({ "count": channels.len(), "channels": channels })))
}
