//! Handlers for the target chat registry.

use axum::{
  Json,
  extract::{
    Path, Query, State,
    rejection::{JsonRejection, PathRejection, QueryRejection},
  },
  http::StatusCode,
};
use chatlog_core::{
  profile::Profile,
  store::ChatStore,
  target::{ChatKind, NewTarget, TargetChat, TargetFilter, TargetUpdate},
};
use chatlog_scraper::launcher::RunLauncher;
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};

use crate::{ApiError, AppState};

fn not_found(id: i64) -> ApiError { ApiError::NotFound(format!("target chat {id} not found")) }

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  #[serde(default)]
  pub active_only: bool,
  pub profile:     Option<Profile>,
}

/// `GET /api/target-chats[?active_only&profile]`
pub async fn list<S, L>(
  State(state): State<AppState<S, L>>,
  params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError>
where
  S: ChatStore,
  L: RunLauncher,
{
  let Query(params) = params?;
  let targets = state
    .store
    .list_targets(TargetFilter {
      active_only: params.active_only,
      profile:     params.profile,
    })
    .await
    .map_err(ApiError::store)?;
  Ok(Json(json!({ "count": targets.len(), "target_chats": targets })))
}

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub chat_name: Option<String>,
  pub chat_type: Option<ChatKind>,
  pub profile:   Option<Profile>,
  pub is_active: Option<bool>,
  pub priority:  Option<i64>,
  pub notes:     Option<String>,
}

/// `POST /api/target-chats`
pub async fn create<S, L>(
  State(state): State<AppState<S, L>>,
  body: Result<Json<CreateBody>, JsonRejection>,
) -> Result<(StatusCode, Json<TargetChat>), ApiError>
where
  S: ChatStore,
  L: RunLauncher,
{
  let Json(body) = body?;
  let name = body
    .chat_name
    .map(|n| n.trim().to_owned())
    .filter(|n| !n.is_empty())
    .ok_or_else(|| ApiError::BadRequest("chat_name is required".into()))?;

  let mut target = NewTarget::new(name);
  target.profile = body.profile;
  target.notes = body.notes;
  if let Some(kind) = body.chat_type {
    target.chat_type = kind;
  }
  if let Some(active) = body.is_active {
    target.is_active = active;
  }
  if let Some(priority) = body.priority {
    target.priority = priority;
  }

  let created = state
    .store
    .create_target(target)
    .await
    .map_err(ApiError::store)?;
  tracing::info!(id = created.id, chat_name = %created.chat_name, "target chat registered");
  Ok((StatusCode::CREATED, Json(created)))
}

// ─── Get / update / delete ────────────────────────────────────────────────────

/// `GET /api/target-chats/{id}`
pub async fn get_one<S, L>(
  State(state): State<AppState<S, L>>,
  id: Result<Path<i64>, PathRejection>,
) -> Result<Json<TargetChat>, ApiError>
where
  S: ChatStore,
  L: RunLauncher,
{
  let Path(id) = id?;
  state
    .store
    .get_target(id)
    .await
    .map_err(ApiError::store)?
    .map(Json)
    .ok_or_else(|| not_found(id))
}

/// Absent fields are kept; `null` clears `profile` and `notes`.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateBody {
  pub chat_name: Option<String>,
  pub chat_type: Option<ChatKind>,
  #[serde(default, deserialize_with = "nullable")]
  pub profile:   Option<Option<Profile>>,
  pub is_active: Option<bool>,
  pub priority:  Option<i64>,
  #[serde(default, deserialize_with = "nullable")]
  pub notes:     Option<Option<String>>,
}

/// Tell an explicit `null` (`Some(None)`) apart from a missing field (`None`).
fn nullable<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
  T: Deserialize<'de>,
  D: Deserializer<'de>,
{
  Option::<T>::deserialize(de).map(Some)
}

/// `PUT /api/target-chats/{id}`
pub async fn update<S, L>(
  State(state): State<AppState<S, L>>,
  id: Result<Path<i64>, PathRejection>,
  body: Result<Json<UpdateBody>, JsonRejection>,
) -> Result<Json<TargetChat>, ApiError>
where
  S: ChatStore,
  L: RunLauncher,
{
  let Path(id) = id?;
  let Json(body) = body?;
  let chat_name = match body.chat_name {
    Some(name) if name.trim().is_empty() => {
      return Err(ApiError::BadRequest("chat_name must not be empty".into()));
    }
    other => other.map(|n| n.trim().to_owned()),
  };

  let update = TargetUpdate {
    chat_name,
    chat_type: body.chat_type,
    profile: body.profile,
    is_active: body.is_active,
    priority: body.priority,
    notes: body.notes,
  };
  state
    .store
    .update_target(id, update)
    .await
    .map_err(ApiError::store)?
    .map(Json)
    .ok_or_else(|| not_found(id))
}

/// `DELETE /api/target-chats/{id}`: soft delete.
pub async fn delete_one<S, L>(
  State(state): State<AppState<S, L>>,
  id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Value>, ApiError>
where
  S: ChatStore,
  L: RunLauncher,
{
  let Path(id) = id?;
  if !state.store.delete_target(id).await.map_err(ApiError::store)? {
    return Err(not_found(id));
  }
  Ok(Json(json!({ "status": "deleted", "id": id })))
}
