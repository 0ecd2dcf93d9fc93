//! JSON REST API for the chatlog collector.
//!
//! Exposes an axum [`Router`] backed by any [`ChatStore`], plus read-only
//! access to run artifacts and, optionally, the dashboard's static files.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET` | `/health` | Liveness |
//! | `GET` | `/api` | Recent runs and messages |
//! | `GET` | `/api/messages` | `?limit&offset&channel&include_deleted` |
//! | `GET`, `DELETE` | `/api/messages/{id}` | |
//! | `GET` | `/api/search` | `?q&limit&offset`; 400 without `q` |
//! | `GET` | `/api/channels` | Channels with last-message preview |
//! | `GET` | `/api/runs` | `?limit&offset` |
//! | `GET`, `DELETE` | `/api/runs/{id}` | Detail includes artifact URLs |
//! | `GET` | `/api/runs/{id}/log` | Captured log text or log file |
//! | `GET`, `POST` | `/api/target-chats` | 409 on duplicate name |
//! | `GET`, `PUT`, `DELETE` | `/api/target-chats/{id}` | |
//! | `POST` | `/api/trigger-scrape` | Starts a run in the background |

pub mod error;
pub mod messages;
pub mod overview;
pub mod runs;
pub mod targets;
pub mod trigger;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use chatlog_core::store::ChatStore;
use chatlog_scraper::{Settings, launcher::RunLauncher};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

pub use error::ApiError;

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<S, L> {
  pub store:    Arc<S>,
  /// Starts out-of-band runs for `/api/trigger-scrape`.
  pub launcher: Arc<L>,
  pub settings: Arc<Settings>,
}

impl<S, L> Clone for AppState<S, L> {
  fn clone(&self) -> Self {
    Self {
      store:    self.store.clone(),
      launcher: self.launcher.clone(),
      settings: self.settings.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API router plus artifact and dashboard file serving.
pub fn router<S, L>(state: AppState<S, L>) -> Router
where
  S: ChatStore + 'static,
  L: RunLauncher + 'static,
{
  let settings = state.settings.clone();

  let api = Router::new()
    .route("/health", get(overview::health::<S, L>))
    .route("/api", get(overview::summary::<S, L>))
    // Messages
    .route("/api/messages", get(messages::list::<S, L>))
    .route(
      "/api/messages/{id}",
      get(messages::get_one::<S, L>).delete(messages::delete_one::<S, L>),
    )
    .route("/api/search", get(messages::search::<S, L>))
    .route("/api/channels", get(messages::channels::<S, L>))
    // Runs
    .route("/api/runs", get(runs::list::<S, L>))
    .route(
      "/api/runs/{id}",
      get(runs::get_one::<S, L>).delete(runs::delete_one::<S, L>),
    )
    .route("/api/runs/{id}/log", get(runs::log::<S, L>))
    // Targets
    .route(
      "/api/target-chats",
      get(targets::list::<S, L>).post(targets::create::<S, L>),
    )
    .route(
      "/api/target-chats/{id}",
      get(targets::get_one::<S, L>)
        .put(targets::update::<S, L>)
        .delete(targets::delete_one::<S, L>),
    )
    .route("/api/trigger-scrape", post(trigger::trigger::<S, L>))
    .with_state(state);

  let mut app = api
    .nest_service("/artifacts/logs", ServeDir::new(&settings.logs_dir))
    .nest_service("/artifacts/data", ServeDir::new(&settings.data_dir));
  app = match &settings.static_dir {
    Some(dir) => app.fallback_service(ServeDir::new(dir)),
    None => app.fallback(|| async { ApiError::NotFound("endpoint not found".into()) }),
  };

  app
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive())
}
