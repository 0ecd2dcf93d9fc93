//! The `ChatStore` trait.
//!
//! Implemented by storage backends (e.g. `chatlog-store-sqlite`). The run
//! controller, scheduler, and HTTP layer depend on this abstraction, not on a
//! concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  message::{ChannelSummary, ChatMessage, MessageQuery, NewMessage},
  page::Page,
  run::{NewRun, RunId, RunUpdate, ScrapeRun},
  target::{NewTarget, TargetChat, TargetFilter, TargetUpdate},
};

// ─── Error contract ──────────────────────────────────────────────────────────

/// Backend errors must say whether they represent a natural-key conflict.
///
/// The HTTP layer maps a conflict to `409` and everything else to `500`
/// without knowing which backend produced it.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// The conflicting value, if this error is a duplicate-key conflict.
  fn conflict(&self) -> Option<&str>;
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a chatlog store backend.
///
/// Nothing is ever physically removed: deletion sets a `deleted_at` marker
/// and every read path hides marked rows unless told otherwise.
///
/// All methods return `Send` futures so the trait can be used from a
/// multi-threaded runtime (axum, spawned tasks).
pub trait ChatStore: Send + Sync {
  type Error: StoreError;

  // ── Runs ──────────────────────────────────────────────────────────────

  /// Persist a new run in status `running`.
  fn create_run(
    &self,
    run: NewRun,
  ) -> impl Future<Output = Result<ScrapeRun, Self::Error>> + Send + '_;

  /// Apply a partial update. Returns `false` if the run does not exist.
  fn update_run(
    &self,
    id: RunId,
    update: RunUpdate,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Fetch a non-deleted run.
  fn get_run(
    &self,
    id: RunId,
  ) -> impl Future<Output = Result<Option<ScrapeRun>, Self::Error>> + Send + '_;

  /// Non-deleted runs, newest first.
  fn list_runs(
    &self,
    page: Page,
  ) -> impl Future<Output = Result<Vec<ScrapeRun>, Self::Error>> + Send + '_;

  fn soft_delete_run(
    &self,
    id: RunId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Messages ──────────────────────────────────────────────────────────

  /// Idempotent batch upsert keyed on `(channel, timestamp, sender, text)`.
  ///
  /// New keys are inserted; existing keys only have their owning run, raw
  /// payload and `updated_at` refreshed. Returns the number of rows written.
  fn upsert_messages(
    &self,
    run_id: RunId,
    messages: Vec<NewMessage>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// The newest non-deleted message timestamp in `channel`, if any.
  ///
  /// This is the boundary for incremental collection.
  fn latest_timestamp(
    &self,
    channel: String,
  ) -> impl Future<Output = Result<Option<DateTime<Utc>>, Self::Error>> + Send + '_;

  /// Messages ordered by timestamp, newest first.
  fn list_messages(
    &self,
    query: MessageQuery,
  ) -> impl Future<Output = Result<Vec<ChatMessage>, Self::Error>> + Send + '_;

  fn get_message(
    &self,
    id: i64,
    include_deleted: bool,
  ) -> impl Future<Output = Result<Option<ChatMessage>, Self::Error>> + Send + '_;

  /// Text match over non-deleted message bodies, newest first.
  fn search_messages(
    &self,
    text: String,
    page: Page,
  ) -> impl Future<Output = Result<Vec<ChatMessage>, Self::Error>> + Send + '_;

  /// Returns `false` if the message is absent or already deleted.
  fn soft_delete_message(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn list_channels(
    &self,
  ) -> impl Future<Output = Result<Vec<ChannelSummary>, Self::Error>> + Send + '_;

  // ── Targets ───────────────────────────────────────────────────────────

  /// Register a target. A live target with the same name is a conflict.
  fn create_target(
    &self,
    target: NewTarget,
  ) -> impl Future<Output = Result<TargetChat, Self::Error>> + Send + '_;

  fn get_target(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<TargetChat>, Self::Error>> + Send + '_;

  /// Non-deleted targets ordered by priority descending, then name ascending.
  fn list_targets(
    &self,
    filter: TargetFilter,
  ) -> impl Future<Output = Result<Vec<TargetChat>, Self::Error>> + Send + '_;

  /// Returns `None` if the target does not exist or is deleted.
  fn update_target(
    &self,
    id: i64,
    update: TargetUpdate,
  ) -> impl Future<Output = Result<Option<TargetChat>, Self::Error>> + Send + '_;

  fn delete_target(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Record a completed collection pass: set `last_scraped_at` and add
  /// `collected` to the cumulative message count.
  fn record_target_scrape(
    &self,
    id: i64,
    at: DateTime<Utc>,
    collected: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}
