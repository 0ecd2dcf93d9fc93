//! [`SqliteStore`], the SQLite implementation of [`ChatStore`].

use std::path::Path;

use chatlog_core::{
  message::{ChannelSummary, ChatMessage, MessageQuery, NewMessage},
  page::Page,
  run::{NewRun, RunId, RunStatus, RunUpdate, ScrapeRun},
  store::ChatStore,
  target::{NewTarget, TargetChat, TargetFilter, TargetUpdate},
};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;

use crate::{
  Error, Result,
  encode::{
    MESSAGE_COLUMNS, RUN_COLUMNS, RawChannel, RawMessage, RawRun, RawTarget,
    TARGET_COLUMNS, decode_dt, encode_dt, like_pattern,
  },
  schema::SCHEMA,
};

/// `true` if `err` is a UNIQUE constraint violation.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
  matches!(
    err,
    rusqlite::Error::SqliteFailure(e, _)
      if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
  )
}

/// A message with every column already encoded, ready to cross into the
/// database thread.
struct EncodedMessage {
  sender:       String,
  message_text: String,
  timestamp:    String,
  channel_name: String,
  thread_id:    Option<String>,
  raw_json:     Option<String>,
}

impl EncodedMessage {
  fn encode(message: NewMessage) -> Result<Self> {
    let message = message.normalized();
    let raw_json = if message.raw.is_null() {
      None
    } else {
      Some(serde_json::to_string(&message.raw)?)
    };
    Ok(Self {
      sender: message.sender,
      message_text: message.message_text,
      timestamp: encode_dt(message.timestamp),
      channel_name: message.channel_name,
      thread_id: message.thread_id,
      raw_json,
    })
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A chatlog store backed by a single SQLite file.
///
/// Clones share the inner connection.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Close the underlying connection, flushing pending work.
  pub async fn close(self) -> Result<()> {
    self.conn.close().await?;
    Ok(())
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn fetch_target(&self, id: i64) -> Result<Option<TargetChat>> {
    let raw: Option<RawTarget> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {TARGET_COLUMNS} FROM target_chats
                 WHERE id = ?1 AND deleted_at IS NULL"
              ),
              rusqlite::params![id],
              RawTarget::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawTarget::into_target).transpose()
  }
}

// ─── ChatStore impl ──────────────────────────────────────────────────────────

impl ChatStore for SqliteStore {
  type Error = Error;

  // ── Runs ──────────────────────────────────────────────────────────────────

  async fn create_run(&self, run: NewRun) -> Result<ScrapeRun> {
    let id_str      = run.id.to_string();
    let started_str = encode_dt(run.started_at);
    let profile_str = run.profile.as_str();
    let headless    = run.headless;
    let status_str  = RunStatus::Running.as_str();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO scrape_runs (id, started_at, profile, headless, status)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, started_str, profile_str, headless, status_str],
        )?;
        Ok(())
      })
      .await?;

    tracing::debug!(run_id = %run.id, "created scrape run");

    Ok(ScrapeRun {
      id:            run.id,
      started_at:    run.started_at,
      completed_at:  None,
      profile:       run.profile,
      headless:      run.headless,
      status:        RunStatus::Running,
      message_count: 0,
      error_message: None,
      log_path:      None,
      video_path:    None,
      trace_path:    None,
      log_text:      None,
      deleted_at:    None,
    })
  }

  async fn update_run(&self, id: RunId, update: RunUpdate) -> Result<bool> {
    let id_str        = id.to_string();
    let status_str    = update.status.map(RunStatus::as_str);
    let completed_str = update.completed_at.map(encode_dt);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE scrape_runs SET
             status        = COALESCE(?1, status),
             completed_at  = COALESCE(?2, completed_at),
             message_count = COALESCE(?3, message_count),
             error_message = COALESCE(?4, error_message),
             log_path      = COALESCE(?5, log_path),
             video_path    = COALESCE(?6, video_path),
             trace_path    = COALESCE(?7, trace_path),
             log_text      = COALESCE(?8, log_text)
           WHERE id = ?9",
          rusqlite::params![
            status_str,
            completed_str,
            update.message_count,
            update.error_message,
            update.log_path,
            update.video_path,
            update.trace_path,
            update.log_text,
            id_str,
          ],
        )?)
      })
      .await?;

    tracing::debug!(run_id = %id, status = ?update.status, changed, "updated scrape run");
    Ok(changed > 0)
  }

  async fn get_run(&self, id: RunId) -> Result<Option<ScrapeRun>> {
    let id_str = id.to_string();

    let raw: Option<RawRun> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {RUN_COLUMNS} FROM scrape_runs
                 WHERE id = ?1 AND deleted_at IS NULL"
              ),
              rusqlite::params![id_str],
              RawRun::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRun::into_run).transpose()
  }

  async fn list_runs(&self, page: Page) -> Result<Vec<ScrapeRun>> {
    let (limit, offset) = (page.limit(), page.offset());

    let raws: Vec<RawRun> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {RUN_COLUMNS} FROM scrape_runs
           WHERE deleted_at IS NULL
           ORDER BY started_at DESC, id DESC
           LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![limit, offset], RawRun::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRun::into_run).collect()
  }

  async fn soft_delete_run(&self, id: RunId) -> Result<bool> {
    let id_str = id.to_string();
    let now    = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE scrape_runs SET deleted_at = ?1
           WHERE id = ?2 AND deleted_at IS NULL",
          rusqlite::params![now, id_str],
        )?)
      })
      .await?;

    Ok(changed > 0)
  }

  // ── Messages ──────────────────────────────────────────────────────────────

  async fn upsert_messages(
    &self,
    run_id:   RunId,
    messages: Vec<NewMessage>,
  ) -> Result<usize> {
    if messages.is_empty() {
      return Ok(0);
    }

    let encoded = messages
      .into_iter()
      .map(EncodedMessage::encode)
      .collect::<Result<Vec<_>>>()?;
    let run_str = run_id.to_string();
    let now     = encode_dt(Utc::now());

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut written = 0;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO chat_messages (
               sender, message_text, timestamp, channel_name, thread_id,
               scrape_run_id, raw_json, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
             ON CONFLICT (channel_name, timestamp, sender, message_text)
             DO UPDATE SET
               scrape_run_id = excluded.scrape_run_id,
               raw_json      = excluded.raw_json,
               updated_at    = excluded.updated_at",
          )?;
          for m in &encoded {
            written += stmt.execute(rusqlite::params![
              m.sender,
              m.message_text,
              m.timestamp,
              m.channel_name,
              m.thread_id,
              run_str,
              m.raw_json,
              now,
            ])?;
          }
        }
        tx.commit()?;
        Ok(written)
      })
      .await?;

    tracing::info!(run_id = %run_id, written, "upserted chat messages");
    Ok(written)
  }

  async fn latest_timestamp(&self, channel: String) -> Result<Option<DateTime<Utc>>> {
    let latest: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT MAX(timestamp) FROM chat_messages
           WHERE channel_name = ?1 AND deleted_at IS NULL",
          rusqlite::params![channel],
          |row| row.get(0),
        )?)
      })
      .await?;

    latest.as_deref().map(decode_dt).transpose()
  }

  async fn list_messages(&self, query: MessageQuery) -> Result<Vec<ChatMessage>> {
    let channel         = query.channel;
    let include_deleted = query.include_deleted;
    let (limit, offset) = (query.page.limit(), query.page.offset());

    let raws: Vec<RawMessage> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {MESSAGE_COLUMNS} FROM chat_messages
           WHERE (?1 IS NULL OR channel_name = ?1)
             AND (?2 OR deleted_at IS NULL)
           ORDER BY timestamp DESC, id DESC
           LIMIT ?3 OFFSET ?4"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![channel, include_deleted, limit, offset],
            RawMessage::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMessage::into_message).collect()
  }

  async fn get_message(&self, id: i64, include_deleted: bool) -> Result<Option<ChatMessage>> {
    let raw: Option<RawMessage> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {MESSAGE_COLUMNS} FROM chat_messages
                 WHERE id = ?1 AND (?2 OR deleted_at IS NULL)"
              ),
              rusqlite::params![id, include_deleted],
              RawMessage::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawMessage::into_message).transpose()
  }

  async fn search_messages(&self, text: String, page: Page) -> Result<Vec<ChatMessage>> {
    let pattern         = like_pattern(&text);
    let (limit, offset) = (page.limit(), page.offset());

    let raws: Vec<RawMessage> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {MESSAGE_COLUMNS} FROM chat_messages
           WHERE message_text LIKE ?1 ESCAPE '\\'
             AND deleted_at IS NULL
           ORDER BY timestamp DESC, id DESC
           LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![pattern, limit, offset], RawMessage::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMessage::into_message).collect()
  }

  async fn soft_delete_message(&self, id: i64) -> Result<bool> {
    let now = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE chat_messages SET deleted_at = ?1, updated_at = ?1
           WHERE id = ?2 AND deleted_at IS NULL",
          rusqlite::params![now, id],
        )?)
      })
      .await?;

    if changed > 0 {
      tracing::info!(message_id = id, "soft-deleted message");
    }
    Ok(changed > 0)
  }

  async fn list_channels(&self) -> Result<Vec<ChannelSummary>> {
    let raws: Vec<RawChannel> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT c.channel_name, c.message_count, c.last_timestamp,
                  m.sender, m.message_text
           FROM (
             SELECT channel_name,
                    COUNT(*)       AS message_count,
                    MAX(timestamp) AS last_timestamp
             FROM chat_messages
             WHERE deleted_at IS NULL
             GROUP BY channel_name
           ) c
           JOIN chat_messages m ON m.id = (
             SELECT id FROM chat_messages
             WHERE channel_name = c.channel_name AND deleted_at IS NULL
             ORDER BY timestamp DESC, id DESC
             LIMIT 1
           )
           ORDER BY c.last_timestamp DESC, c.channel_name ASC",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawChannel {
              channel_name:   row.get(0)?,
              message_count:  row.get(1)?,
              last_timestamp: row.get(2)?,
              last_sender:    row.get(3)?,
              last_message:   row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawChannel::into_summary).collect()
  }

  // ── Targets ───────────────────────────────────────────────────────────────

  async fn create_target(&self, target: NewTarget) -> Result<TargetChat> {
    let name        = target.chat_name.clone();
    let kind_str    = target.chat_type.as_str();
    let profile_str = target.profile.map(|p| p.as_str());
    let now         = encode_dt(Utc::now());

    let inserted: Option<i64> = self
      .conn
      .call(move |conn| {
        let result = conn.execute(
          "INSERT INTO target_chats (
             chat_name, chat_type, profile, is_active, priority, notes,
             created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
          rusqlite::params![
            target.chat_name,
            kind_str,
            profile_str,
            target.is_active,
            target.priority,
            target.notes,
            now,
          ],
        );
        match result {
          Ok(_) => Ok(Some(conn.last_insert_rowid())),
          Err(e) if is_unique_violation(&e) => Ok(None),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    let id = inserted.ok_or_else(|| Error::DuplicateTarget(name.clone()))?;
    tracing::info!(target_id = id, chat_name = %name, "registered target chat");

    self
      .fetch_target(id)
      .await?
      .ok_or(Error::Database(tokio_rusqlite::Error::Rusqlite(
        rusqlite::Error::QueryReturnedNoRows,
      )))
  }

  async fn get_target(&self, id: i64) -> Result<Option<TargetChat>> {
    self.fetch_target(id).await
  }

  async fn list_targets(&self, filter: TargetFilter) -> Result<Vec<TargetChat>> {
    let active_only = filter.active_only;
    let profile_str = filter.profile.map(|p| p.as_str());

    let raws: Vec<RawTarget> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {TARGET_COLUMNS} FROM target_chats
           WHERE deleted_at IS NULL
             AND (NOT ?1 OR is_active = 1)
             AND (?2 IS NULL OR profile IS NULL OR profile = ?2)
           ORDER BY priority DESC, chat_name ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![active_only, profile_str], RawTarget::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTarget::into_target).collect()
  }

  async fn update_target(&self, id: i64, update: TargetUpdate) -> Result<Option<TargetChat>> {
    let new_name    = update.chat_name.clone();
    let kind_str    = update.chat_type.map(|k| k.as_str());
    let set_profile = update.profile.is_some();
    let profile_str = update.profile.flatten().map(|p| p.as_str());
    let set_notes   = update.notes.is_some();
    let notes       = update.notes.flatten();
    let now         = encode_dt(Utc::now());

    let outcome: Option<usize> = self
      .conn
      .call(move |conn| {
        let result = conn.execute(
          "UPDATE target_chats SET
             chat_name  = COALESCE(?1, chat_name),
             chat_type  = COALESCE(?2, chat_type),
             profile    = CASE WHEN ?9 THEN ?3 ELSE profile END,
             is_active  = COALESCE(?4, is_active),
             priority   = COALESCE(?5, priority),
             notes      = CASE WHEN ?10 THEN ?6 ELSE notes END,
             updated_at = ?7
           WHERE id = ?8 AND deleted_at IS NULL",
          rusqlite::params![
            update.chat_name,
            kind_str,
            profile_str,
            update.is_active,
            update.priority,
            notes,
            now,
            id,
            set_profile,
            set_notes,
          ],
        );
        match result {
          Ok(changed) => Ok(Some(changed)),
          Err(e) if is_unique_violation(&e) => Ok(None),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    match outcome {
      None => Err(Error::DuplicateTarget(new_name.unwrap_or_default())),
      Some(0) => Ok(None),
      Some(_) => self.fetch_target(id).await,
    }
  }

  async fn delete_target(&self, id: i64) -> Result<bool> {
    let now = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE target_chats SET deleted_at = ?1, updated_at = ?1
           WHERE id = ?2 AND deleted_at IS NULL",
          rusqlite::params![now, id],
        )?)
      })
      .await?;

    if changed > 0 {
      tracing::info!(target_id = id, "soft-deleted target chat");
    }
    Ok(changed > 0)
  }

  async fn record_target_scrape(
    &self,
    id:        i64,
    at:        DateTime<Utc>,
    collected: i64,
  ) -> Result<bool> {
    let at_str = encode_dt(at);
    let now    = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE target_chats SET
             last_scraped_at = ?1,
             message_count   = message_count + ?2,
             updated_at      = ?3
           WHERE id = ?4 AND deleted_at IS NULL",
          rusqlite::params![at_str, collected, now, id],
        )?)
      })
      .await?;

    Ok(changed > 0)
  }
}
