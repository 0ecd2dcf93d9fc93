//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings with millisecond
//! precision (`2024-05-01T10:15:00.123Z`), so `ORDER BY` and `MAX()` on the
//! text column follow time order and natural-key comparisons are exact.

use chatlog_core::{
  message::{ChannelSummary, ChatMessage},
  profile::Profile,
  run::{RunId, RunStatus, ScrapeRun},
  target::{ChatKind, TargetChat},
};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

fn decode_opt_json(s: Option<String>) -> Result<Option<serde_json::Value>> {
  Ok(s.as_deref().map(serde_json::from_str).transpose()?)
}

// ─── Runs ────────────────────────────────────────────────────────────────────

pub const RUN_COLUMNS: &str = "id, started_at, completed_at, profile, headless, status,
   message_count, error_message, log_path, video_path, trace_path, log_text,
   deleted_at";

/// Raw `scrape_runs` row straight out of SQLite.
pub struct RawRun {
  pub id:            String,
  pub started_at:    String,
  pub completed_at:  Option<String>,
  pub profile:       String,
  pub headless:      bool,
  pub status:        String,
  pub message_count: i64,
  pub error_message: Option<String>,
  pub log_path:      Option<String>,
  pub video_path:    Option<String>,
  pub trace_path:    Option<String>,
  pub log_text:      Option<String>,
  pub deleted_at:    Option<String>,
}

impl RawRun {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:            row.get(0)?,
      started_at:    row.get(1)?,
      completed_at:  row.get(2)?,
      profile:       row.get(3)?,
      headless:      row.get(4)?,
      status:        row.get(5)?,
      message_count: row.get(6)?,
      error_message: row.get(7)?,
      log_path:      row.get(8)?,
      video_path:    row.get(9)?,
      trace_path:    row.get(10)?,
      log_text:      row.get(11)?,
      deleted_at:    row.get(12)?,
    })
  }

  pub fn into_run(self) -> Result<ScrapeRun> {
    Ok(ScrapeRun {
      id:            RunId::parse(&self.id)?,
      started_at:    decode_dt(&self.started_at)?,
      completed_at:  decode_opt_dt(self.completed_at)?,
      profile:       self.profile.parse::<Profile>()?,
      headless:      self.headless,
      status:        self.status.parse::<RunStatus>()?,
      message_count: self.message_count,
      error_message: self.error_message,
      log_path:      self.log_path,
      video_path:    self.video_path,
      trace_path:    self.trace_path,
      log_text:      self.log_text,
      deleted_at:    decode_opt_dt(self.deleted_at)?,
    })
  }
}

// ─── Messages ────────────────────────────────────────────────────────────────

pub const MESSAGE_COLUMNS: &str = "id, sender, message_text, timestamp, channel_name,
   thread_id, scrape_run_id, raw_json, deleted_at, created_at, updated_at";

/// Raw `chat_messages` row.
pub struct RawMessage {
  pub id:            i64,
  pub sender:        String,
  pub message_text:  String,
  pub timestamp:     String,
  pub channel_name:  String,
  pub thread_id:     Option<String>,
  pub scrape_run_id: Option<String>,
  pub raw_json:      Option<String>,
  pub deleted_at:    Option<String>,
  pub created_at:    String,
  pub updated_at:    String,
}

impl RawMessage {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:            row.get(0)?,
      sender:        row.get(1)?,
      message_text:  row.get(2)?,
      timestamp:     row.get(3)?,
      channel_name:  row.get(4)?,
      thread_id:     row.get(5)?,
      scrape_run_id: row.get(6)?,
      raw_json:      row.get(7)?,
      deleted_at:    row.get(8)?,
      created_at:    row.get(9)?,
      updated_at:    row.get(10)?,
    })
  }

  pub fn into_message(self) -> Result<ChatMessage> {
    Ok(ChatMessage {
      id:            self.id,
      sender:        self.sender,
      message_text:  self.message_text,
      timestamp:     decode_dt(&self.timestamp)?,
      channel_name:  self.channel_name,
      thread_id:     self.thread_id,
      scrape_run_id: self.scrape_run_id.as_deref().map(RunId::parse).transpose()?,
      raw_json:      decode_opt_json(self.raw_json)?,
      deleted_at:    decode_opt_dt(self.deleted_at)?,
      created_at:    decode_dt(&self.created_at)?,
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw channel summary row.
pub struct RawChannel {
  pub channel_name:   String,
  pub message_count:  i64,
  pub last_timestamp: String,
  pub last_sender:    String,
  pub last_message:   String,
}

impl RawChannel {
  pub fn into_summary(self) -> Result<ChannelSummary> {
    Ok(ChannelSummary {
      channel_name:   self.channel_name,
      message_count:  self.message_count,
      last_timestamp: decode_dt(&self.last_timestamp)?,
      last_sender:    self.last_sender,
      last_message:   self.last_message,
    })
  }
}

// ─── Targets ─────────────────────────────────────────────────────────────────

pub const TARGET_COLUMNS: &str = "id, chat_name, chat_type, profile, is_active, priority,
   notes, last_scraped_at, message_count, created_at, updated_at, deleted_at";

/// Raw `target_chats` row.
pub struct RawTarget {
  pub id:              i64,
  pub chat_name:       String,
  pub chat_type:       String,
  pub profile:         Option<String>,
  pub is_active:       bool,
  pub priority:        i64,
  pub notes:           Option<String>,
  pub last_scraped_at: Option<String>,
  pub message_count:   i64,
  pub created_at:      String,
  pub updated_at:      String,
  pub deleted_at:      Option<String>,
}

impl RawTarget {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:              row.get(0)?,
      chat_name:       row.get(1)?,
      chat_type:       row.get(2)?,
      profile:         row.get(3)?,
      is_active:       row.get(4)?,
      priority:        row.get(5)?,
      notes:           row.get(6)?,
      last_scraped_at: row.get(7)?,
      message_count:   row.get(8)?,
      created_at:      row.get(9)?,
      updated_at:      row.get(10)?,
      deleted_at:      row.get(11)?,
    })
  }

  pub fn into_target(self) -> Result<TargetChat> {
    Ok(TargetChat {
      id:              self.id,
      chat_name:       self.chat_name,
      chat_type:       self.chat_type.parse::<ChatKind>()?,
      profile:         self.profile.as_deref().map(str::parse::<Profile>).transpose()?,
      is_active:       self.is_active,
      priority:        self.priority,
      notes:           self.notes,
      last_scraped_at: decode_opt_dt(self.last_scraped_at)?,
      message_count:   self.message_count,
      created_at:      decode_dt(&self.created_at)?,
      updated_at:      decode_dt(&self.updated_at)?,
      deleted_at:      decode_opt_dt(self.deleted_at)?,
    })
  }
}

// ─── LIKE patterns ───────────────────────────────────────────────────────────

/// Wrap `text` in `%…%`, escaping LIKE wildcards with `\`.
pub fn like_pattern(text: &str) -> String {
  let mut out = String::with_capacity(text.len() + 2);
  out.push('%');
  for c in text.chars() {
    if matches!(c, '%' | '_' | '\\') {
      out.push('\\');
    }
    out.push(c);
  }
  out.push('%');
  out
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn encoded_timestamps_are_fixed_width() {
    let whole = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    let frac = whole + chrono::Duration::milliseconds(5);
    assert_eq!(encode_dt(whole), "2024-05-01T10:00:00.000Z");
    assert_eq!(encode_dt(frac), "2024-05-01T10:00:00.005Z");
    assert!(encode_dt(whole) < encode_dt(frac));
  }

  #[test]
  fn decode_accepts_offsets() {
    let dt = decode_dt("2024-05-01T12:00:00+02:00").unwrap();
    assert_eq!(encode_dt(dt), "2024-05-01T10:00:00.000Z");
  }

  #[test]
  fn like_pattern_escapes_wildcards() {
    assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
  }
}
