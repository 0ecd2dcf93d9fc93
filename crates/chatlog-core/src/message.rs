//! Chat messages and channel summaries.
//!
//! A message's identity is its natural key `(channel_name, timestamp, sender,
//! message_text)`. Re-submitting a message with the same key updates the
//! existing row instead of inserting a duplicate.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::{page::Page, run::RunId};

/// Fallback for messages whose sender or channel could not be determined.
pub const UNKNOWN: &str = "Unknown";

/// Message timestamps are stored with millisecond precision.
///
/// Anything compared against a stored timestamp must be truncated first, or
/// a message can look newer than its own stored copy.
pub fn stored_precision(at: DateTime<Utc>) -> DateTime<Utc> { at.trunc_subsecs(3) }

/// A persisted chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
  pub id:            i64,
  pub sender:        String,
  pub message_text:  String,
  pub timestamp:     DateTime<Utc>,
  pub channel_name:  String,
  pub thread_id:     Option<String>,
  pub scrape_run_id: Option<RunId>,
  pub raw_json:      Option<serde_json::Value>,
  pub deleted_at:    Option<DateTime<Utc>>,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
}

/// A message as produced by extraction, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
  pub sender:       String,
  pub message_text: String,
  pub timestamp:    DateTime<Utc>,
  pub channel_name: String,
  pub thread_id:    Option<String>,
  /// The payload exactly as captured, kept for audit and replay.
  #[serde(default)]
  pub raw:          serde_json::Value,
}

impl NewMessage {
  pub fn new(
    channel_name: impl Into<String>,
    sender: impl Into<String>,
    message_text: impl Into<String>,
    timestamp: DateTime<Utc>,
  ) -> Self {
    Self {
      sender: sender.into(),
      message_text: message_text.into(),
      timestamp,
      channel_name: channel_name.into(),
      thread_id: None,
      raw: serde_json::Value::Null,
    }
  }

  /// Replace blank sender/channel values with [`UNKNOWN`].
  /// Also truncates the timestamp to [`stored_precision`].
  pub fn normalized(mut self) -> Self {
    self.timestamp = stored_precision(self.timestamp);
    if self.sender.trim().is_empty() {
      self.sender = UNKNOWN.to_owned();
    }
    if self.channel_name.trim().is_empty() {
      self.channel_name = UNKNOWN.to_owned();
    }
    self
  }
}

/// Parameters for listing messages.
#[derive(Debug, Clone, Default)]
pub struct MessageQuery {
  pub page:            Page,
  pub channel:         Option<String>,
  pub include_deleted: bool,
}

/// One row per channel, with a preview of its newest message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSummary {
  pub channel_name:   String,
  pub message_count:  i64,
  pub last_timestamp: DateTime<Utc>,
  pub last_sender:    String,
  pub last_message:   String,
}
