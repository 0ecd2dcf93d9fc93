//! Incremental collection.
//!
//! A channel's boundary is the newest timestamp already stored for it. Each
//! pass keeps only what is strictly newer, so re-running a scrape never
//! re-collects old history.

use std::collections::HashSet;

use chatlog_core::message::{NewMessage, stored_precision};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message as read from the rendered page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibleMessage {
  /// The DOM id suffix linking timestamp, body and author elements.
  #[serde(default)]
  pub dom_id:    Option<String>,
  pub sender:    String,
  pub text:      String,
  pub timestamp: DateTime<Utc>,
  #[serde(default)]
  pub thread_id: Option<String>,
}

/// Drop later messages that repeat an earlier message's timestamp.
pub fn dedup_by_timestamp(messages: Vec<VisibleMessage>) -> Vec<VisibleMessage> {
  let mut seen = HashSet::new();
  messages
    .into_iter()
    .filter(|m| seen.insert(m.timestamp))
    .collect()
}

/// Keep messages strictly newer than `boundary`.
pub fn after_boundary(
  messages: Vec<VisibleMessage>,
  boundary: Option<DateTime<Utc>>,
) -> Vec<VisibleMessage> {
  match boundary {
    Some(boundary) => messages.into_iter().filter(|m| m.timestamp > boundary).collect(),
    None => messages,
  }
}

/// Attach the channel name and keep the captured message as the raw payload.
pub fn into_new_messages(channel: &str, messages: Vec<VisibleMessage>) -> Vec<NewMessage> {
  messages
    .into_iter()
    .map(|m| {
      let raw = serde_json::to_value(&m).unwrap_or_default();
      NewMessage {
        sender: m.sender,
        message_text: m.text,
        timestamp: m.timestamp,
        channel_name: channel.to_owned(),
        thread_id: m.thread_id,
        raw,
      }
      .normalized()
    })
    .collect()
}

/// The full pass: truncate to stored precision, dedup, apply the boundary,
/// convert.
pub fn select_new(
  channel: &str,
  visible: Vec<VisibleMessage>,
  boundary: Option<DateTime<Utc>>,
) -> Vec<NewMessage> {
  let visible = visible
    .into_iter()
    .map(|mut m| {
      m.timestamp = stored_precision(m.timestamp);
      m
    })
    .collect();
  into_new_messages(channel, after_boundary(dedup_by_timestamp(visible), boundary))
}

#[cfg(test)]
mod tests {
  use chatlog_core::{
    profile::Profile,
    run::{NewRun, RunId},
    store::ChatStore,
  };
  use chatlog_store_sqlite::SqliteStore;
  use chrono::TimeZone;

  use super::*;

  fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, minute, 0).unwrap()
  }

  fn visible(text: &str, minute: u32) -> VisibleMessage {
    VisibleMessage {
      dom_id:    None,
      sender:    "Alice".into(),
      text:      text.into(),
      timestamp: at(minute),
      thread_id: None,
    }
  }

  #[test]
  fn first_occurrence_of_a_timestamp_wins() {
    let out = dedup_by_timestamp(vec![visible("a", 1), visible("b", 1), visible("c", 2)]);
    let texts: Vec<_> = out.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, ["a", "c"]);
  }

  #[test]
  fn boundary_keeps_only_strictly_newer() {
    let out = after_boundary(
      vec![visible("old", 1), visible("edge", 5), visible("new", 6), visible("newer", 9)],
      Some(at(5)),
    );
    let texts: Vec<_> = out.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, ["new", "newer"]);
  }

  #[test]
  fn no_boundary_keeps_everything() {
    assert_eq!(after_boundary(vec![visible("a", 1), visible("b", 2)], None).len(), 2);
  }

  #[test]
  fn select_new_attaches_channel_and_raw_payload() {
    let mut anonymous = visible("hi", 7);
    anonymous.sender = String::new();

    let out = select_new("Ops", vec![visible("seen", 2), anonymous], Some(at(3)));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].channel_name, "Ops");
    assert_eq!(out[0].sender, "Unknown");
    assert_eq!(out[0].message_text, "hi");
    assert_eq!(out[0].raw["text"], "hi");
  }

  #[test]
  fn sub_millisecond_copy_of_stored_message_is_not_new() {
    // The store keeps milliseconds, so the boundary read back is 09:00:00.000.
    let mut again = visible("seen", 0);
    again.timestamp += chrono::Duration::microseconds(500);

    let out = select_new("Ops", vec![again.clone()], Some(at(0)));
    assert!(out.is_empty());

    let out = select_new("Ops", vec![again], None);
    assert_eq!(out[0].timestamp, at(0));
  }

  #[tokio::test]
  async fn stored_boundary_matches_recollected_message() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let run = RunId::parse("run_precision").unwrap();
    store
      .create_run(NewRun {
        id:         run.clone(),
        profile:    Profile::Medium,
        headless:   true,
        started_at: Utc::now(),
      })
      .await
      .unwrap();

    let mut precise = visible("deploy done", 0);
    precise.timestamp += chrono::Duration::microseconds(500);

    let first = select_new("Ops", vec![precise.clone()], None);
    store.upsert_messages(run, first).await.unwrap();

    let boundary = store.latest_timestamp("Ops".into()).await.unwrap();
    assert_eq!(boundary, Some(at(0)));
    assert!(select_new("Ops", vec![precise], boundary).is_empty());
  }
}
