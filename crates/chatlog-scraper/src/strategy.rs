//! Extraction strategies.
//!
//! A [`ChatStrategy`] is the capability set the run controller needs from a
//! chat client's UI: open a conversation, load older history, read what is
//! rendered. [`DomStrategy`] implements it with injected scripts driven
//! entirely by configured [`Selectors`].

use std::{future::Future, time::Duration};

use chatlog_core::message::stored_precision;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
  Error, Result, Settings,
  config::Selectors,
  incremental::VisibleMessage,
  session::BrowserSession,
};

// ─── Trait ────────────────────────────────────────────────────────────────────

pub trait ChatStrategy<B: BrowserSession>: Send + Sync {
  /// Open the conversation called `chat_name`. `Ok(false)` means it is not in
  /// the chat list.
  fn open_target<'a>(
    &'a self,
    session: &'a B,
    chat_name: &'a str,
  ) -> impl Future<Output = Result<bool>> + Send + 'a;

  /// Trigger loading of older history and return the resulting content
  /// height. An unchanged height means nothing more was loaded.
  fn load_older<'a>(&'a self, session: &'a B)
  -> impl Future<Output = Result<u64>> + Send + 'a;

  /// Every message currently rendered, oldest first.
  fn extract_visible<'a>(
    &'a self,
    session: &'a B,
  ) -> impl Future<Output = Result<Vec<VisibleMessage>>> + Send + 'a;

  /// Timestamp of the oldest rendered message.
  fn oldest_visible<'a>(
    &'a self,
    session: &'a B,
  ) -> impl Future<Output = Result<Option<DateTime<Utc>>>> + Send + 'a;

  /// Whether history has been loaded back to `boundary`.
  fn has_reached_boundary<'a>(
    &'a self,
    session: &'a B,
    boundary: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool>> + Send + 'a {
    async move {
      let oldest = self.oldest_visible(session).await?;
      Ok(oldest.is_some_and(|t| t <= boundary))
    }
  }
}

// ─── Scripts ──────────────────────────────────────────────────────────────────

const OPEN_CHAT: &str = r#"
const [listSel, itemSel, name] = arguments;
const root = document.querySelector(listSel) || document;
const wanted = name.toLowerCase();
const label = el => (el.getAttribute('title') || el.textContent || '').trim().toLowerCase();
const items = Array.from(root.querySelectorAll(itemSel));
const hit = items.find(el => label(el) === wanted) || items.find(el => label(el).includes(wanted));
if (!hit) return false;
hit.scrollIntoView({ block: 'center' });
hit.click();
return true;
"#;

const SCROLL_TO_TOP: &str = r#"
const el = document.querySelector(arguments[0]);
if (el) el.scrollTop = 0;
return el !== null;
"#;

const CONTENT_HEIGHT: &str = r#"
const el = document.querySelector(arguments[0]);
return el ? el.scrollHeight : 0;
"#;

const VISIBLE_TIMESTAMPS: &str = r#"
return Array.from(document.querySelectorAll(arguments[0]))
  .map(el => el.getAttribute('datetime'))
  .filter(Boolean);
"#;

const EXTRACT_MESSAGES: &str = r#"
const [timeSel, timePrefix, contentPrefix, authorPrefix, bodyPrefix] = arguments;
const out = [];
for (const timeEl of document.querySelectorAll(timeSel)) {
  const timestamp = timeEl.getAttribute('datetime');
  const id = timeEl.getAttribute('id') || '';
  if (!timestamp || !id.startsWith(timePrefix)) continue;
  const domId = id.slice(timePrefix.length);
  const content = document.getElementById(contentPrefix + domId);
  if (!content) continue;
  const author = document.getElementById(authorPrefix + domId);
  const body = document.getElementById(bodyPrefix + domId);
  const tid = body ? body.getAttribute('data-tid') : null;
  out.push({
    dom_id: domId,
    sender: author ? author.textContent.trim() : null,
    text: (content.textContent || '').trim(),
    timestamp,
    thread_id: tid && tid.includes('thread') ? tid : null,
  });
}
return out;
"#;

// ─── DomStrategy ──────────────────────────────────────────────────────────────

/// Selector-driven strategy for the chat web client.
#[derive(Debug, Clone)]
pub struct DomStrategy {
  selectors:    Selectors,
  scroll_delay: Duration,
  settle_delay: Duration,
}

/// A message as returned by [`EXTRACT_MESSAGES`], before validation.
#[derive(Debug, Deserialize)]
struct RawVisible {
  dom_id:    Option<String>,
  sender:    Option<String>,
  text:      String,
  timestamp: String,
  thread_id: Option<String>,
}

impl DomStrategy {
  pub fn new(selectors: Selectors, scroll_delay: Duration, settle_delay: Duration) -> Self {
    Self { selectors, scroll_delay, settle_delay }
  }

  pub fn from_settings(settings: &Settings) -> Self {
    Self::new(
      settings.selectors.clone(),
      settings.scroll_delay(),
      settings.settle_delay(),
    )
  }

  fn to_visible(&self, raw: RawVisible) -> Option<VisibleMessage> {
    let text = raw.text.trim();
    if text.is_empty() {
      return None;
    }
    let timestamp = parse_timestamp(&raw.timestamp)?;
    let sender = raw
      .sender
      .filter(|s| !s.trim().is_empty())
      .unwrap_or_else(|| self.selectors.self_name.clone());
    Some(VisibleMessage {
      dom_id: raw.dom_id,
      sender,
      text: text.to_owned(),
      timestamp,
      thread_id: raw.thread_id,
    })
  }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s.trim())
    .ok()
    .map(|t| stored_precision(t.with_timezone(&Utc)))
}

impl<B: BrowserSession> ChatStrategy<B> for DomStrategy {
  async fn open_target<'a>(
    &'a self,
    session: &'a B,
    chat_name: &'a str,
  ) -> Result<bool> {
    let found = session
      .execute(OPEN_CHAT.to_owned(), vec![
        json!(self.selectors.chat_list),
        json!(self.selectors.chat_item),
        json!(chat_name),
      ])
      .await?;
    if found != Value::Bool(true) {
      return Ok(false);
    }
    tokio::time::sleep(self.settle_delay).await;
    Ok(true)
  }

  async fn load_older<'a>(&'a self, session: &'a B) -> Result<u64> {
    let container = json!(self.selectors.scroll_container);
    let present = session
      .execute(SCROLL_TO_TOP.to_owned(), vec![container.clone()])
      .await?;
    if present != Value::Bool(true) {
      return Err(Error::Protocol(format!(
        "scroll container {:?} not found",
        self.selectors.scroll_container
      )));
    }
    tokio::time::sleep(self.scroll_delay).await;

    let height = session
      .execute(CONTENT_HEIGHT.to_owned(), vec![container])
      .await?;
    Ok(height.as_f64().map(|h| h.max(0.0) as u64).unwrap_or(0))
  }

  async fn extract_visible<'a>(&'a self, session: &'a B) -> Result<Vec<VisibleMessage>> {
    let s = &self.selectors;
    let value = session
      .execute(EXTRACT_MESSAGES.to_owned(), vec![
        json!(s.timestamp),
        json!(s.timestamp_id_prefix),
        json!(s.content_id_prefix),
        json!(s.author_id_prefix),
        json!(s.message_body_id_prefix),
      ])
      .await?;
    let raw: Vec<RawVisible> = serde_json::from_value(value)?;
    let total = raw.len();

    let messages: Vec<_> = raw.into_iter().filter_map(|r| self.to_visible(r)).collect();
    if messages.len() < total {
      tracing::debug!(total, kept = messages.len(), "skipped unreadable messages");
    }
    Ok(messages)
  }

  async fn oldest_visible<'a>(
    &'a self,
    session: &'a B,
  ) -> Result<Option<DateTime<Utc>>> {
    let value = session
      .execute(VISIBLE_TIMESTAMPS.to_owned(), vec![json!(self.selectors.timestamp)])
      .await?;
    let stamps: Vec<String> = serde_json::from_value(value)?;
    Ok(stamps.iter().filter_map(|s| parse_timestamp(s)).min())
  }
}
