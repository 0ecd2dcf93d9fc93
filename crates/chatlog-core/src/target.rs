//! Target chats: the registry of conversations to collect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{Error, profile::Profile};

/// What kind of conversation a target chat is.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
  #[default]
  Channel,
  User,
  Group,
}

impl ChatKind {
  pub fn as_str(self) -> &'static str {
    match self {
      ChatKind::Channel => "channel",
      ChatKind::User => "user",
      ChatKind::Group => "group",
    }
  }
}

impl FromStr for ChatKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "channel" => Ok(ChatKind::Channel),
      "user" => Ok(ChatKind::User),
      "group" => Ok(ChatKind::Group),
      other => Err(Error::UnknownChatKind(other.to_owned())),
    }
  }
}

/// A registered target chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetChat {
  pub id:              i64,
  /// Unique among non-deleted targets (case-sensitive).
  pub chat_name:       String,
  pub chat_type:       ChatKind,
  /// When set, only runs with this profile collect the target.
  pub profile:         Option<Profile>,
  pub is_active:       bool,
  /// Higher priorities are collected first.
  pub priority:        i64,
  pub notes:           Option<String>,
  pub last_scraped_at: Option<DateTime<Utc>>,
  pub message_count:   i64,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
  pub deleted_at:      Option<DateTime<Utc>>,
}

/// Input for registering a target chat.
#[derive(Debug, Clone)]
pub struct NewTarget {
  pub chat_name: String,
  pub chat_type: ChatKind,
  pub profile:   Option<Profile>,
  pub is_active: bool,
  pub priority:  i64,
  pub notes:     Option<String>,
}

impl NewTarget {
  pub fn new(chat_name: impl Into<String>) -> Self {
    Self {
      chat_name: chat_name.into(),
      chat_type: ChatKind::default(),
      profile:   None,
      is_active: true,
      priority:  0,
      notes:     None,
    }
  }
}

/// A partial update to a target chat. `None` fields are left unchanged.
///
/// The nullable columns take `Some(None)` to clear the stored value.
#[derive(Debug, Clone, Default)]
pub struct TargetUpdate {
  pub chat_name: Option<String>,
  pub chat_type: Option<ChatKind>,
  pub profile:   Option<Option<Profile>>,
  pub is_active: Option<bool>,
  pub priority:  Option<i64>,
  pub notes:     Option<Option<String>>,
}

/// Filter for [`crate::store::ChatStore::list_targets`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetFilter {
  /// Skip targets whose `is_active` flag is off.
  pub active_only: bool,
  /// Keep only targets without a profile affinity or with this profile.
  pub profile:     Option<Profile>,
}
