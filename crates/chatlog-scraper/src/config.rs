//! Layered runtime settings.
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults ([`Settings::default`]).
//! 2. An optional TOML file (`chatlog.toml` unless `--config` says otherwise).
//! 3. Environment variables prefixed `CHATLOG_`, with `__` separating nested
//!    keys, e.g. `CHATLOG_MAX_SCROLLS=20` or
//!    `CHATLOG_PROFILES__LARGE__WIDTH=2560`.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use chatlog_core::profile::{Profile, Viewport};
use serde::Deserialize;

use crate::Result;

// ─── Settings ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// Entry point of the chat web client.
  pub target_url:              String,
  pub headless:                bool,
  /// Profile used when none is given on the command line.
  pub profile:                 Profile,
  pub profiles:                Profiles,
  pub scrape_interval_minutes: u64,
  pub database_path:           PathBuf,
  /// Upper bound on history-loading iterations per target.
  pub max_scrolls:             u32,
  pub scroll_delay_ms:         u64,
  /// Pause after navigation and after opening a chat.
  pub settle_delay_ms:         u64,
  /// Interval between recording frames.
  pub frame_interval_ms:       u64,
  pub navigation_timeout_secs: u64,
  pub data_dir:                PathBuf,
  pub logs_dir:                PathBuf,
  /// Browser profile directory holding the persistent login state.
  pub user_data_dir:           Option<PathBuf>,
  pub webdriver_url:           String,
  pub max_retries:             u32,
  pub retry_base_delay_secs:   u64,
  /// Path of the `scrape` executable; defaults to the sibling of the
  /// running binary.
  pub scraper_bin:             Option<PathBuf>,
  pub host:                    String,
  pub port:                    u16,
  /// Dashboard assets served at `/` when set.
  pub static_dir:              Option<PathBuf>,
  pub selectors:               Selectors,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      target_url:              "https://teams.microsoft.com".to_owned(),
      headless:                false,
      profile:                 Profile::default(),
      profiles:                Profiles::default(),
      scrape_interval_minutes: 30,
      database_path:           PathBuf::from("data/chatlog.db"),
      max_scrolls:             15,
      scroll_delay_ms:         1500,
      settle_delay_ms:         2000,
      frame_interval_ms:       1000,
      navigation_timeout_secs: 90,
      data_dir:                PathBuf::from("data"),
      logs_dir:                PathBuf::from("logs"),
      user_data_dir:           None,
      webdriver_url:           "http://localhost:9515".to_owned(),
      max_retries:             3,
      retry_base_delay_secs:   5,
      scraper_bin:             None,
      host:                    "0.0.0.0".to_owned(),
      port:                    3000,
      static_dir:              None,
      selectors:               Selectors::default(),
    }
  }
}

impl Settings {
  /// Load settings from `path` (if it exists) and the environment.
  pub fn load(path: &Path) -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(environment())
      .build()?
      .try_deserialize()?;
    Ok(settings)
  }

  /// Parse settings from a TOML document, ignoring the environment.
  pub fn from_toml(source: &str) -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from_str(source, config::FileFormat::Toml))
      .build()?
      .try_deserialize()?;
    Ok(settings)
  }

  pub fn viewport(&self, profile: Profile) -> Viewport {
    match profile {
      Profile::Small => self.profiles.small,
      Profile::Medium => self.profiles.medium,
      Profile::Large => self.profiles.large,
    }
  }

  pub fn scrape_interval(&self) -> Duration {
    Duration::from_secs(self.scrape_interval_minutes.max(1) * 60)
  }

  pub fn retry_base_delay(&self) -> Duration {
    Duration::from_secs(self.retry_base_delay_secs)
  }

  pub fn scroll_delay(&self) -> Duration {
    Duration::from_millis(self.scroll_delay_ms)
  }

  pub fn settle_delay(&self) -> Duration {
    Duration::from_millis(self.settle_delay_ms)
  }

  pub fn frame_interval(&self) -> Duration {
    Duration::from_millis(self.frame_interval_ms.max(50))
  }

  pub fn navigation_timeout(&self) -> Duration {
    Duration::from_secs(self.navigation_timeout_secs)
  }

  /// The `scrape` executable the scheduler launches.
  pub fn scraper_path(&self) -> Result<PathBuf> {
    if let Some(path) = &self.scraper_bin {
      return Ok(path.clone());
    }
    let exe = std::env::current_exe()?;
    Ok(exe.with_file_name(format!("scrape{}", std::env::consts::EXE_SUFFIX)))
  }
}

fn environment() -> config::Environment {
  config::Environment::with_prefix("CHATLOG")
    .prefix_separator("_")
    .separator("__")
    .try_parsing(true)
}

// ─── Profiles ─────────────────────────────────────────────────────────────────

/// Per-profile viewport overrides.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Profiles {
  pub small:  Viewport,
  pub medium: Viewport,
  pub large:  Viewport,
}

impl Default for Profiles {
  fn default() -> Self {
    Self {
      small:  Profile::Small.default_viewport(),
      medium: Profile::Medium.default_viewport(),
      large:  Profile::Large.default_viewport(),
    }
  }
}

// ─── Selectors ────────────────────────────────────────────────────────────────

/// DOM hooks into the chat client.
///
/// Message parts are linked by a shared id suffix: the element matched by
/// `timestamp` carries `id="timestamp-<n>"`, its body is `content-<n>` and,
/// for messages from other people, its author is `author-<n>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Selectors {
  /// Container of the conversation list.
  pub chat_list:              String,
  /// Items in the conversation list; matched against their `title`.
  pub chat_item:              String,
  /// Scrollable message history.
  pub scroll_container:       String,
  /// Elements carrying an ISO-8601 `datetime` attribute.
  pub timestamp:              String,
  pub timestamp_id_prefix:    String,
  pub content_id_prefix:      String,
  pub author_id_prefix:       String,
  pub message_body_id_prefix: String,
  /// Sender recorded for messages without an author element (own messages).
  pub self_name:              String,
}

impl Default for Selectors {
  fn default() -> Self {
    Self {
      chat_list:              "#chat-pane-list".to_owned(),
      chat_item:              "[title]".to_owned(),
      scroll_container:       r#"[data-tid="chat-messages-list"], [role="log"]"#
        .to_owned(),
      timestamp:              "time[datetime]".to_owned(),
      timestamp_id_prefix:    "timestamp-".to_owned(),
      content_id_prefix:      "content-".to_owned(),
      author_id_prefix:       "author-".to_owned(),
      message_body_id_prefix: "message-body-".to_owned(),
      self_name:              "Me".to_owned(),
    }
  }
}
