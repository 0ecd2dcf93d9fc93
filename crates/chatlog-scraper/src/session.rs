//! The browser seam.
//!
//! The run controller only ever talks to a [`BrowserSession`]; how the browser
//! is driven is up to the implementation ([`crate::webdriver`] in production,
//! scripted fakes in tests).

use std::{future::Future, path::PathBuf, time::Duration};

use chatlog_core::profile::Viewport;
use serde_json::Value;

use crate::Result;

/// Everything needed to start a browser for one run.
#[derive(Debug, Clone)]
pub struct SessionSpec {
  pub viewport:           Viewport,
  pub headless:           bool,
  /// Persistent browser profile (keeps the user logged in between runs).
  pub user_data_dir:      Option<PathBuf>,
  /// Deadline for page loads and injected scripts.
  pub navigation_timeout: Duration,
}

/// One open browser window.
///
/// Methods take `&self` so a recorder can capture frames while the controller
/// drives the page.
pub trait BrowserSession: Send + Sync {
  /// Load `url` and wait for the page to finish loading.
  fn navigate(&self, url: String) -> impl Future<Output = Result<()>> + Send + '_;

  /// Run `script` as the body of a function called with `args`, returning
  /// its result.
  fn execute(
    &self,
    script: String,
    args: Vec<Value>,
  ) -> impl Future<Output = Result<Value>> + Send + '_;

  /// PNG bytes of the current viewport.
  fn screenshot(&self) -> impl Future<Output = Result<Vec<u8>>> + Send + '_;

  /// End the session. Further calls fail.
  fn close(&self) -> impl Future<Output = Result<()>> + Send + '_;
}

/// Opens browser sessions.
pub trait SessionFactory: Send + Sync {
  type Session: BrowserSession + 'static;

  fn open(
    &self,
    spec: SessionSpec,
  ) -> impl Future<Output = Result<Self::Session>> + Send + '_;
}
