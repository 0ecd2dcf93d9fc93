//! Test doubles for the browser seam.

use std::{
  collections::VecDeque,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
};

use serde_json::Value;

use crate::{
  Error, Result,
  session::{BrowserSession, SessionFactory, SessionSpec},
};

/// A session that answers `execute` from a queue of canned values.
#[derive(Default)]
pub struct ScriptedSession {
  responses:       Mutex<VecDeque<Value>>,
  args:            Mutex<Vec<Vec<Value>>>,
  fail_nav:        bool,
  pub navigations: Arc<Mutex<Vec<String>>>,
  pub screenshots: Arc<AtomicUsize>,
  pub closed:      Arc<AtomicBool>,
}

impl ScriptedSession {
  pub fn with_responses(responses: impl IntoIterator<Item = Value>) -> Self {
    Self {
      responses: Mutex::new(responses.into_iter().collect()),
      ..Self::default()
    }
  }

  pub fn last_args(&self) -> Vec<Value> {
    self.args.lock().unwrap().last().cloned().unwrap_or_default()
  }
}

impl BrowserSession for ScriptedSession {
  async fn navigate(&self, url: String) -> Result<()> {
    if self.fail_nav {
      return Err(Error::Protocol(format!("timed out loading {url}")));
    }
    self.navigations.lock().unwrap().push(url);
    Ok(())
  }

  async fn execute(&self, _script: String, args: Vec<Value>) -> Result<Value> {
    self.args.lock().unwrap().push(args);
    Ok(self.responses.lock().unwrap().pop_front().unwrap_or(Value::Null))
  }

  async fn screenshot(&self) -> Result<Vec<u8>> {
    self.screenshots.fetch_add(1, Ordering::SeqCst);
    Ok(b"\x89PNG".to_vec())
  }

  async fn close(&self) -> Result<()> {
    self.closed.store(true, Ordering::SeqCst);
    Ok(())
  }
}

/// Hands out [`ScriptedSession`]s that share their observation handles with
/// the factory.
#[derive(Default)]
pub struct ScriptedFactory {
  pub fail_open:   bool,
  pub fail_nav:    bool,
  pub opened:      Arc<Mutex<Vec<SessionSpec>>>,
  pub navigations: Arc<Mutex<Vec<String>>>,
  pub screenshots: Arc<AtomicUsize>,
  pub closed:      Arc<AtomicBool>,
}

impl SessionFactory for ScriptedFactory {
  type Session = ScriptedSession;

  async fn open(&self, spec: SessionSpec) -> Result<ScriptedSession> {
    if self.fail_open {
      return Err(Error::Protocol("driver unavailable".into()));
    }
    self.opened.lock().unwrap().push(spec);
    Ok(ScriptedSession {
      fail_nav: self.fail_nav,
      navigations: self.navigations.clone(),
      screenshots: self.screenshots.clone(),
      closed: self.closed.clone(),
      ..ScriptedSession::default()
    })
  }
}
