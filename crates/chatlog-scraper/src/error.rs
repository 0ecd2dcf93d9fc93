use chatlog_core::store::StoreError;
use thiserror::Error;

use crate::lifecycle::RunPhase;

#[derive(Debug, Error)]
pub enum Error {
  #[error("configuration error: {0}")]
  Config(#[from] config::ConfigError),

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  /// An error payload returned by the WebDriver server.
  #[error("webdriver error (status {status}) {error}: {message}")]
  WebDriver {
    status:  u16,
    error:   String,
    message: String,
  },

  #[error("unexpected webdriver response: {0}")]
  Protocol(String),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("invalid screenshot encoding: {0}")]
  Screenshot(#[from] base64::DecodeError),

  #[error(transparent)]
  Core(#[from] chatlog_core::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("{} failed: {source}", .phase.label())]
  Phase {
    phase:  RunPhase,
    #[source]
    source: Box<Error>,
  },

  #[error("run panicked: {0}")]
  Panicked(String),

  #[error("launch failed: {0}")]
  Launch(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  pub fn store(err: impl StoreError) -> Self { Error::Store(Box::new(err)) }

  /// Attach the lifecycle phase in which this error ended the run.
  pub fn in_phase(self, phase: RunPhase) -> Self {
    Error::Phase { phase, source: Box::new(self) }
  }
}
