//! Error type for `chatlog-store-sqlite`.

use chatlog_core::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] chatlog_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A live target chat already uses this name.
  #[error("target chat {0:?} already exists")]
  DuplicateTarget(String),
}

impl StoreError for Error {
  fn conflict(&self) -> Option<&str> {
    match self {
      Error::DuplicateTarget(name) => Some(name),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
