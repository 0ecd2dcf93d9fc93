//! Error types for `chatlog-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown profile: {0:?} (expected small, medium or large)")]
  UnknownProfile(String),

  #[error("unknown run status: {0:?}")]
  UnknownRunStatus(String),

  #[error("unknown chat kind: {0:?}")]
  UnknownChatKind(String),

  #[error("invalid run id: {0:?}")]
  InvalidRunId(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
