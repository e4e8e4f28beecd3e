//! Error types for the ranked cache and the write-behind pipeline.
//!
//! Every error reports whether retrying the same operation later can succeed,
//! so callers that swallow failures (update, change capture, the sweep loop)
//! still log enough to alert on.

use thiserror::Error;

/// Failure talking to the cache backend
#[derive(Debug, Clone, Error)]
pub enum CacheError {
  #[error("cache connection error: {0}")]
  Connection(String),
  #[error("WRONGTYPE operation against key '{0}' holding the wrong kind of value")]
  WrongType(String),
  #[error("invalid stream id: {0}")]
  InvalidStreamId(String),
  #[error("cache command failed: {0}")]
  Command(String),
}

impl CacheError {
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Connection(_) | Self::Command(_))
  }
}

impl From<redis::RedisError> for CacheError {
  fn from(e: redis::RedisError) -> Self {
    if e.is_io_error() || e.is_connection_dropped() || e.is_timeout() || e.is_connection_refusal()
    {
      Self::Connection(e.to_string())
    } else if e.kind() == redis::ErrorKind::TypeError {
      Self::WrongType(e.to_string())
    } else {
      Self::Command(e.to_string())
    }
  }
}

/// Failure of a rank service query or update
#[derive(Debug, Error)]
pub enum RankError {
  #[error("no metadata cached for '{0}'")]
  MetadataNotFound(String),
  #[error("metadata for '{key}' is missing field '{field}'")]
  MissingField { key: String, field: &'static str },
  #[error("'{0}' is not ranked in the leaderboard")]
  NotRanked(String),
  #[error("invalid leaderboard key: {0}")]
  InvalidKey(String),
  #[error(transparent)]
  Cache(#[from] CacheError),
  #[error("durable store error: {0}")]
  Durable(anyhow::Error),
}

impl RankError {
  /// Transport failures are retryable; missing or malformed data is not.
  pub fn is_retryable(&self) -> bool {
    match self {
      Self::Cache(e) => e.is_retryable(),
      Self::Durable(_) => true,
      Self::MetadataNotFound(_)
      | Self::MissingField { .. }
      | Self::NotRanked(_)
      | Self::InvalidKey(_) => false,
    }
  }
}

/// Failure while draining one change log into durable storage
#[derive(Debug, Error)]
pub enum SweepError {
  #[error("malformed change record in '{stream}': {reason}")]
  Malformed { stream: String, reason: String },
  #[error(transparent)]
  Cache(#[from] CacheError),
  #[error("durable merge failed: {0}")]
  Durable(anyhow::Error),
}

impl SweepError {
  pub fn is_retryable(&self) -> bool {
    match self {
      Self::Malformed { .. } => false,
      Self::Cache(e) => e.is_retryable(),
      Self::Durable(_) => true,
    }
  }
}
