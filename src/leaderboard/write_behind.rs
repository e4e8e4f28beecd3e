use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::keys::{stream_name, stream_pattern};
use crate::cache::{CacheBackend, StreamEntry, StreamId};
use crate::error::CacheError;

/// Write-behind settings shared by the change notifier and the sweeper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteBehindConfig {
  /// Capture cache mutations and sweep them into durable storage
  #[serde(default = "default_true")]
  pub enabled: bool,

  /// Durable table, also the change log namespace
  #[serde(default = "default_table")]
  pub table: String,

  #[serde(default = "default_primary_key")]
  pub primary_key: String,

  /// Seconds between sweeper ticks
  #[serde(default = "default_sweep_interval")]
  pub sweep_interval_secs: u64,

  /// Lifetime of a change log after a successful merge
  #[serde(default = "default_ack_ttl")]
  pub ack_ttl_secs: u64,
}

fn default_true() -> bool {
  true
}

fn default_table() -> String {
  "company".into()
}

fn default_primary_key() -> String {
  "symbol".into()
}

fn default_sweep_interval() -> u64 {
  5
}

fn default_ack_ttl() -> u64 {
  10
}

impl Default for WriteBehindConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      table: default_table(),
      primary_key: default_primary_key(),
      sweep_interval_secs: default_sweep_interval(),
      ack_ttl_secs: default_ack_ttl(),
    }
  }
}

impl WriteBehindConfig {
  pub fn ack_ttl(&self) -> Duration {
    Duration::from_secs(self.ack_ttl_secs)
  }

  pub fn sweep_interval(&self) -> Duration {
    Duration::from_secs(self.sweep_interval_secs.max(1))
  }
}

/// Per-key append-only change logs stored as cache streams.
///
/// Entries are never edited or removed one by one: a log is retired as a
/// whole by giving it a time to live.
#[derive(Clone)]
pub struct WriteBehindQueue {
  cache: Arc<dyn CacheBackend>,
  table: String,
}

impl WriteBehindQueue {
  pub fn new(cache: Arc<dyn CacheBackend>, table: impl Into<String>) -> Self {
    Self {
      cache,
      table: table.into(),
    }
  }

  pub fn table(&self) -> &str {
    &self.table
  }

  pub fn stream_name(&self, key: &str) -> String {
    stream_name(&self.table, key)
  }

  /// Append a snapshot to the log of `key`. Empty snapshots are skipped.
  pub async fn append(
    &self,
    key: &str,
    fields: &[(String, String)],
  ) -> Result<Option<StreamId>, CacheError> {
    if fields.is_empty() {
      tracing::debug!("Skipping empty snapshot for {}", key);
      return Ok(None);
    }
    let stream = self.stream_name(key);
    let id = self.cache.xadd(&stream, fields).await?;
    tracing::debug!("Appended {} to {}", id, stream);
    Ok(Some(id))
  }

  /// Names of every log currently present
  pub async fn pending(&self) -> Result<Vec<String>, CacheError> {
    self.cache.keys(&stream_pattern(&self.table)).await
  }

  /// Newest entry of a log
  pub async fn latest(&self, stream: &str) -> Result<Option<StreamEntry>, CacheError> {
    self.cache.xlast(stream).await
  }

  /// Retire a whole log after `ttl`.
  ///
  /// A log that already carries a TTL keeps it, so repeated sweeps cannot
  /// postpone its expiry. Returns whether a TTL was placed.
  pub async fn mark_consumed(&self, stream: &str, ttl: Duration) -> Result<bool, CacheError> {
    if self.cache.ttl(stream).await?.is_some() {
      return Ok(false);
    }
    self.cache.expire(stream, ttl).await
  }

  /// Drop a log immediately, whatever it still holds
  pub async fn discard(&self, stream: &str) -> Result<bool, CacheError> {
    let removed = self.cache.del(stream).await?;
    if removed {
      tracing::warn!("Discarded change log {}", stream);
    }
    Ok(removed)
  }
}
