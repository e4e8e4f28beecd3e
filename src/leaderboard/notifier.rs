//! Change capture: turns cache keyspace notifications into change log entries.

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::keys::{key_from_channel, LeaderboardKeys};
use super::write_behind::WriteBehindQueue;
use crate::cache::{CacheBackend, KeyspaceEvent, StreamId};
use crate::error::RankError;

/// Keyspace events that trigger a snapshot
pub const SET_EVENTS: [&str; 6] = ["hset", "hmset", "hincrbyfloat", "hincrby", "hsetnx", "change"];

/// Keyspace events that are observed but never propagated
pub const DELETE_EVENTS: [&str; 2] = ["hdel", "del"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
  Set,
  Delete,
  Ignored,
}

pub fn classify(event: &str) -> EventKind {
  if SET_EVENTS.contains(&event) {
    EventKind::Set
  } else if DELETE_EVENTS.contains(&event) {
    EventKind::Delete
  } else {
    EventKind::Ignored
  }
}

/// What handling one notification did
#[derive(Debug, Clone, PartialEq)]
pub enum NotifyOutcome {
  /// Snapshot appended to the key's change log
  Captured { key: String, id: StreamId },
  /// Nothing to snapshot for the key
  Empty { key: String },
  /// Deletion seen; durable rows are kept
  DeleteIgnored { key: String },
  Ignored,
}

pub struct ChangeNotifier {
  cache: Arc<dyn CacheBackend>,
  queue: WriteBehindQueue,
  keys: LeaderboardKeys,
}

impl ChangeNotifier {
  pub fn new(cache: Arc<dyn CacheBackend>, queue: WriteBehindQueue, keys: LeaderboardKeys) -> Self {
    Self { cache, queue, keys }
  }

  /// Current metadata, score and ascending rank of `key` as stream fields
  pub async fn snapshot(&self, key: &str) -> Result<Vec<(String, String)>, RankError> {
    let hash = self.cache.hgetall(key).await?;
    let score = self.cache.zscore(&self.keys.leaderboard_key, key).await?;
    let rank = self.cache.zrank(&self.keys.leaderboard_key, key).await?;

    let mut fields: Vec<(String, String)> = hash.into_iter().collect();
    fields.sort();
    if let Some(score) = score {
      fields.push(("marketcap".to_string(), score.to_string()));
    }
    if let Some(rank) = rank {
      fields.push(("rank".to_string(), rank.to_string()));
    }
    Ok(fields)
  }

  /// Process a single keyspace notification
  pub async fn handle(&self, event: &KeyspaceEvent) -> Result<NotifyOutcome, RankError> {
    let kind = classify(&event.event);
    if kind == EventKind::Ignored {
      return Ok(NotifyOutcome::Ignored);
    }
    let key = key_from_channel(&event.channel)
      .ok_or_else(|| RankError::InvalidKey(event.channel.clone()))?;

    match kind {
      EventKind::Set => {
        tracing::debug!("Received {} on {}", event.event, event.channel);
        let fields = self.snapshot(&key).await?;
        match self.queue.append(&key, &fields).await? {
          Some(id) => Ok(NotifyOutcome::Captured { key, id }),
          None => Ok(NotifyOutcome::Empty { key }),
        }
      }
      EventKind::Delete => {
        tracing::debug!(
          "Received {} on {}, keeping durable row",
          event.event,
          event.channel
        );
        Ok(NotifyOutcome::DeleteIgnored { key })
      }
      EventKind::Ignored => Ok(NotifyOutcome::Ignored),
    }
  }

  /// Consume notifications until the channel closes or shutdown fires.
  ///
  /// A failed capture is logged and dropped; the next qualifying event on the
  /// same key captures the entity again.
  pub async fn run(
    &self,
    mut events: broadcast::Receiver<KeyspaceEvent>,
    mut shutdown: broadcast::Receiver<()>,
  ) {
    tracing::info!("Change notifier started");
    loop {
      tokio::select! {
        received = events.recv() => match received {
          Ok(event) => {
            if let Err(e) = self.handle(&event).await {
              tracing::warn!(
                channel = %event.channel,
                retryable = e.is_retryable(),
                "Change capture failed: {}",
                e
              );
            }
          }
          Err(RecvError::Lagged(missed)) => {
            tracing::warn!("Change notifier lagged, {} keyspace events dropped", missed);
          }
          Err(RecvError::Closed) => break,
        },
        _ = shutdown.recv() => break,
      }
    }
    tracing::info!("Change notifier stopped");
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_classify() {
    for event in SET_EVENTS {
      assert_eq!(classify(event), EventKind::Set);
    }
    assert_eq!(classify("del"), EventKind::Delete);
    assert_eq!(classify("hdel"), EventKind::Delete);
    assert_eq!(classify("zadd"), EventKind::Ignored);
    assert_eq!(classify("xadd"), EventKind::Ignored);
    assert_eq!(classify("expired"), EventKind::Ignored);
    assert_eq!(classify("set"), EventKind::Ignored);
  }
}
