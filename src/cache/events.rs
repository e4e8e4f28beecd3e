//! Keyspace notifications
//!
//! Mirrors Redis `notify-keyspace-events KEA`: every mutation publishes the
//! command name on the channel `__keyspace@{db}__:{key}`.

use chrono::{DateTime, Utc};
use futures_util::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::error::CacheError;

/// Pattern matching every keyspace channel on every database
pub const KEYSPACE_PATTERN: &str = "__keyspace@*__:*";

/// Capacity of the notification channel before slow receivers start lagging
pub const KEYSPACE_CHANNEL_CAPACITY: usize = 4096;

/// First wait before re-subscribing to a lost notification source
pub const RESUBSCRIBE_DELAY: Duration = Duration::from_millis(250);

/// Ceiling for the doubling re-subscribe backoff
pub const MAX_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(30);

/// A single keyspace notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyspaceEvent {
  /// Full channel name, e.g. `__keyspace@0__:company:aapl`
  pub channel: String,
  /// Command that touched the key, e.g. `hset`, `zadd`, `del`, `expired`
  pub event: String,
  pub received_at: DateTime<Utc>,
}

impl KeyspaceEvent {
  pub fn new(channel: impl Into<String>, event: impl Into<String>) -> Self {
    Self {
      channel: channel.into(),
      event: event.into(),
      received_at: Utc::now(),
    }
  }

  /// Build the notification for `key` on database `db`
  pub fn for_key(db: u8, key: &str, event: &str) -> Self {
    Self::new(format!("__keyspace@{}__:{}", db, key), event)
  }
}

/// Fan-out of keyspace notifications to any number of subscribers
#[derive(Debug, Clone)]
pub struct KeyspaceBus {
  tx: broadcast::Sender<KeyspaceEvent>,
}

impl Default for KeyspaceBus {
  fn default() -> Self {
    Self::new(KEYSPACE_CHANNEL_CAPACITY)
  }
}

impl KeyspaceBus {
  pub fn new(capacity: usize) -> Self {
    let (tx, _) = broadcast::channel(capacity);
    Self { tx }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<KeyspaceEvent> {
    self.tx.subscribe()
  }

  /// Publish an event; nobody listening is not an error
  pub fn publish(&self, event: KeyspaceEvent) {
    let _ = self.tx.send(event);
  }

  pub fn receiver_count(&self) -> usize {
    self.tx.receiver_count()
  }
}

/// Forward notifications from `events` onto `bus` for the life of the process.
///
/// When the source ends (a dropped connection, a server restart) `connect` is
/// called again with a doubling backoff starting at `delay` until a fresh
/// subscription is established. Notifications published while disconnected are
/// lost; the next change to the same key captures it again.
pub async fn relay_keyspace<S, F, Fut>(
  bus: KeyspaceBus,
  mut events: S,
  mut connect: F,
  delay: Duration,
) where
  S: Stream<Item = KeyspaceEvent> + Unpin,
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<S, CacheError>>,
{
  loop {
    while let Some(event) = events.next().await {
      bus.publish(event);
    }
    tracing::warn!("Keyspace subscription closed, re-subscribing");

    let mut wait = delay;
    events = loop {
      tokio::time::sleep(wait).await;
      match connect().await {
        Ok(events) => {
          tracing::info!("Keyspace subscription restored");
          break events;
        }
        Err(e) => {
          tracing::warn!(
            retryable = e.is_retryable(),
            "Keyspace re-subscribe failed, next attempt in {:?}: {}",
            wait,
            e
          );
          wait = (wait * 2).min(MAX_RESUBSCRIBE_DELAY);
        }
      }
    };
  }
}
