//! Cache backend trait and the embedded in-memory implementation

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use super::entry::{CacheEntry, CacheValue};
use super::events::{KeyspaceBus, KeyspaceEvent};
use super::sorted_set::SortedSet;
use super::stream::{Stream, StreamEntry, StreamId};
use crate::error::CacheError;

/// The subset of Redis the leaderboard pipeline talks to.
///
/// Implemented by the embedded [`InMemoryCacheStore`] and by
/// [`RedisCacheStore`](super::RedisCacheStore) for an external server.
#[async_trait]
pub trait CacheBackend: Send + Sync {
  /// ZADD: set the absolute score of `member`. Returns true when the member is new.
  async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<bool, CacheError>;
  async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, CacheError>;
  /// ZRANK: 0-based ascending rank
  async fn zrank(&self, key: &str, member: &str) -> Result<Option<u64>, CacheError>;
  /// ZRANGE / ZREVRANGE ... WITHSCORES over inclusive rank indices
  async fn zrange_with_scores(
    &self,
    key: &str,
    start: isize,
    stop: isize,
    reverse: bool,
  ) -> Result<Vec<(String, f64)>, CacheError>;
  async fn zcard(&self, key: &str) -> Result<usize, CacheError>;

  /// HSET with one or more fields. Returns the number of fields added.
  async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<usize, CacheError>;
  async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, CacheError>;
  async fn hdel(&self, key: &str, fields: &[String]) -> Result<usize, CacheError>;

  async fn del(&self, key: &str) -> Result<bool, CacheError>;
  async fn exists(&self, key: &str) -> Result<bool, CacheError>;
  async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;
  /// Remaining time to live; None when the key is missing or persistent
  async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;
  /// KEYS with a glob pattern
  async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError>;

  /// XADD key * field value [field value ...]
  async fn xadd(&self, key: &str, fields: &[(String, String)]) -> Result<StreamId, CacheError>;
  /// XREVRANGE key + - COUNT 1
  async fn xlast(&self, key: &str) -> Result<Option<StreamEntry>, CacheError>;

  fn subscribe_keyspace(&self) -> broadcast::Receiver<KeyspaceEvent>;
  /// Begin delivering keyspace notifications to subscribers
  async fn start_keyspace_listener(&self) -> Result<(), CacheError>;
}

/// In-memory cache store implementation
pub struct InMemoryCacheStore {
  data: RwLock<HashMap<String, CacheEntry>>,
  db: u8,
  bus: KeyspaceBus,
  expired: AtomicU64,
}

impl Default for InMemoryCacheStore {
  fn default() -> Self {
    Self::new()
  }
}

impl InMemoryCacheStore {
  pub fn new() -> Self {
    Self {
      data: RwLock::new(HashMap::new()),
      db: 0,
      bus: KeyspaceBus::default(),
      expired: AtomicU64::new(0),
    }
  }

  /// Emit a keyspace notification for `key`
  fn notify(&self, key: &str, event: &str) {
    self.bus.publish(KeyspaceEvent::for_key(self.db, key, event));
  }

  /// Drop `key` if its TTL has passed, the way a lazy Redis lookup does
  fn purge_if_expired(&self, data: &mut HashMap<String, CacheEntry>, key: &str) {
    if data.get(key).map(|e| e.is_expired()).unwrap_or(false) {
      data.remove(key);
      self.expired.fetch_add(1, Ordering::Relaxed);
      self.notify(key, "expired");
    }
  }

  /// Check and evict expired entries
  pub fn evict_expired(&self) -> usize {
    let mut data = self.data.write();
    let expired_keys: Vec<String> = data
      .iter()
      .filter(|(_, entry)| entry.is_expired())
      .map(|(k, _)| k.clone())
      .collect();

    for key in &expired_keys {
      data.remove(key);
      self.expired.fetch_add(1, Ordering::Relaxed);
      self.notify(key, "expired");
    }
    expired_keys.len()
  }

  /// Total keys removed by expiry so far
  pub fn expired_count(&self) -> u64 {
    self.expired.load(Ordering::Relaxed)
  }

  pub fn len(&self) -> usize {
    let data = self.data.read();
    data.values().filter(|e| !e.is_expired()).count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn read_sorted_set<R>(
    &self,
    key: &str,
    f: impl FnOnce(&SortedSet) -> R,
  ) -> Result<Option<R>, CacheError> {
    let data = self.data.read();
    match data.get(key).filter(|e| !e.is_expired()) {
      Some(CacheEntry {
        value: CacheValue::SortedSet(z),
        ..
      }) => Ok(Some(f(z))),
      Some(_) => Err(CacheError::WrongType(key.to_string())),
      None => Ok(None),
    }
  }
}

#[async_trait]
impl CacheBackend for InMemoryCacheStore {
  async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<bool, CacheError> {
    let mut data = self.data.write();
    self.purge_if_expired(&mut data, key);
    let entry = data
      .entry(key.to_string())
      .or_insert_with(|| CacheEntry::new(CacheValue::SortedSet(SortedSet::new())));
    let added = match &mut entry.value {
      CacheValue::SortedSet(z) => z.insert(member, score),
      _ => return Err(CacheError::WrongType(key.to_string())),
    };
    self.notify(key, "zadd");
    Ok(added)
  }

  async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, CacheError> {
    Ok(self.read_sorted_set(key, |z| z.score(member))?.flatten())
  }

  async fn zrank(&self, key: &str, member: &str) -> Result<Option<u64>, CacheError> {
    Ok(
      self
        .read_sorted_set(key, |z| z.rank(member))?
        .flatten()
        .map(|r| r as u64),
    )
  }

  async fn zrange_with_scores(
    &self,
    key: &str,
    start: isize,
    stop: isize,
    reverse: bool,
  ) -> Result<Vec<(String, f64)>, CacheError> {
    Ok(
      self
        .read_sorted_set(key, |z| z.range(start, stop, reverse))?
        .unwrap_or_default(),
    )
  }

  async fn zcard(&self, key: &str) -> Result<usize, CacheError> {
    Ok(self.read_sorted_set(key, |z| z.len())?.unwrap_or(0))
  }

  async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<usize, CacheError> {
    let mut data = self.data.write();
    self.purge_if_expired(&mut data, key);
    let entry = data
      .entry(key.to_string())
      .or_insert_with(|| CacheEntry::new(CacheValue::Hash(HashMap::new())));
    let added = match &mut entry.value {
      CacheValue::Hash(hash) => fields
        .iter()
        .filter(|(name, value)| hash.insert(name.clone(), value.clone()).is_none())
        .count(),
      _ => return Err(CacheError::WrongType(key.to_string())),
    };
    self.notify(key, "hset");
    Ok(added)
  }

  async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, CacheError> {
    let data = self.data.read();
    match data.get(key).filter(|e| !e.is_expired()) {
      Some(CacheEntry {
        value: CacheValue::Hash(hash),
        ..
      }) => Ok(hash.clone()),
      Some(_) => Err(CacheError::WrongType(key.to_string())),
      None => Ok(HashMap::new()),
    }
  }

  async fn hdel(&self, key: &str, fields: &[String]) -> Result<usize, CacheError> {
    let mut data = self.data.write();
    self.purge_if_expired(&mut data, key);
    let Some(entry) = data.get_mut(key) else {
      return Ok(0);
    };
    let removed = match &mut entry.value {
      CacheValue::Hash(hash) => fields.iter().filter(|f| hash.remove(*f).is_some()).count(),
      _ => return Err(CacheError::WrongType(key.to_string())),
    };
    if removed > 0 {
      self.notify(key, "hdel");
      if entry.value.is_empty() {
        data.remove(key);
        self.notify(key, "del");
      }
    }
    Ok(removed)
  }

  async fn del(&self, key: &str) -> Result<bool, CacheError> {
    let mut data = self.data.write();
    self.purge_if_expired(&mut data, key);
    if data.remove(key).is_some() {
      self.notify(key, "del");
      Ok(true)
    } else {
      Ok(false)
    }
  }

  async fn exists(&self, key: &str) -> Result<bool, CacheError> {
    let data = self.data.read();
    Ok(data.get(key).map(|e| !e.is_expired()).unwrap_or(false))
  }

  async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
    let mut data = self.data.write();
    self.purge_if_expired(&mut data, key);
    if ttl.is_zero() {
      let removed = data.remove(key).is_some();
      if removed {
        self.notify(key, "del");
      }
      return Ok(removed);
    }
    match data.get_mut(key) {
      Some(entry) => {
        entry.update_ttl(Some(ttl));
        self.notify(key, "expire");
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
    let data = self.data.read();
    Ok(data.get(key).and_then(|entry| entry.ttl_remaining()))
  }

  async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
    let data = self.data.read();
    let regex = glob_to_regex(pattern)?;
    let mut keys: Vec<String> = data
      .iter()
      .filter(|(k, e)| !e.is_expired() && regex.is_match(k))
      .map(|(k, _)| k.clone())
      .collect();
    keys.sort();
    Ok(keys)
  }

  async fn xadd(&self, key: &str, fields: &[(String, String)]) -> Result<StreamId, CacheError> {
    let mut data = self.data.write();
    self.purge_if_expired(&mut data, key);
    let entry = data
      .entry(key.to_string())
      .or_insert_with(|| CacheEntry::new(CacheValue::Stream(Stream::default())));
    let now_ms = Utc::now().timestamp_millis().max(0) as u64;
    let id = match &mut entry.value {
      CacheValue::Stream(stream) => stream.append(now_ms, fields.to_vec()),
      _ => return Err(CacheError::WrongType(key.to_string())),
    };
    self.notify(key, "xadd");
    Ok(id)
  }

  async fn xlast(&self, key: &str) -> Result<Option<StreamEntry>, CacheError> {
    let data = self.data.read();
    match data.get(key).filter(|e| !e.is_expired()) {
      Some(CacheEntry {
        value: CacheValue::Stream(stream),
        ..
      }) => Ok(stream.last().cloned()),
      Some(_) => Err(CacheError::WrongType(key.to_string())),
      None => Ok(None),
    }
  }

  fn subscribe_keyspace(&self) -> broadcast::Receiver<KeyspaceEvent> {
    self.bus.subscribe()
  }

  async fn start_keyspace_listener(&self) -> Result<(), CacheError> {
    // Notifications are published inline by every mutation
    Ok(())
  }
}

/// Periodically evict expired keys so their `expired` notifications fire
pub async fn run_expiration_task(
  store: Arc<InMemoryCacheStore>,
  interval: Duration,
  mut shutdown: broadcast::Receiver<()>,
) {
  let mut ticker = tokio::time::interval(interval);
  loop {
    tokio::select! {
      _ = ticker.tick() => {
        let expired = store.evict_expired();
        if expired > 0 {
          tracing::debug!("Evicted {} expired keys", expired);
        }
      }
      _ = shutdown.recv() => break,
    }
  }
}

/// Convert a glob pattern to a regex
pub(crate) fn glob_to_regex(pattern: &str) -> Result<regex::Regex, CacheError> {
  let mut regex_str = String::with_capacity(pattern.len() * 2);
  regex_str.push('^');

  for c in pattern.chars() {
    match c {
      '*' => regex_str.push_str(".*"),
      '?' => regex_str.push('.'),
      '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '^' | '$' | '\\' => {
        regex_str.push('\\');
        regex_str.push(c);
      }
      _ => regex_str.push(c),
    }
  }

  regex_str.push('$');
  regex::Regex::new(&regex_str)
    .map_err(|e| CacheError::Command(format!("invalid pattern '{}': {}", pattern, e)))
}
