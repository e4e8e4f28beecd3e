//! Cache entry types

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::sorted_set::SortedSet;
use super::stream::Stream;

/// A cached entry with expiry metadata
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub value: CacheValue,
  pub expires_at: Option<Instant>,
}

impl CacheEntry {
  pub fn new(value: CacheValue) -> Self {
    Self {
      value,
      expires_at: None,
    }
  }

  pub fn is_expired(&self) -> bool {
    self
      .expires_at
      .map(|exp| Instant::now() >= exp)
      .unwrap_or(false)
  }

  pub fn ttl_remaining(&self) -> Option<Duration> {
    self.expires_at.and_then(|exp| {
      let now = Instant::now();
      if now >= exp {
        None
      } else {
        Some(exp - now)
      }
    })
  }

  pub fn update_ttl(&mut self, ttl: Option<Duration>) {
    self.expires_at = ttl.map(|d| Instant::now() + d);
  }
}

/// Redis data structures the leaderboard relies on
#[derive(Debug, Clone)]
pub enum CacheValue {
  Hash(HashMap<String, String>),
  SortedSet(SortedSet),
  Stream(Stream),
}

impl CacheValue {
  /// Whether the structure holds no elements (Redis drops such keys)
  pub fn is_empty(&self) -> bool {
    match self {
      CacheValue::Hash(h) => h.is_empty(),
      CacheValue::SortedSet(z) => z.is_empty(),
      CacheValue::Stream(s) => s.is_empty(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_entry_without_ttl_never_expires() {
    let entry = CacheEntry::new(CacheValue::Hash(HashMap::new()));
    assert!(!entry.is_expired());
    assert!(entry.ttl_remaining().is_none());
  }

  #[test]
  fn test_zero_ttl_expires_immediately() {
    let mut entry = CacheEntry::new(CacheValue::Hash(HashMap::new()));
    entry.update_ttl(Some(Duration::ZERO));
    assert!(entry.is_expired());
  }

  #[test]
  fn test_empty_values() {
    assert!(CacheValue::Hash(HashMap::new()).is_empty());
    assert!(CacheValue::SortedSet(SortedSet::default()).is_empty());

    let mut stream = Stream::default();
    stream.append(1, vec![("f".to_string(), "v".to_string())]);
    assert!(!CacheValue::Stream(stream).is_empty());
  }
}
