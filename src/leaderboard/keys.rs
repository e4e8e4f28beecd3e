//! Key naming shared by the rank store, the change notifier and the sweeper.
//!
//! These formats are persisted in the cache and read back by other
//! processes, so they must stay bit-exact.

use serde::{Deserialize, Serialize};

use crate::error::RankError;

pub const DEFAULT_LEADERBOARD_KEY: &str = "REDIS_LEADERBOARD";
pub const DEFAULT_KEY_PREFIX: &str = "company";

/// Names of the ranked structure and the per-entity keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardKeys {
  /// Sorted set holding every member and its score
  #[serde(default = "default_leaderboard_key")]
  pub leaderboard_key: String,
  /// Prefix of member keys, which double as metadata hash keys
  #[serde(default = "default_key_prefix")]
  pub key_prefix: String,
}

fn default_leaderboard_key() -> String {
  DEFAULT_LEADERBOARD_KEY.to_string()
}

fn default_key_prefix() -> String {
  DEFAULT_KEY_PREFIX.to_string()
}

impl Default for LeaderboardKeys {
  fn default() -> Self {
    Self {
      leaderboard_key: default_leaderboard_key(),
      key_prefix: default_key_prefix(),
    }
  }
}

impl LeaderboardKeys {
  /// `{prefix}:{symbol}`
  pub fn member_key(&self, symbol: &str) -> String {
    format!("{}:{}", self.key_prefix, symbol)
  }

  /// Accept either a member key or a bare symbol
  pub fn normalize(&self, key: &str) -> String {
    if key.contains(':') {
      key.to_string()
    } else {
      self.member_key(key)
    }
  }
}

/// Symbol part of a member key: the segment after the first `:`
pub fn symbol_of(member: &str) -> Result<&str, RankError> {
  member
    .split(':')
    .nth(1)
    .ok_or_else(|| RankError::InvalidKey(member.to_string()))
}

/// Change log name for one entity: `_{table}-stream-{key}`
pub fn stream_name(table: &str, key: &str) -> String {
  format!("_{}-stream-{}", table, key)
}

/// Glob matching every change log of `table`
pub fn stream_pattern(table: &str) -> String {
  format!("_{}-stream-*", table)
}

/// Entity key named by a keyspace channel.
///
/// `__keyspace@0__:company:aapl` yields `company:aapl`; a channel with any
/// other number of segments yields only the segment after the first `:`.
pub fn key_from_channel(channel: &str) -> Option<String> {
  let parts: Vec<&str> = channel.split(':').collect();
  match parts.as_slice() {
    [_, a, b] => Some(format!("{}:{}", a, b)),
    [_, a, ..] => Some(a.to_string()),
    _ => None,
  }
}

/// Durable primary key encoded in a change log name.
///
/// Takes the third `-` segment and, when it is a member key, the part after
/// its first `:`.
pub fn primary_key_from_stream(stream: &str) -> Option<String> {
  let raw = stream.split('-').nth(2)?;
  if raw.contains(':') {
    raw.split(':').nth(1).map(str::to_string)
  } else {
    Some(raw.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_member_key_and_symbol() {
    let keys = LeaderboardKeys::default();
    assert_eq!(keys.member_key("aapl"), "company:aapl");
    assert_eq!(keys.normalize("aapl"), "company:aapl");
    assert_eq!(keys.normalize("company:msft"), "company:msft");
    assert_eq!(symbol_of("company:aapl").unwrap(), "aapl");
    assert!(symbol_of("aapl").is_err());
  }

  #[test]
  fn test_stream_naming() {
    assert_eq!(stream_name("company", "company:aapl"), "_company-stream-company:aapl");
    assert_eq!(stream_pattern("company"), "_company-stream-*");
  }

  #[test]
  fn test_key_from_channel() {
    assert_eq!(
      key_from_channel("__keyspace@0__:company:aapl").as_deref(),
      Some("company:aapl")
    );
    assert_eq!(
      key_from_channel("__keyspace@0__:REDIS_LEADERBOARD").as_deref(),
      Some("REDIS_LEADERBOARD")
    );
    assert_eq!(key_from_channel("__keyspace@0__:a:b:c").as_deref(), Some("a"));
    assert_eq!(key_from_channel("no-colon"), None);
  }

  #[test]
  fn test_primary_key_from_stream() {
    assert_eq!(
      primary_key_from_stream("_company-stream-company:aapl").as_deref(),
      Some("aapl")
    );
    assert_eq!(primary_key_from_stream("_company-stream-tsla").as_deref(), Some("tsla"));
    // Only the third dash segment is considered
    assert_eq!(
      primary_key_from_stream("_company-stream-company:brk-b").as_deref(),
      Some("brk")
    );
    assert_eq!(primary_key_from_stream("_company"), None);
  }
}
