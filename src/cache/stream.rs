//! Append-only stream with Redis-style entry ids

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CacheError;

/// Stream entry id: `{milliseconds}-{sequence}`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId {
  pub ms: u64,
  pub seq: u64,
}

impl StreamId {
  pub fn new(ms: u64, seq: u64) -> Self {
    Self { ms, seq }
  }

  /// Next id after `self` for an append at wall-clock time `now_ms`
  pub fn next(&self, now_ms: u64) -> Self {
    if now_ms > self.ms {
      Self::new(now_ms, 0)
    } else {
      Self::new(self.ms, self.seq + 1)
    }
  }
}

impl fmt::Display for StreamId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.ms, self.seq)
  }
}

impl FromStr for StreamId {
  type Err = CacheError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || CacheError::InvalidStreamId(s.to_string());
    match s.split_once('-') {
      Some((ms, seq)) => Ok(Self::new(
        ms.parse().map_err(|_| invalid())?,
        seq.parse().map_err(|_| invalid())?,
      )),
      None => Ok(Self::new(s.parse().map_err(|_| invalid())?, 0)),
    }
  }
}

/// One stream entry: id plus ordered field/value pairs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEntry {
  pub id: StreamId,
  pub fields: Vec<(String, String)>,
}

impl StreamEntry {
  pub fn get(&self, field: &str) -> Option<&str> {
    self
      .fields
      .iter()
      .find(|(name, _)| name == field)
      .map(|(_, value)| value.as_str())
  }
}

#[derive(Debug, Clone, Default)]
pub struct Stream {
  entries: Vec<StreamEntry>,
  last_id: StreamId,
}

impl Stream {
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Append with an auto-generated id (XADD key *)
  pub fn append(&mut self, now_ms: u64, fields: Vec<(String, String)>) -> StreamId {
    let id = self.last_id.next(now_ms);
    self.last_id = id;
    self.entries.push(StreamEntry { id, fields });
    id
  }

  /// Newest entry (XREVRANGE key + - COUNT 1)
  pub fn last(&self) -> Option<&StreamEntry> {
    self.entries.last()
  }

  pub fn entries(&self) -> &[StreamEntry] {
    &self.entries
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_ids_are_monotonic_within_same_millisecond() {
    let mut stream = Stream::default();
    let a = stream.append(1000, vec![("f".into(), "1".into())]);
    let b = stream.append(1000, vec![("f".into(), "2".into())]);
    let c = stream.append(999, vec![("f".into(), "3".into())]);
    assert!(a < b && b < c);
    assert_eq!(b, StreamId::new(1000, 1));
    assert_eq!(c, StreamId::new(1000, 2));
  }

  #[test]
  fn test_last_entry() {
    let mut stream = Stream::default();
    assert!(stream.last().is_none());
    stream.append(1, vec![("marketcap".into(), "100".into())]);
    stream.append(2, vec![("marketcap".into(), "105".into())]);
    assert_eq!(stream.last().and_then(|e| e.get("marketcap")), Some("105"));
  }

  #[test]
  fn test_parse_stream_id() {
    assert_eq!(
      "1526919030474-55".parse::<StreamId>().unwrap(),
      StreamId::new(1526919030474, 55)
    );
    assert_eq!("42".parse::<StreamId>().unwrap(), StreamId::new(42, 0));
    assert!("abc-1".parse::<StreamId>().is_err());
    assert_eq!(StreamId::new(7, 3).to_string(), "7-3");
  }
}
