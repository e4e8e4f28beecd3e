//! Sorted set with Redis ordering and rank semantics

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// Score wrapper giving f64 a total order
#[derive(Debug, Clone, Copy)]
struct Score(f64);

impl PartialEq for Score {
  fn eq(&self, other: &Self) -> bool {
    self.0.total_cmp(&other.0) == Ordering::Equal
  }
}

impl Eq for Score {}

impl PartialOrd for Score {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Score {
  fn cmp(&self, other: &Self) -> Ordering {
    self.0.total_cmp(&other.0)
  }
}

/// Members ordered by (score, member), ascending, like a Redis zset
#[derive(Debug, Clone, Default)]
pub struct SortedSet {
  scores: HashMap<String, f64>,
  ordered: BTreeSet<(Score, String)>,
}

impl SortedSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.scores.len()
  }

  pub fn is_empty(&self) -> bool {
    self.scores.is_empty()
  }

  /// Set the absolute score of a member. Returns true when the member is new.
  pub fn insert(&mut self, member: &str, score: f64) -> bool {
    match self.scores.insert(member.to_string(), score) {
      Some(old) => {
        self.ordered.remove(&(Score(old), member.to_string()));
        self.ordered.insert((Score(score), member.to_string()));
        false
      }
      None => {
        self.ordered.insert((Score(score), member.to_string()));
        true
      }
    }
  }

  pub fn remove(&mut self, member: &str) -> bool {
    match self.scores.remove(member) {
      Some(score) => {
        self.ordered.remove(&(Score(score), member.to_string()));
        true
      }
      None => false,
    }
  }

  pub fn score(&self, member: &str) -> Option<f64> {
    self.scores.get(member).copied()
  }

  /// 0-based ascending rank (ZRANK)
  pub fn rank(&self, member: &str) -> Option<usize> {
    let score = self.scores.get(member)?;
    let target = (Score(*score), member.to_string());
    Some(self.ordered.range(..&target).count())
  }

  /// Members between two inclusive rank indices, with scores.
  ///
  /// Negative indices count from the end. With `reverse` the indices address
  /// the descending order (ZREVRANGE).
  pub fn range(&self, start: isize, stop: isize, reverse: bool) -> Vec<(String, f64)> {
    let Some((from, to)) = normalize_range(start, stop, self.len()) else {
      return Vec::new();
    };
    let take = to - from + 1;
    let pairs = |(score, member): &(Score, String)| (member.clone(), score.0);

    if reverse {
      self.ordered.iter().rev().skip(from).take(take).map(pairs).collect()
    } else {
      self.ordered.iter().skip(from).take(take).map(pairs).collect()
    }
  }
}

/// Clamp Redis-style inclusive indices to `[0, len)`; None when the window is empty.
fn normalize_range(start: isize, stop: isize, len: usize) -> Option<(usize, usize)> {
  if len == 0 {
    return None;
  }
  let len = len as isize;
  let mut start = if start < 0 { start + len } else { start };
  let mut stop = if stop < 0 { stop + len } else { stop };
  if start < 0 {
    start = 0;
  }
  if stop >= len {
    stop = len - 1;
  }
  if start > stop || start >= len {
    return None;
  }
  Some((start as usize, stop as usize))
}
