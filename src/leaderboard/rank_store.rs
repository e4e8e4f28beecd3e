use async_trait::async_trait;
use std::sync::Arc;

use super::keys::{symbol_of, LeaderboardKeys};
use super::types::{CompanyMeta, Entry};
use crate::cache::CacheBackend;
use crate::error::RankError;

/// Query and update surface of the leaderboard.
///
/// Implemented by [`RankStore`] (cache only) and
/// [`ReadThroughRankStore`](super::ReadThroughRankStore) (cache with durable
/// fallback); the daemon picks one from configuration.
#[async_trait]
pub trait RankService: Send + Sync {
  /// Set the absolute score for `symbol`.
  ///
  /// Returns false on any failure; the cause is logged with its
  /// retryable/permanent classification. Use [`RankService::try_update`] to
  /// see the error.
  async fn update(&self, symbol: &str, score: f64) -> bool {
    match self.try_update(symbol, score).await {
      Ok(()) => true,
      Err(e) => {
        tracing::error!(
          symbol,
          retryable = e.is_retryable(),
          "Leaderboard update failed: {}",
          e
        );
        false
      }
    }
  }

  async fn try_update(&self, symbol: &str, score: f64) -> Result<(), RankError>;

  /// Entries between two inclusive rank indices
  async fn range(&self, start: i64, end: i64, descending: bool) -> Result<Vec<Entry>, RankError>;

  /// Entries for the given member keys, ranked by their position in `keys`
  async fn get_by_keys(&self, keys: &[String]) -> Result<Vec<Entry>, RankError>;

  /// Single entry; `None` when nothing is known about the key
  async fn get_by_key(&self, key: &str) -> Result<Option<Entry>, RankError>;

  /// Both metadata fields of a member, or a hard error
  async fn get_metadata(&self, key: &str) -> Result<CompanyMeta, RankError>;
}

/// Leaderboard served straight from the ranked cache
#[derive(Clone)]
pub struct RankStore {
  cache: Arc<dyn CacheBackend>,
  keys: LeaderboardKeys,
}

impl RankStore {
  pub fn new(cache: Arc<dyn CacheBackend>, keys: LeaderboardKeys) -> Self {
    Self { cache, keys }
  }

  pub fn keys(&self) -> &LeaderboardKeys {
    &self.keys
  }

  pub fn cache(&self) -> &Arc<dyn CacheBackend> {
    &self.cache
  }

  /// Write score and metadata for a symbol, lower-casing it into the member key
  pub async fn populate(&self, entry: &Entry) -> Result<(), RankError> {
    let member = self.keys.member_key(&entry.symbol.to_lowercase());
    self
      .cache
      .zadd(&self.keys.leaderboard_key, &member, entry.market_cap)
      .await?;
    let meta = CompanyMeta::new(entry.company.clone(), entry.country.clone());
    self.cache.hset(&member, &meta.to_fields()).await?;
    Ok(())
  }

  /// Cached score of a member key
  pub async fn score(&self, member: &str) -> Result<Option<f64>, RankError> {
    Ok(self.cache.zscore(&self.keys.leaderboard_key, member).await?)
  }

  /// Build entries from a cached window, numbering ranks from `start`.
  ///
  /// Descending windows count up from `start + 1`. Ascending windows count
  /// down from `len / 2 - start`.
  pub(crate) async fn ranked_window(
    &self,
    items: Vec<(String, f64)>,
    start: i64,
    descending: bool,
  ) -> Result<Vec<Entry>, RankError> {
    let (mut rank, step) = if descending {
      (start + 1, 1)
    } else {
      (items.len() as i64 / 2 - start, -1)
    };

    let mut entries = Vec::with_capacity(items.len());
    for (member, score) in items {
      let symbol = symbol_of(&member)?.to_string();
      let meta = self.get_metadata(&member).await?;
      entries.push(Entry {
        symbol,
        company: meta.company,
        country: meta.country,
        rank,
        market_cap: score,
      });
      rank += step;
    }
    Ok(entries)
  }

  /// Cached window, empty when the cache holds nothing in that range
  pub async fn cached_range(
    &self,
    start: i64,
    end: i64,
    descending: bool,
  ) -> Result<Vec<(String, f64)>, RankError> {
    Ok(
      self
        .cache
        .zrange_with_scores(
          &self.keys.leaderboard_key,
          start as isize,
          end as isize,
          descending,
        )
        .await?,
    )
  }
}

#[async_trait]
impl RankService for RankStore {
  async fn try_update(&self, symbol: &str, score: f64) -> Result<(), RankError> {
    let member = self.keys.normalize(symbol);
    self
      .cache
      .zadd(&self.keys.leaderboard_key, &member, score)
      .await?;
    let meta = self.get_metadata(&member).await?;
    // Rewriting the hash publishes the mutation the change notifier captures
    self.cache.hset(&member, &meta.to_fields()).await?;
    tracing::debug!("Updated {} to {}", member, score);
    Ok(())
  }

  async fn range(&self, start: i64, end: i64, descending: bool) -> Result<Vec<Entry>, RankError> {
    let items = self.cached_range(start, end, descending).await?;
    self.ranked_window(items, start, descending).await
  }

  async fn get_by_keys(&self, keys: &[String]) -> Result<Vec<Entry>, RankError> {
    let mut entries = Vec::with_capacity(keys.len());
    for (i, key) in keys.iter().enumerate() {
      let member = self.keys.normalize(key);
      let score = self
        .score(&member)
        .await?
        .ok_or_else(|| RankError::NotRanked(member.clone()))?;
      let meta = self.get_metadata(&member).await?;
      entries.push(Entry {
        symbol: key.clone(),
        company: meta.company,
        country: meta.country,
        rank: i as i64 + 1,
        market_cap: score,
      });
    }
    Ok(entries)
  }

  async fn get_by_key(&self, key: &str) -> Result<Option<Entry>, RankError> {
    let member = self.keys.normalize(key);
    let meta = match self.get_metadata(&member).await {
      Ok(meta) => meta,
      Err(RankError::MetadataNotFound(_)) => return Ok(None),
      Err(e) => return Err(e),
    };
    let score = self
      .score(&member)
      .await?
      .ok_or_else(|| RankError::NotRanked(member.clone()))?;
    Ok(Some(Entry {
      symbol: symbol_of(&member)?.to_string(),
      company: meta.company,
      country: meta.country,
      rank: 0,
      market_cap: score,
    }))
  }

  async fn get_metadata(&self, key: &str) -> Result<CompanyMeta, RankError> {
    let mut hash = self.cache.hgetall(key).await?;
    if hash.is_empty() {
      return Err(RankError::MetadataNotFound(key.to_string()));
    }
    let mut field = |name: &'static str| {
      hash.remove(name).ok_or_else(|| RankError::MissingField {
        key: key.to_string(),
        field: name,
      })
    };
    let company = field("company")?;
    let country = field("country")?;
    Ok(CompanyMeta { company, country })
  }
}
