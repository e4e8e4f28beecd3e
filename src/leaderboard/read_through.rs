use async_trait::async_trait;
use std::sync::Arc;

use super::keys::symbol_of;
use super::rank_store::{RankService, RankStore};
use super::types::{CompanyMeta, DurableRecord, Entry};
use crate::db::DurableStore;
use crate::error::RankError;

/// Rank service that falls back to durable storage on cache misses and
/// repopulates the cache from what it finds.
///
/// Entries served from a fallback carry the rank stored in the durable row,
/// not a position computed from the cache.
#[derive(Clone)]
pub struct ReadThroughRankStore {
  inner: RankStore,
  durable: Arc<dyn DurableStore>,
}

impl ReadThroughRankStore {
  pub fn new(inner: RankStore, durable: Arc<dyn DurableStore>) -> Self {
    Self { inner, durable }
  }

  pub fn inner(&self) -> &RankStore {
    &self.inner
  }

  /// Durable lookup by symbol; a hit is written back to the cache
  async fn load(&self, symbol: &str) -> Result<Option<DurableRecord>, RankError> {
    let record = self
      .durable
      .get_by_symbol(symbol)
      .await
      .map_err(RankError::Durable)?;
    if let Some(record) = &record {
      self.inner.populate(&record.to_entry()).await?;
      tracing::debug!("Read through {} from durable storage", symbol);
    }
    Ok(record)
  }
}

#[async_trait]
impl RankService for ReadThroughRankStore {
  async fn try_update(&self, symbol: &str, score: f64) -> Result<(), RankError> {
    self.inner.try_update(symbol, score).await
  }

  async fn range(&self, start: i64, end: i64, descending: bool) -> Result<Vec<Entry>, RankError> {
    let items = self.inner.cached_range(start, end, descending).await?;
    if !items.is_empty() {
      return self.inner.ranked_window(items, start, descending).await;
    }
    // Negative indices have no meaning as an offset into the durable table
    if start < 0 || end < start {
      return Ok(Vec::new());
    }

    let records = self
      .durable
      .get_range(start as usize, (end - start + 1) as usize, descending)
      .await
      .map_err(RankError::Durable)?;
    let mut entries = Vec::with_capacity(records.len());
    for record in &records {
      let entry = record.to_entry();
      self.inner.populate(&entry).await?;
      entries.push(entry);
    }
    tracing::debug!(
      "Read through {} rows for range {}..={}",
      entries.len(),
      start,
      end
    );
    Ok(entries)
  }

  async fn get_by_keys(&self, keys: &[String]) -> Result<Vec<Entry>, RankError> {
    let mut entries = Vec::with_capacity(keys.len());
    for (i, key) in keys.iter().enumerate() {
      let member = self.inner.keys().normalize(key);
      let meta = self.get_metadata(&member).await?;
      let score = self
        .inner
        .score(&member)
        .await?
        .ok_or_else(|| RankError::NotRanked(member.clone()))?;
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
    let member = self.inner.keys().normalize(key);
    if let Some(entry) = self.inner.get_by_key(&member).await? {
      return Ok(Some(entry));
    }
    let symbol = symbol_of(&member)?;
    Ok(self.load(symbol).await?.map(|record| record.to_entry()))
  }

  async fn get_metadata(&self, key: &str) -> Result<CompanyMeta, RankError> {
    match self.inner.get_metadata(key).await {
      Err(RankError::MetadataNotFound(missing)) => {
        let member = self.inner.keys().normalize(key);
        let symbol = symbol_of(&member)?;
        match self.load(symbol).await? {
          Some(record) => Ok(record.meta()),
          None => Err(RankError::MetadataNotFound(missing)),
        }
      }
      other => other,
    }
  }
}
