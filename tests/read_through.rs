use chrono::{TimeZone, Utc};
use leaderboard::cache::{CacheBackend, InMemoryCacheStore};
use leaderboard::db::{DurableStore, SqliteBackend};
use leaderboard::error::RankError;
use leaderboard::leaderboard::{
  DurableRecord, Entry, LeaderboardKeys, RankService, RankStore, ReadThroughRankStore,
};
use std::sync::Arc;

fn record(symbol: &str, market_cap: f64, rank: i64) -> DurableRecord {
  DurableRecord {
    symbol: symbol.to_string(),
    company: format!("{} Holdings", symbol),
    country: "DE".to_string(),
    rank,
    market_cap,
    last_modified: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
  }
}

async fn setup(rows: &[DurableRecord]) -> (Arc<InMemoryCacheStore>, ReadThroughRankStore) {
  let cache = Arc::new(InMemoryCacheStore::new());
  let durable = Arc::new(SqliteBackend::in_memory().await.unwrap());
  durable.init_schema().await.unwrap();
  for row in rows {
    durable.merge_upsert(row).await.unwrap();
  }
  let inner = RankStore::new(cache.clone(), LeaderboardKeys::default());
  (cache, ReadThroughRankStore::new(inner, durable))
}

#[tokio::test]
async fn test_get_by_key_reads_through_and_populates() {
  let (cache, store) = setup(&[record("sap", 200.0, 7)]).await;

  let hit = store.get_by_key("sap").await.unwrap().unwrap();
  assert_eq!(
    hit,
    Entry {
      symbol: "sap".to_string(),
      company: "sap Holdings".to_string(),
      country: "DE".to_string(),
      rank: 7,
      market_cap: 200.0,
    }
  );

  // Now served from the cache
  assert_eq!(
    cache.zscore("REDIS_LEADERBOARD", "company:sap").await.unwrap(),
    Some(200.0)
  );
  let cached = store.inner().get_by_key("sap").await.unwrap().unwrap();
  assert_eq!(cached.market_cap, 200.0);
  assert_eq!(cached.company, "sap Holdings");
}

#[tokio::test]
async fn test_get_by_key_miss_everywhere() {
  let (cache, store) = setup(&[]).await;
  assert!(store.get_by_key("nothing").await.unwrap().is_none());
  assert_eq!(cache.zcard("REDIS_LEADERBOARD").await.unwrap(), 0);
}

#[tokio::test]
async fn test_cache_hit_skips_durable() {
  let (_, store) = setup(&[record("sap", 200.0, 7)]).await;
  store
    .inner()
    .populate(&Entry {
      symbol: "sap".to_string(),
      company: "SAP SE".to_string(),
      country: "DE".to_string(),
      rank: 0,
      market_cap: 250.0,
    })
    .await
    .unwrap();

  let hit = store.get_by_key("company:sap").await.unwrap().unwrap();
  assert_eq!(hit.market_cap, 250.0);
  assert_eq!(hit.rank, 0);
}

#[tokio::test]
async fn test_empty_range_reads_ordered_slice() {
  let rows = [
    record("a", 10.0, 4),
    record("b", 40.0, 1),
    record("c", 30.0, 2),
    record("d", 20.0, 3),
  ];
  let (cache, store) = setup(&rows).await;

  let top = store.range(0, 1, true).await.unwrap();
  let symbols: Vec<_> = top.iter().map(|e| (e.symbol.as_str(), e.rank)).collect();
  assert_eq!(symbols, vec![("b", 1), ("c", 2)]);
  assert_eq!(cache.zcard("REDIS_LEADERBOARD").await.unwrap(), 2);

  // The populated window now answers from the cache with computed ranks
  let again = store.range(0, 1, true).await.unwrap();
  assert_eq!(again[0].symbol, "b");
  assert_eq!(again[1].rank, 2);
}

#[tokio::test]
async fn test_ascending_fallback_slice() {
  let rows = [record("a", 10.0, 3), record("b", 20.0, 2), record("c", 30.0, 1)];
  let (_, store) = setup(&rows).await;

  let low = store.range(1, 2, false).await.unwrap();
  let symbols: Vec<_> = low.iter().map(|e| e.symbol.as_str()).collect();
  assert_eq!(symbols, vec!["b", "c"]);
}

#[tokio::test]
async fn test_negative_or_inverted_range_does_not_fall_back() {
  let (cache, store) = setup(&[record("a", 10.0, 1)]).await;
  assert!(store.range(-2, -1, true).await.unwrap().is_empty());
  assert!(store.range(3, 1, true).await.unwrap().is_empty());
  assert_eq!(cache.zcard("REDIS_LEADERBOARD").await.unwrap(), 0);
}

#[tokio::test]
async fn test_get_metadata_falls_back() {
  let (_, store) = setup(&[record("bmw", 60.0, 9)]).await;

  let meta = store.get_metadata("company:bmw").await.unwrap();
  assert_eq!(meta.company, "bmw Holdings");
  assert_eq!(meta.country, "DE");

  let err = store.get_metadata("company:none").await.unwrap_err();
  assert!(matches!(err, RankError::MetadataNotFound(_)));
}

#[tokio::test]
async fn test_get_by_keys_mixes_hits_and_fallbacks() {
  let (_, store) = setup(&[record("y", 500.0, 1)]).await;
  store
    .inner()
    .populate(&Entry {
      symbol: "x".to_string(),
      company: "X".to_string(),
      country: "US".to_string(),
      rank: 0,
      market_cap: 5.0,
    })
    .await
    .unwrap();

  let keys = vec!["company:x".to_string(), "company:y".to_string()];
  let entries = store.get_by_keys(&keys).await.unwrap();
  let ranks: Vec<_> = entries.iter().map(|e| (e.market_cap, e.rank)).collect();
  assert_eq!(ranks, vec![(5.0, 1), (500.0, 2)]);
}

#[tokio::test]
async fn test_update_delegates_to_cache() {
  let (cache, store) = setup(&[record("sap", 200.0, 7)]).await;
  // Metadata is read through before the score is written back
  store.get_by_key("sap").await.unwrap();
  assert!(store.update("sap", 300.0).await);
  assert_eq!(
    cache.zscore("REDIS_LEADERBOARD", "company:sap").await.unwrap(),
    Some(300.0)
  );
}
