//! Leaderboard benchmarks: cached range queries, updates and sweeps.
//!
//! Run with: cargo bench --bench leaderboard

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use leaderboard::cache::{CacheBackend, InMemoryCacheStore};
use leaderboard::db::{DurableStore, SqliteBackend};
use leaderboard::leaderboard::{
  ChangeNotifier, Entry, LeaderboardKeys, RankService, RankStore, Sweeper, WriteBehindQueue,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn create_runtime() -> Runtime {
  tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .unwrap()
}

fn seeded_store(rt: &Runtime, count: usize) -> (Arc<InMemoryCacheStore>, RankStore) {
  rt.block_on(async {
    let cache = Arc::new(InMemoryCacheStore::new());
    let store = RankStore::new(cache.clone(), LeaderboardKeys::default());
    for i in 0..count {
      store
        .populate(&Entry {
          symbol: format!("sym{}", i),
          company: format!("Company {}", i),
          country: "US".to_string(),
          rank: 0,
          market_cap: (i * 7 % 1000) as f64,
        })
        .await
        .unwrap();
    }
    (cache, store)
  })
}

fn bench_range(c: &mut Criterion) {
  let rt = create_runtime();
  let (_, store) = seeded_store(&rt, 10_000);

  let mut group = c.benchmark_group("range");
  for size in [10i64, 100, 1000] {
    group.throughput(Throughput::Elements(size as u64));
    group.bench_with_input(BenchmarkId::new("descending", size), &size, |b, &size| {
      b.iter(|| {
        rt.block_on(async {
          black_box(store.range(0, size - 1, true).await.unwrap());
        });
      });
    });
    group.bench_with_input(BenchmarkId::new("ascending", size), &size, |b, &size| {
      b.iter(|| {
        rt.block_on(async {
          black_box(store.range(0, size - 1, false).await.unwrap());
        });
      });
    });
  }
  group.finish();
}

fn bench_update(c: &mut Criterion) {
  let rt = create_runtime();
  let (_, store) = seeded_store(&rt, 10_000);

  let mut group = c.benchmark_group("update");
  group.throughput(Throughput::Elements(1));

  let mut i = 0u64;
  group.bench_function("absolute_score", |b| {
    b.iter(|| {
      i += 1;
      rt.block_on(async {
        black_box(store.update("sym42", i as f64).await);
      });
    });
  });
  group.finish();
}

fn bench_capture_and_sweep(c: &mut Criterion) {
  let rt = create_runtime();

  let mut group = c.benchmark_group("write_behind");
  for count in [10usize, 100] {
    group.throughput(Throughput::Elements(count as u64));
    group.bench_with_input(BenchmarkId::new("sweep", count), &count, |b, &count| {
      b.iter_batched(
        || {
          rt.block_on(async {
            let cache = Arc::new(InMemoryCacheStore::new());
            let keys = LeaderboardKeys::default();
            let store = RankStore::new(cache.clone(), keys.clone());
            let queue = WriteBehindQueue::new(cache.clone(), "company");
            let notifier = ChangeNotifier::new(cache.clone(), queue.clone(), keys);
            let durable = Arc::new(SqliteBackend::in_memory().await.unwrap());
            durable.init_schema().await.unwrap();

            let mut rx = cache.subscribe_keyspace();
            for i in 0..count {
              store
                .populate(&Entry {
                  symbol: format!("sym{}", i),
                  company: format!("Company {}", i),
                  country: "US".to_string(),
                  rank: 0,
                  market_cap: i as f64,
                })
                .await
                .unwrap();
            }
            while let Ok(event) = rx.try_recv() {
              notifier.handle(&event).await.unwrap();
            }
            Sweeper::new(queue, durable, Duration::from_secs(10))
          })
        },
        |sweeper| {
          rt.block_on(async {
            black_box(sweeper.tick().await);
          });
        },
        criterion::BatchSize::SmallInput,
      );
    });
  }
  group.finish();
}

criterion_group!(benches, bench_range, bench_update, bench_capture_and_sweep);
criterion_main!(benches);
