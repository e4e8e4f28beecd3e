use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

use super::{HttpServer, ServerConfig};
use crate::cache::{
  run_expiration_task, CacheBackend, CacheConfig, CacheMode, InMemoryCacheStore, RedisCacheStore,
};
use crate::db::DurableStore;
use crate::leaderboard::{
  spawn_ticker, ChangeNotifier, RankService, RankStore, ReadThroughRankStore, Sweeper,
  WriteBehindQueue, TICK_QUEUE_CAPACITY,
};

/// Cache the daemon runs against
#[derive(Clone)]
pub enum CacheHandle {
  Builtin(Arc<InMemoryCacheStore>),
  Redis(Arc<RedisCacheStore>),
}

impl CacheHandle {
  pub async fn connect(config: &CacheConfig) -> Result<Self, anyhow::Error> {
    match config.mode {
      CacheMode::Builtin => {
        tracing::info!("Using builtin in-memory cache");
        Ok(Self::Builtin(Arc::new(InMemoryCacheStore::new())))
      }
      CacheMode::Redis => {
        let store = RedisCacheStore::new(&config.redis).await?;
        store.test_connection().await?;
        tracing::info!(
          "Connected to Redis at {}:{}",
          config.redis.host,
          config.redis.port
        );
        Ok(Self::Redis(Arc::new(store)))
      }
    }
  }

  pub fn backend(&self) -> Arc<dyn CacheBackend> {
    match self {
      Self::Builtin(store) => store.clone(),
      Self::Redis(store) => store.clone(),
    }
  }
}

pub struct Daemon {
  config: ServerConfig,
  cache: CacheHandle,
  durable: Arc<dyn DurableStore>,
  shutdown_tx: broadcast::Sender<()>,
}

impl Daemon {
  pub fn new(config: ServerConfig, cache: CacheHandle, durable: Arc<dyn DurableStore>) -> Self {
    let (shutdown_tx, _) = broadcast::channel(1);
    Self {
      config,
      cache,
      durable,
      shutdown_tx,
    }
  }

  /// Rank service selected by `read_through.enabled`
  pub fn rank_service(&self) -> Arc<dyn RankService> {
    let store = RankStore::new(self.cache.backend(), self.config.leaderboard.clone());
    if self.config.read_through.enabled {
      Arc::new(ReadThroughRankStore::new(store, self.durable.clone()))
    } else {
      Arc::new(store)
    }
  }

  /// Trigger graceful shutdown of every task
  pub fn shutdown(&self) {
    tracing::info!("Initiating graceful shutdown...");
    let _ = self.shutdown_tx.send(());
  }

  pub async fn run(&self) -> Result<(), anyhow::Error> {
    tracing::info!("Initializing database schema...");
    self.durable.init_schema().await?;

    let cache = self.cache.backend();

    if let CacheHandle::Builtin(store) = &self.cache {
      let interval = Duration::from_secs(self.config.cache.expiry_interval_secs.max(1));
      tokio::spawn(run_expiration_task(
        store.clone(),
        interval,
        self.shutdown_tx.subscribe(),
      ));
    }

    let mut sweeper_task = None;
    let write_behind = &self.config.write_behind;
    if write_behind.enabled {
      let queue = WriteBehindQueue::new(cache.clone(), write_behind.table.clone());

      // Subscribe before the listener starts so no early event is missed
      let events = cache.subscribe_keyspace();
      cache.start_keyspace_listener().await?;
      let notifier = ChangeNotifier::new(
        cache.clone(),
        queue.clone(),
        self.config.leaderboard.clone(),
      );
      let shutdown_rx = self.shutdown_tx.subscribe();
      tokio::spawn(async move { notifier.run(events, shutdown_rx).await });

      let (tick_tx, tick_rx) = mpsc::channel(TICK_QUEUE_CAPACITY);
      spawn_ticker(
        write_behind.sweep_interval(),
        tick_tx,
        self.shutdown_tx.subscribe(),
      );
      let sweeper = Sweeper::new(queue, self.durable.clone(), write_behind.ack_ttl());
      sweeper_task = Some(tokio::spawn(async move { sweeper.run(tick_rx).await }));
      tracing::info!(
        "Write-behind to table '{}' every {}s",
        write_behind.table,
        write_behind.sweep_interval().as_secs()
      );
    } else {
      tracing::info!("Write-behind disabled");
    }

    if self.config.server.http {
      let http = HttpServer::new(
        self.rank_service(),
        self.config.server.cors_origins.clone(),
        self.shutdown_tx.subscribe(),
      );
      http.run(&self.config.address()).await?;
    } else {
      tracing::info!("HTTP server disabled");
      let _ = self.shutdown_tx.subscribe().recv().await;
    }

    // Let an in-flight sweep commit before returning
    if let Some(task) = sweeper_task {
      if let Err(e) = task.await {
        tracing::error!("Sweeper task failed: {}", e);
      }
    }
    Ok(())
  }
}
