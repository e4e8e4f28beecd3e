//! Cache backend proxying to an external Redis server

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::streams::StreamRangeReply;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;

use super::config::RedisConnectionConfig;
use super::events::{
  relay_keyspace, KeyspaceBus, KeyspaceEvent, KEYSPACE_PATTERN, RESUBSCRIBE_DELAY,
};
use super::store::CacheBackend;
use super::stream::{StreamEntry, StreamId};
use crate::error::CacheError;

/// Redis-backed cache store that also relays keyspace notifications
pub struct RedisCacheStore {
  client: Client,
  connection: ConnectionManager,
  bus: KeyspaceBus,
}

impl RedisCacheStore {
  /// Connect using the given configuration
  pub async fn new(config: &RedisConnectionConfig) -> Result<Self, CacheError> {
    let client = Client::open(config.connection_url())?;
    let connection = ConnectionManager::new(client.clone()).await?;
    Ok(Self {
      client,
      connection,
      bus: KeyspaceBus::default(),
    })
  }

  /// Test the connection to Redis
  pub async fn test_connection(&self) -> Result<(), CacheError> {
    let mut conn = self.connection.clone();
    redis::cmd("PING").query_async::<()>(&mut conn).await?;
    Ok(())
  }
}

fn value_to_string(value: &redis::Value) -> Option<String> {
  redis::from_redis_value::<String>(value).ok()
}

/// Enable keyspace notifications and open a fresh pattern subscription
async fn keyspace_events(client: &Client) -> Result<BoxStream<'static, KeyspaceEvent>, CacheError> {
  let mut conn = client.get_multiplexed_async_connection().await?;
  redis::cmd("CONFIG")
    .arg("SET")
    .arg("notify-keyspace-events")
    .arg("KEA")
    .query_async::<()>(&mut conn)
    .await?;

  let mut pubsub = client.get_async_pubsub().await?;
  pubsub.psubscribe(KEYSPACE_PATTERN).await?;
  let events = pubsub.into_on_message().filter_map(|msg| async move {
    let channel = msg.get_channel_name().to_string();
    match msg.get_payload::<String>() {
      Ok(event) => Some(KeyspaceEvent::new(channel, event)),
      Err(e) => {
        tracing::warn!("Unreadable keyspace notification on {}: {}", channel, e);
        None
      }
    }
  });
  Ok(events.boxed())
}

#[async_trait]
impl CacheBackend for RedisCacheStore {
  async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<bool, CacheError> {
    let mut conn = self.connection.clone();
    let added: i64 = conn.zadd(key, member, score).await?;
    Ok(added > 0)
  }

  async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, CacheError> {
    let mut conn = self.connection.clone();
    Ok(conn.zscore(key, member).await?)
  }

  async fn zrank(&self, key: &str, member: &str) -> Result<Option<u64>, CacheError> {
    let mut conn = self.connection.clone();
    Ok(conn.zrank(key, member).await?)
  }

  async fn zrange_with_scores(
    &self,
    key: &str,
    start: isize,
    stop: isize,
    reverse: bool,
  ) -> Result<Vec<(String, f64)>, CacheError> {
    let mut conn = self.connection.clone();
    let items = if reverse {
      conn.zrevrange_withscores(key, start, stop).await?
    } else {
      conn.zrange_withscores(key, start, stop).await?
    };
    Ok(items)
  }

  async fn zcard(&self, key: &str) -> Result<usize, CacheError> {
    let mut conn = self.connection.clone();
    Ok(conn.zcard(key).await?)
  }

  async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<usize, CacheError> {
    let mut conn = self.connection.clone();
    let added: usize = redis::cmd("HSET")
      .arg(key)
      .arg(fields)
      .query_async(&mut conn)
      .await?;
    Ok(added)
  }

  async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, CacheError> {
    let mut conn = self.connection.clone();
    Ok(conn.hgetall(key).await?)
  }

  async fn hdel(&self, key: &str, fields: &[String]) -> Result<usize, CacheError> {
    let mut conn = self.connection.clone();
    Ok(conn.hdel(key, fields).await?)
  }

  async fn del(&self, key: &str) -> Result<bool, CacheError> {
    let mut conn = self.connection.clone();
    let removed: i64 = conn.del(key).await?;
    Ok(removed > 0)
  }

  async fn exists(&self, key: &str) -> Result<bool, CacheError> {
    let mut conn = self.connection.clone();
    Ok(conn.exists(key).await?)
  }

  async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
    let mut conn = self.connection.clone();
    Ok(conn.pexpire(key, ttl.as_millis() as i64).await?)
  }

  async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
    let mut conn = self.connection.clone();
    let pttl: i64 = conn.pttl(key).await?;
    // -2: missing key, -1: no expiry
    Ok((pttl >= 0).then(|| Duration::from_millis(pttl as u64)))
  }

  async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
    let mut conn = self.connection.clone();
    let mut keys: Vec<String> = conn.keys(pattern).await?;
    keys.sort();
    Ok(keys)
  }

  async fn xadd(&self, key: &str, fields: &[(String, String)]) -> Result<StreamId, CacheError> {
    let mut conn = self.connection.clone();
    let id: String = conn.xadd(key, "*", fields).await?;
    id.parse()
  }

  async fn xlast(&self, key: &str) -> Result<Option<StreamEntry>, CacheError> {
    let mut conn = self.connection.clone();
    let reply: StreamRangeReply = conn.xrevrange_count(key, "+", "-", 1).await?;
    let Some(newest) = reply.ids.into_iter().next() else {
      return Ok(None);
    };
    let mut fields: Vec<(String, String)> = newest
      .map
      .iter()
      .filter_map(|(name, value)| value_to_string(value).map(|v| (name.clone(), v)))
      .collect();
    fields.sort();
    Ok(Some(StreamEntry {
      id: newest.id.parse()?,
      fields,
    }))
  }

  fn subscribe_keyspace(&self) -> broadcast::Receiver<KeyspaceEvent> {
    self.bus.subscribe()
  }

  async fn start_keyspace_listener(&self) -> Result<(), CacheError> {
    let events = keyspace_events(&self.client).await?;
    tracing::info!("Subscribed to Redis keyspace notifications on {}", KEYSPACE_PATTERN);

    let client = self.client.clone();
    let connect = move || {
      let client = client.clone();
      async move { keyspace_events(&client).await }
    };
    tokio::spawn(relay_keyspace(self.bus.clone(), events, connect, RESUBSCRIBE_DELAY));
    Ok(())
  }
}
