//! Redis-compatible ranked cache
//!
//! Provides the data structures the leaderboard needs:
//! - Sorted sets for the ranking itself
//! - Hashes for per-entity metadata
//! - Streams for the per-key change logs
//! - Keyspace notifications for change capture
//!
//! Either embedded in-process or proxied to an external Redis server.

pub mod config;
mod entry;
mod events;
mod proxy;
mod sorted_set;
mod store;
mod stream;

pub use config::{CacheConfig, CacheMode, RedisConnectionConfig};
pub use entry::{CacheEntry, CacheValue};
pub use events::{
  relay_keyspace, KeyspaceBus, KeyspaceEvent, KEYSPACE_PATTERN, MAX_RESUBSCRIBE_DELAY,
  RESUBSCRIBE_DELAY,
};
pub use proxy::RedisCacheStore;
pub use sorted_set::SortedSet;
pub use store::{run_expiration_task, CacheBackend, InMemoryCacheStore};
pub use stream::{Stream, StreamEntry, StreamId};
