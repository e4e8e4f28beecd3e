//! Real-time leaderboard: ranked cache, change capture and write-behind.

mod keys;
mod notifier;
mod rank_store;
mod read_through;
mod sweeper;
mod types;
mod write_behind;

pub use keys::{
  key_from_channel, primary_key_from_stream, stream_name, stream_pattern, symbol_of,
  LeaderboardKeys, DEFAULT_KEY_PREFIX, DEFAULT_LEADERBOARD_KEY,
};
pub use notifier::{classify, ChangeNotifier, EventKind, NotifyOutcome, DELETE_EVENTS, SET_EVENTS};
pub use rank_store::{RankService, RankStore};
pub use read_through::ReadThroughRankStore;
pub use sweeper::{
  parse_record, spawn_ticker, SweepOutcome, SweepReport, Sweeper, Tick, TICK_QUEUE_CAPACITY,
};
pub use types::{CompanyMeta, DurableRecord, Entry};
pub use write_behind::{WriteBehindConfig, WriteBehindQueue};
