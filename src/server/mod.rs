mod config;
mod daemon;
mod http;

pub use config::{
  BackendType, LoggingSection, PostgresSection, ReadThroughSection, ServerConfig, ServerSection,
  SqliteSection,
};
pub use daemon::{CacheHandle, Daemon};
pub use http::{router, AppState, HttpServer, KeysRequest, ScoreRequest, UpdateResponse};
