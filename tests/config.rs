//! Server configuration: defaults, YAML sections and env expansion

use leaderboard::cache::CacheMode;
use leaderboard::server::{BackendType, ServerConfig};
use std::io::Write;

#[test]
fn test_empty_yaml_uses_defaults() {
  let config = ServerConfig::from_yaml("{}").unwrap();
  assert_eq!(config.backend, BackendType::Sqlite);
  assert_eq!(config.sqlite.path, "leaderboard.db");
  assert_eq!(config.cache.mode, CacheMode::Builtin);
  assert_eq!(config.cache.expiry_interval_secs, 1);
  assert_eq!(config.leaderboard.key_prefix, "company");
  assert!(config.write_behind.enabled);
  assert_eq!(config.write_behind.primary_key, "symbol");
  assert_eq!(config.write_behind.sweep_interval_secs, 5);
  assert_eq!(config.server.cors_origins, vec!["*"]);
  assert_eq!(config.logging.level, "info");
}

#[test]
fn test_full_yaml() {
  let yaml = r#"
server:
  host: 127.0.0.1
  port: 9090
  http: false
backend: postgres
postgres:
  url: postgres://lb@localhost/ranks
  max_connections: 4
cache:
  mode: redis
  redis:
    host: cache.local
    port: 6380
    database: 2
leaderboard:
  leaderboard_key: TOP_COMPANIES
  key_prefix: stock
write_behind:
  table: ranking
  primary_key: ticker
  sweep_interval_secs: 2
  ack_ttl_secs: 30
read_through:
  enabled: false
logging:
  level: debug
"#;
  let config = ServerConfig::from_yaml(yaml).unwrap();
  assert_eq!(config.address(), "127.0.0.1:9090");
  assert!(!config.server.http);
  assert_eq!(config.backend, BackendType::Postgres);
  assert_eq!(config.postgres.max_connections, 4);
  assert_eq!(config.cache.mode, CacheMode::Redis);
  assert_eq!(config.cache.redis.connection_url(), "redis://cache.local:6380/2");
  assert_eq!(config.leaderboard.member_key("ibm"), "stock:ibm");
  assert_eq!(config.write_behind.table, "ranking");
  assert_eq!(config.write_behind.ack_ttl().as_secs(), 30);
  assert!(!config.read_through.enabled);
  assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_zero_sweep_interval_is_clamped() {
  let config = ServerConfig::from_yaml("write_behind:\n  sweep_interval_secs: 0\n").unwrap();
  assert_eq!(config.write_behind.sweep_interval().as_secs(), 1);
}

#[test]
fn test_unknown_backend_is_rejected() {
  assert!(ServerConfig::from_yaml("backend: oracle\n").is_err());
}

#[test]
fn test_from_file_expands_env_vars() {
  std::env::set_var("LEADERBOARD_CFG_TEST_PORT", "7001");
  std::env::set_var("LEADERBOARD_CFG_TEST_DB", "/tmp/ranks.db");

  let mut file = tempfile::NamedTempFile::new().unwrap();
  writeln!(
    file,
    "server:\n  port: ${{LEADERBOARD_CFG_TEST_PORT}}\nsqlite:\n  path: $LEADERBOARD_CFG_TEST_DB"
  )
  .unwrap();

  let config = ServerConfig::from_file(file.path()).unwrap();
  assert_eq!(config.server.port, 7001);
  assert_eq!(config.sqlite.path, "/tmp/ranks.db");
}

#[test]
fn test_missing_file_is_an_error() {
  assert!(ServerConfig::from_file("/definitely/not/here.yaml").is_err());
}
