use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cache::CacheConfig;
use crate::leaderboard::{LeaderboardKeys, WriteBehindConfig};

/// Expand environment variables in a string.
/// Supports $VAR_NAME and ${VAR_NAME} syntax.
fn expand_env_vars(input: &str) -> String {
  let mut result = input.to_string();

  // ${VAR_NAME} first, so the bare form never sees the braces
  while let Some(start) = result.find("${") {
    if let Some(end) = result[start..].find('}') {
      let var_name = &result[start + 2..start + end];
      let value = std::env::var(var_name).unwrap_or_default();
      result = format!(
        "{}{}{}",
        &result[..start],
        value,
        &result[start + end + 1..]
      );
    } else {
      break;
    }
  }

  let mut i = 0;
  while i < result.len() {
    if result[i..].starts_with('$') && !result[i..].starts_with("${") {
      let rest = &result[i + 1..];
      let var_len = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .count();
      if var_len > 0 {
        let var_name = &rest[..var_len];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..i], value, &rest[var_len..]);
        i += value.len();
        continue;
      }
    }
    i += 1;
  }

  result
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
  Postgres,
  #[default]
  Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
  #[serde(default)]
  pub server: ServerSection,
  #[serde(default)]
  pub backend: BackendType,
  #[serde(default)]
  pub postgres: PostgresSection,
  #[serde(default)]
  pub sqlite: SqliteSection,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Sorted set and member key naming
  #[serde(default)]
  pub leaderboard: LeaderboardKeys,
  #[serde(default)]
  pub write_behind: WriteBehindConfig,
  #[serde(default)]
  pub read_through: ReadThroughSection,
  #[serde(default)]
  pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
  #[serde(default = "default_host")]
  pub host: String,
  #[serde(default = "default_http_port")]
  pub port: u16,
  /// Serve the HTTP reader API
  #[serde(default = "default_true")]
  pub http: bool,
  /// CORS allowed origins; ["*"] is permissive
  #[serde(default = "default_cors_origins")]
  pub cors_origins: Vec<String>,
}

fn default_host() -> String {
  "0.0.0.0".into()
}

fn default_http_port() -> u16 {
  8080
}

fn default_true() -> bool {
  true
}

fn default_cors_origins() -> Vec<String> {
  vec!["*".to_string()]
}

impl Default for ServerSection {
  fn default() -> Self {
    Self {
      host: default_host(),
      port: default_http_port(),
      http: true,
      cors_origins: default_cors_origins(),
    }
  }
}

/// Durable fallback for cache misses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadThroughSection {
  #[serde(default = "default_true")]
  pub enabled: bool,
}

impl Default for ReadThroughSection {
  fn default() -> Self {
    Self { enabled: true }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresSection {
  #[serde(default = "default_pg_url")]
  pub url: String,
  #[serde(default = "default_max_conn")]
  pub max_connections: usize,
}
fn default_pg_url() -> String {
  "postgres://localhost/leaderboard".into()
}
fn default_max_conn() -> usize {
  20
}
impl Default for PostgresSection {
  fn default() -> Self {
    Self {
      url: default_pg_url(),
      max_connections: default_max_conn(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteSection {
  #[serde(default = "default_sqlite_path")]
  pub path: String,
}
fn default_sqlite_path() -> String {
  "leaderboard.db".into()
}
impl Default for SqliteSection {
  fn default() -> Self {
    Self {
      path: default_sqlite_path(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
  #[serde(default = "default_level")]
  pub level: String,
}
fn default_level() -> String {
  "info".into()
}
impl Default for LoggingSection {
  fn default() -> Self {
    Self {
      level: default_level(),
    }
  }
}

impl ServerConfig {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
    let content = std::fs::read_to_string(&path)?;
    Self::from_yaml(&content)
  }

  /// Parse YAML after environment variable expansion
  pub fn from_yaml(content: &str) -> Result<Self, anyhow::Error> {
    let expanded = expand_env_vars(content);
    Ok(serde_yaml::from_str(&expanded)?)
  }

  pub fn find_and_load() -> Result<Option<Self>, anyhow::Error> {
    for p in ["leaderboard.yaml", "leaderboard.yml"] {
      if Path::new(p).exists() {
        tracing::info!("Loading config from {}", p);
        return Ok(Some(Self::from_file(p)?));
      }
    }
    Ok(None)
  }

  pub fn address(&self) -> String {
    format!("{}:{}", self.server.host, self.server.port)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_expand_env_vars() {
    std::env::set_var("LEADERBOARD_TEST_HOST", "db.internal");
    assert_eq!(
      expand_env_vars("postgres://${LEADERBOARD_TEST_HOST}/lb"),
      "postgres://db.internal/lb"
    );
    assert_eq!(
      expand_env_vars("host: $LEADERBOARD_TEST_HOST:5432"),
      "host: db.internal:5432"
    );
    assert_eq!(expand_env_vars("${LEADERBOARD_TEST_UNSET_VAR}x"), "x");
    assert_eq!(expand_env_vars("cost: 5$"), "cost: 5$");
  }

  #[test]
  fn test_defaults() {
    let config = ServerConfig::default();
    assert_eq!(config.backend, BackendType::Sqlite);
    assert_eq!(config.address(), "0.0.0.0:8080");
    assert_eq!(config.write_behind.table, "company");
    assert_eq!(config.write_behind.ack_ttl_secs, 10);
    assert_eq!(config.leaderboard.leaderboard_key, "REDIS_LEADERBOARD");
    assert!(config.read_through.enabled);
  }
}
