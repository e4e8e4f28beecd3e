//! Cache configuration

use serde::{Deserialize, Serialize};

/// Cache mode: builtin in-memory store or an external Redis server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
  /// In-memory cache (default)
  #[default]
  Builtin,
  /// External Redis server
  Redis,
}

impl std::fmt::Display for CacheMode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      CacheMode::Builtin => write!(f, "builtin"),
      CacheMode::Redis => write!(f, "redis"),
    }
  }
}

impl std::str::FromStr for CacheMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "builtin" | "memory" | "inmemory" => Ok(CacheMode::Builtin),
      "redis" | "external" | "proxy" => Ok(CacheMode::Redis),
      _ => Err(format!("Unknown cache mode: {}", s)),
    }
  }
}

/// Connection settings for an external Redis server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConnectionConfig {
  #[serde(default = "default_host")]
  pub host: String,

  #[serde(default = "default_redis_port")]
  pub port: u16,

  #[serde(default)]
  pub password: Option<String>,

  /// Redis database number
  #[serde(default)]
  pub database: u8,

  #[serde(default)]
  pub tls_enabled: bool,
}

fn default_host() -> String {
  "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
  6379
}

impl Default for RedisConnectionConfig {
  fn default() -> Self {
    Self {
      host: default_host(),
      port: default_redis_port(),
      password: None,
      database: 0,
      tls_enabled: false,
    }
  }
}

impl RedisConnectionConfig {
  /// Generate Redis connection URL
  pub fn connection_url(&self) -> String {
    let scheme = if self.tls_enabled { "rediss" } else { "redis" };
    let auth = match &self.password {
      Some(pwd) if !pwd.is_empty() => format!(":{}@", pwd),
      _ => String::new(),
    };
    format!(
      "{}://{}{}:{}/{}",
      scheme, auth, self.host, self.port, self.database
    )
  }
}

/// Cache section of the server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
  #[serde(default)]
  pub mode: CacheMode,

  /// Used when `mode` is `redis`
  #[serde(default)]
  pub redis: RedisConnectionConfig,

  /// How often the builtin store sweeps expired keys, in seconds
  #[serde(default = "default_expiry_interval")]
  pub expiry_interval_secs: u64,
}

fn default_expiry_interval() -> u64 {
  1
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      mode: CacheMode::default(),
      redis: RedisConnectionConfig::default(),
      expiry_interval_secs: default_expiry_interval(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_connection_url() {
    let mut cfg = RedisConnectionConfig::default();
    assert_eq!(cfg.connection_url(), "redis://127.0.0.1:6379/0");

    cfg.password = Some("secret".into());
    cfg.tls_enabled = true;
    cfg.database = 2;
    assert_eq!(cfg.connection_url(), "rediss://:secret@127.0.0.1:6379/2");
  }

  #[test]
  fn test_parse_cache_mode() {
    assert_eq!("redis".parse::<CacheMode>().unwrap(), CacheMode::Redis);
    assert_eq!("Memory".parse::<CacheMode>().unwrap(), CacheMode::Builtin);
    assert!("memcached".parse::<CacheMode>().is_err());
  }
}
