use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::sanitize::{validate_identifier, SqlSanitizeError};
use crate::leaderboard::DurableRecord;

/// SQL dialect for statement generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
  Postgres,
  Sqlite,
}

impl SqlDialect {
  /// Positional parameter marker (1-based)
  pub fn placeholder(&self, n: usize) -> String {
    match self {
      Self::Postgres => format!("${}", n),
      Self::Sqlite => format!("?{}", n),
    }
  }
}

/// Non-key columns of the leaderboard table, in statement order
pub const DATA_COLUMNS: [&str; 5] = ["company", "country", "rank", "marketcap", "lastmodified"];

/// Durable table layout: table name plus primary key column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
  table: String,
  primary_key: String,
}

impl TableSpec {
  /// Validated table definition
  pub fn new(table: &str, primary_key: &str) -> Result<Self, SqlSanitizeError> {
    validate_identifier(table)?;
    validate_identifier(primary_key)?;
    Ok(Self {
      table: table.to_string(),
      primary_key: primary_key.to_string(),
    })
  }

  pub fn table(&self) -> &str {
    &self.table
  }

  pub fn primary_key(&self) -> &str {
    &self.primary_key
  }

  /// Single-statement merge: insert the row, or overwrite every non-key column
  /// when the primary key already exists.
  pub fn merge_statement(&self, dialect: SqlDialect) -> String {
    let columns = std::iter::once(self.primary_key.as_str())
      .chain(DATA_COLUMNS)
      .collect::<Vec<_>>();
    let placeholders = (1..=columns.len())
      .map(|n| dialect.placeholder(n))
      .collect::<Vec<_>>();
    let updates = DATA_COLUMNS
      .iter()
      .map(|c| format!("{c} = excluded.{c}"))
      .collect::<Vec<_>>();

    format!(
      "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {}",
      self.table,
      columns.join(", "),
      placeholders.join(", "),
      self.primary_key,
      updates.join(", ")
    )
  }

  pub fn select_columns(&self) -> String {
    format!("{}, {}", self.primary_key, DATA_COLUMNS.join(", "))
  }

  pub fn select_by_key_statement(&self, dialect: SqlDialect) -> String {
    format!(
      "SELECT {} FROM {} WHERE {} = {}",
      self.select_columns(),
      self.table,
      self.primary_key,
      dialect.placeholder(1)
    )
  }

  /// Rows ordered by score, paged by LIMIT/OFFSET
  pub fn select_range_statement(&self, dialect: SqlDialect, descending: bool) -> String {
    format!(
      "SELECT {} FROM {} ORDER BY marketcap {}, {} ASC LIMIT {} OFFSET {}",
      self.select_columns(),
      self.table,
      if descending { "DESC" } else { "ASC" },
      self.primary_key,
      dialect.placeholder(1),
      dialect.placeholder(2)
    )
  }
}

impl Default for TableSpec {
  fn default() -> Self {
    Self {
      table: "company".to_string(),
      primary_key: "symbol".to_string(),
    }
  }
}

/// Authoritative relational store behind the cache
#[async_trait]
pub trait DurableStore: Send + Sync {
  fn dialect(&self) -> SqlDialect;
  fn table(&self) -> &TableSpec;

  async fn init_schema(&self) -> Result<(), anyhow::Error>;

  /// Insert-or-update one row inside a transaction. Applying the same record
  /// twice leaves identical column values.
  async fn merge_upsert(&self, record: &DurableRecord) -> Result<(), anyhow::Error>;

  async fn get_by_symbol(&self, symbol: &str) -> Result<Option<DurableRecord>, anyhow::Error>;

  /// Ordered slice by market cap: `limit` rows after skipping `offset`
  async fn get_range(
    &self,
    offset: usize,
    limit: usize,
    descending: bool,
  ) -> Result<Vec<DurableRecord>, anyhow::Error>;

  async fn count(&self) -> Result<usize, anyhow::Error>;
}
