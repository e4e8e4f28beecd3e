use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use tokio_rusqlite::Connection;

use super::backend::{DurableStore, SqlDialect, TableSpec};
use super::sanitize::validate_limit;
use crate::leaderboard::DurableRecord;

const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA temp_store = MEMORY;
"#;

pub struct SqliteBackend {
  conn: Connection,
  table: TableSpec,
}

impl SqliteBackend {
  pub async fn new(path: &str, table: TableSpec) -> Result<Self, anyhow::Error> {
    let conn = if path == ":memory:" {
      Connection::open_in_memory().await?
    } else {
      Connection::open(path).await?
    };

    // Apply performance pragmas
    conn
      .call(|conn| conn.execute_batch(PRAGMAS).map_err(|e| e.into()))
      .await?;

    Ok(Self { conn, table })
  }

  pub async fn in_memory() -> Result<Self, anyhow::Error> {
    Self::new(":memory:", TableSpec::default()).await
  }

  fn schema(&self) -> String {
    let t = self.table.table();
    format!(
      "CREATE TABLE IF NOT EXISTS {t} (
    {pk} TEXT PRIMARY KEY,
    company TEXT NOT NULL,
    country TEXT NOT NULL,
    rank INTEGER NOT NULL,
    marketcap REAL NOT NULL,
    lastmodified TEXT NOT NULL
) WITHOUT ROWID;
CREATE INDEX IF NOT EXISTS idx_{t}_marketcap ON {t}(marketcap);",
      pk = self.table.primary_key()
    )
  }
}

#[async_trait]
impl DurableStore for SqliteBackend {
  fn dialect(&self) -> SqlDialect {
    SqlDialect::Sqlite
  }

  fn table(&self) -> &TableSpec {
    &self.table
  }

  async fn init_schema(&self) -> Result<(), anyhow::Error> {
    let schema = self.schema();
    self
      .conn
      .call(move |conn| conn.execute_batch(&schema).map_err(|e| e.into()))
      .await?;
    tracing::info!("SQLite schema initialized for table {}", self.table.table());
    Ok(())
  }

  async fn merge_upsert(&self, record: &DurableRecord) -> Result<(), anyhow::Error> {
    let sql = self.table.merge_statement(SqlDialect::Sqlite);
    let record = record.clone();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          &sql,
          params![
            record.symbol,
            record.company,
            record.country,
            record.rank,
            record.market_cap,
            record.last_modified.to_rfc3339(),
          ],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await
      .map_err(|e| anyhow::anyhow!("{}", e))
  }

  async fn get_by_symbol(&self, symbol: &str) -> Result<Option<DurableRecord>, anyhow::Error> {
    let sql = self.table.select_by_key_statement(SqlDialect::Sqlite);
    let symbol = symbol.to_string();

    self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(&sql)?;
        let mut rows = stmt.query(params![symbol])?;
        if let Some(row) = rows.next()? {
          Ok(Some(row_to_record(row)?))
        } else {
          Ok(None)
        }
      })
      .await
      .map_err(|e| anyhow::anyhow!("{}", e))
  }

  async fn get_range(
    &self,
    offset: usize,
    limit: usize,
    descending: bool,
  ) -> Result<Vec<DurableRecord>, anyhow::Error> {
    validate_limit(limit)?;
    let sql = self.table.select_range_statement(SqlDialect::Sqlite, descending);

    self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], row_to_record)?;
        let mut records = Vec::new();
        for row in rows {
          records.push(row?);
        }
        Ok(records)
      })
      .await
      .map_err(|e| anyhow::anyhow!("{}", e))
  }

  async fn count(&self) -> Result<usize, anyhow::Error> {
    let sql = format!("SELECT COUNT(*) FROM {}", self.table.table());
    let count: i64 = self
      .conn
      .call(move |conn| {
        conn
          .query_row(&sql, [], |row| row.get(0))
          .map_err(|e| e.into())
      })
      .await?;
    Ok(count as usize)
  }
}

fn row_to_record(row: &rusqlite::Row) -> Result<DurableRecord, rusqlite::Error> {
  let modified_str: String = row.get(5)?;
  let last_modified = DateTime::parse_from_rfc3339(&modified_str)
    .map(|d| d.with_timezone(&Utc))
    .map_err(|e| {
      rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;
  Ok(DurableRecord {
    symbol: row.get(0)?,
    company: row.get(1)?,
    country: row.get(2)?,
    rank: row.get(3)?,
    market_cap: row.get(4)?,
    last_modified,
  })
}
