use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::{NoTls, Row};

use super::backend::{DurableStore, SqlDialect, TableSpec};
use super::sanitize::validate_limit;
use crate::leaderboard::DurableRecord;

pub struct PostgresBackend {
  pool: Pool,
  table: TableSpec,
}

impl PostgresBackend {
  pub fn new(url: &str, max_connections: usize, table: TableSpec) -> Result<Self, anyhow::Error> {
    let mut cfg = Config::new();
    cfg.url = Some(url.into());
    cfg.manager = Some(ManagerConfig {
      recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(max_connections.max(1)));
    let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
    Ok(Self { pool, table })
  }

  fn schema(&self) -> String {
    let t = self.table.table();
    format!(
      "CREATE TABLE IF NOT EXISTS {t} (
    {pk} VARCHAR(64) PRIMARY KEY,
    company TEXT NOT NULL,
    country TEXT NOT NULL,
    rank BIGINT NOT NULL,
    marketcap DOUBLE PRECISION NOT NULL,
    lastmodified TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_{t}_marketcap ON {t}(marketcap);",
      pk = self.table.primary_key()
    )
  }
}

fn row_to_record(r: &Row) -> DurableRecord {
  DurableRecord {
    symbol: r.get(0),
    company: r.get(1),
    country: r.get(2),
    rank: r.get(3),
    market_cap: r.get(4),
    last_modified: r.get(5),
  }
}

#[async_trait]
impl DurableStore for PostgresBackend {
  fn dialect(&self) -> SqlDialect {
    SqlDialect::Postgres
  }

  fn table(&self) -> &TableSpec {
    &self.table
  }

  async fn init_schema(&self) -> Result<(), anyhow::Error> {
    self.pool.get().await?.batch_execute(&self.schema()).await?;
    tracing::info!("PostgreSQL schema initialized for table {}", self.table.table());
    Ok(())
  }

  async fn merge_upsert(&self, record: &DurableRecord) -> Result<(), anyhow::Error> {
    let sql = self.table.merge_statement(SqlDialect::Postgres);
    let mut client = self.pool.get().await?;
    // Dropping the transaction without commit rolls it back
    let tx = client.transaction().await?;
    tx.execute(
      &sql,
      &[
        &record.symbol,
        &record.company,
        &record.country,
        &record.rank,
        &record.market_cap,
        &record.last_modified,
      ],
    )
    .await?;
    tx.commit().await?;
    Ok(())
  }

  async fn get_by_symbol(&self, symbol: &str) -> Result<Option<DurableRecord>, anyhow::Error> {
    let sql = self.table.select_by_key_statement(SqlDialect::Postgres);
    let row = self.pool.get().await?.query_opt(&sql, &[&symbol]).await?;
    Ok(row.as_ref().map(row_to_record))
  }

  async fn get_range(
    &self,
    offset: usize,
    limit: usize,
    descending: bool,
  ) -> Result<Vec<DurableRecord>, anyhow::Error> {
    validate_limit(limit)?;
    let sql = self
      .table
      .select_range_statement(SqlDialect::Postgres, descending);
    let rows = self
      .pool
      .get()
      .await?
      .query(&sql, &[&(limit as i64), &(offset as i64)])
      .await?;
    Ok(rows.iter().map(row_to_record).collect())
  }

  async fn count(&self) -> Result<usize, anyhow::Error> {
    let sql = format!("SELECT COUNT(*) FROM {}", self.table.table());
    let row = self.pool.get().await?.query_one(&sql, &[]).await?;
    let count: i64 = row.get(0);
    Ok(count as usize)
  }
}
