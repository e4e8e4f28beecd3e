//! Periodic drain of change logs into the durable store.

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::keys::primary_key_from_stream;
use super::types::DurableRecord;
use super::write_behind::WriteBehindQueue;
use crate::cache::StreamEntry;
use crate::db::DurableStore;
use crate::error::SweepError;

/// Bound on ticks queued behind a running sweep
pub const TICK_QUEUE_CAPACITY: usize = 16;

/// Request for one sweep iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick;

/// Counters for one sweep iteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
  pub discovered: usize,
  pub committed: usize,
  pub failed: usize,
  pub skipped: usize,
}

/// Result of draining a single log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
  Committed,
  /// Log vanished or held no entries
  Skipped,
}

pub struct Sweeper {
  queue: WriteBehindQueue,
  store: Arc<dyn DurableStore>,
  ack_ttl: Duration,
}

impl Sweeper {
  pub fn new(queue: WriteBehindQueue, store: Arc<dyn DurableStore>, ack_ttl: Duration) -> Self {
    Self {
      queue,
      store,
      ack_ttl,
    }
  }

  /// One pass over every pending log, strictly one log at a time
  pub async fn tick(&self) -> SweepReport {
    let mut report = SweepReport::default();
    let streams = match self.queue.pending().await {
      Ok(streams) => streams,
      Err(e) => {
        tracing::warn!(
          retryable = e.is_retryable(),
          "Change log discovery failed: {}",
          e
        );
        return report;
      }
    };
    report.discovered = streams.len();

    for stream in &streams {
      match self.sweep_stream(stream).await {
        Ok(SweepOutcome::Committed) => report.committed += 1,
        Ok(SweepOutcome::Skipped) => report.skipped += 1,
        Err(e) => {
          report.failed += 1;
          tracing::error!(
            stream = %stream,
            retryable = e.is_retryable(),
            "Write-behind merge failed, will retry next tick: {}",
            e
          );
        }
      }
    }
    report
  }

  /// Merge the newest entry of `stream` and retire the log on success.
  ///
  /// Older entries are superseded by the newest snapshot and never applied.
  pub async fn sweep_stream(&self, stream: &str) -> Result<SweepOutcome, SweepError> {
    let entry = match self.queue.latest(stream).await? {
      Some(entry) => entry,
      None => {
        tracing::warn!("Change log {} has no entries", stream);
        return Ok(SweepOutcome::Skipped);
      }
    };

    let record = parse_record(stream, &entry)?;
    self
      .store
      .merge_upsert(&record)
      .await
      .map_err(SweepError::Durable)?;
    self.queue.mark_consumed(stream, self.ack_ttl).await?;

    tracing::debug!(
      "Merged {} from {} (entry {})",
      record.symbol,
      stream,
      entry.id
    );
    Ok(SweepOutcome::Committed)
  }

  /// Run one sweep per received tick until every sender is gone
  pub async fn run(&self, mut ticks: mpsc::Receiver<Tick>) {
    tracing::info!("Sweeper started");
    while ticks.recv().await.is_some() {
      let report = self.tick().await;
      if report.discovered > 0 {
        tracing::debug!(
          "Sweep: {} logs, {} committed, {} failed, {} skipped",
          report.discovered,
          report.committed,
          report.failed,
          report.skipped
        );
      }
    }
    tracing::info!("Sweeper stopped");
  }
}

/// Send a [`Tick`] every `interval` until shutdown.
///
/// A slow sweep holds ticks in the bounded channel rather than starting a
/// second sweep.
pub fn spawn_ticker(
  interval: Duration,
  ticks: mpsc::Sender<Tick>,
  mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
      tokio::select! {
        _ = ticker.tick() => {
          if ticks.send(Tick).await.is_err() {
            break;
          }
        }
        _ = shutdown.recv() => break,
      }
    }
  })
}

/// Decode a change log entry into the row it describes.
///
/// The primary key comes from the log name and the modification time from
/// the entry id, so replaying an entry always yields the same row.
pub fn parse_record(stream: &str, entry: &StreamEntry) -> Result<DurableRecord, SweepError> {
  let symbol = primary_key_from_stream(stream)
    .filter(|s| !s.is_empty())
    .ok_or_else(|| malformed(stream, "log name carries no primary key".to_string()))?;

  let company = require(stream, entry, "company")?.to_string();
  let country = require(stream, entry, "country")?.to_string();
  let market_cap = require(stream, entry, "marketcap")?
    .parse::<f64>()
    .map_err(|e| malformed(stream, format!("marketcap: {}", e)))?;
  let rank = require(stream, entry, "rank")?
    .parse::<i64>()
    .map_err(|e| malformed(stream, format!("rank: {}", e)))?;

  let ms = i64::try_from(entry.id.ms)
    .map_err(|_| malformed(stream, format!("entry id {} out of range", entry.id)))?;
  let last_modified = Utc
    .timestamp_millis_opt(ms)
    .single()
    .ok_or_else(|| malformed(stream, format!("entry id {} out of range", entry.id)))?;

  Ok(DurableRecord {
    symbol,
    company,
    country,
    rank,
    market_cap,
    last_modified,
  })
}

fn require<'a>(stream: &str, entry: &'a StreamEntry, field: &str) -> Result<&'a str, SweepError> {
  entry
    .get(field)
    .ok_or_else(|| malformed(stream, format!("missing field '{}'", field)))
}

fn malformed(stream: &str, reason: String) -> SweepError {
  SweepError::Malformed {
    stream: stream.to_string(),
    reason,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::StreamId;

  fn entry(fields: &[(&str, &str)]) -> StreamEntry {
    StreamEntry {
      id: StreamId::new(1_700_000_000_000, 0),
      fields: fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect(),
    }
  }

  #[test]
  fn test_parse_record() {
    let e = entry(&[
      ("company", "Apple"),
      ("country", "USA"),
      ("marketcap", "105"),
      ("rank", "2"),
    ]);
    let record = parse_record("_company-stream-company:aapl", &e).unwrap();
    assert_eq!(record.symbol, "aapl");
    assert_eq!(record.company, "Apple");
    assert_eq!(record.rank, 2);
    assert_eq!(record.market_cap, 105.0);
    assert_eq!(record.last_modified.timestamp_millis(), 1_700_000_000_000);
  }

  #[test]
  fn test_parse_record_missing_field() {
    let e = entry(&[("company", "Apple"), ("country", "USA"), ("rank", "2")]);
    let err = parse_record("_company-stream-company:aapl", &e).unwrap_err();
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("marketcap"));
  }

  #[test]
  fn test_parse_record_bad_number() {
    let e = entry(&[
      ("company", "Apple"),
      ("country", "USA"),
      ("marketcap", "lots"),
      ("rank", "2"),
    ]);
    assert!(matches!(
      parse_record("_company-stream-company:aapl", &e),
      Err(SweepError::Malformed { .. })
    ));
  }
}
