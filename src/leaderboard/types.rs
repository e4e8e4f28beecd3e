use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One leaderboard row as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
  pub symbol: String,
  pub company: String,
  pub country: String,
  /// Signed: the ascending range numbering can run below zero
  pub rank: i64,
  pub market_cap: f64,
}

/// Descriptive attributes cached in the metadata hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyMeta {
  pub company: String,
  pub country: String,
}

impl CompanyMeta {
  pub fn new(company: impl Into<String>, country: impl Into<String>) -> Self {
    Self {
      company: company.into(),
      country: country.into(),
    }
  }

  /// Hash fields in the layout stored in the cache
  pub fn to_fields(&self) -> Vec<(String, String)> {
    vec![
      ("company".to_string(), self.company.clone()),
      ("country".to_string(), self.country.clone()),
    ]
  }
}

/// Authoritative row in durable storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurableRecord {
  pub symbol: String,
  pub company: String,
  pub country: String,
  pub rank: i64,
  pub market_cap: f64,
  pub last_modified: DateTime<Utc>,
}

impl DurableRecord {
  pub fn meta(&self) -> CompanyMeta {
    CompanyMeta::new(self.company.clone(), self.country.clone())
  }

  pub fn to_entry(&self) -> Entry {
    Entry {
      symbol: self.symbol.clone(),
      company: self.company.clone(),
      country: self.country.clone(),
      rank: self.rank,
      market_cap: self.market_cap,
    }
  }
}
