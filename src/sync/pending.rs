//! Durable log of mutations waiting for replay.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use rusqlite::params;
use std::sync::Arc;
use url::Url;

use crate::db::Database;
use crate::error::GatewayError;
use crate::http::{GatewayRequest, Headers};

/// A mutation that failed while offline.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
  pub id: i64,
  pub url: String,
  pub method: String,
  pub headers: Headers,
  pub body: Vec<u8>,
  pub created_at: DateTime<Utc>,
  /// Replays that reached the origin but were rejected
  pub attempts: u32,
}

impl PendingRequest {
  /// Rebuild the original request for replay.
  pub fn to_request(&self) -> Result<GatewayRequest, GatewayError> {
    let url = Url::parse(&self.url).map_err(|e| GatewayError::ReplayFailure {
      id: self.id,
      reason: format!("invalid url '{}': {}", self.url, e),
    })?;
    let method = Method::from_bytes(self.method.as_bytes()).map_err(|e| {
      GatewayError::ReplayFailure {
        id: self.id,
        reason: format!("invalid method '{}': {}", self.method, e),
      }
    })?;

    Ok(GatewayRequest {
      headers: self.headers.clone(),
      body: self.body.clone(),
      ..GatewayRequest::new(method, url)
    })
  }
}

/// Trait for pending-request stores.
pub trait PendingLog: Send + Sync {
  /// Persist a request; returns its id.
  fn push(&self, request: &GatewayRequest) -> Result<i64>;

  /// Every pending request in creation order.
  fn list(&self) -> Result<Vec<PendingRequest>>;

  /// Remove a request. Returns false if it was already gone.
  fn remove(&self, id: i64) -> Result<bool>;

  /// Bump the attempt counter; returns the new count.
  fn record_attempt(&self, id: i64) -> Result<u32>;

  fn len(&self) -> Result<usize>;
}

/// SQLite-backed pending log.
pub struct SqlitePendingLog {
  db: Arc<Database>,
}

impl SqlitePendingLog {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

impl PendingLog for SqlitePendingLog {
  fn push(&self, request: &GatewayRequest) -> Result<i64> {
    let conn = self.db.conn()?;
    let headers = serde_json::to_string(&request.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    conn
      .execute(
        "INSERT INTO pending_requests (url, method, headers, body, created_at)
         VALUES (?, ?, ?, ?, ?)",
        params![
          request.url.as_str(),
          request.method.as_str(),
          headers,
          request.body,
          Utc::now().timestamp_millis()
        ],
      )
      .map_err(|e| eyre!("Failed to store pending request: {}", e))?;

    Ok(conn.last_insert_rowid())
  }

  fn list(&self) -> Result<Vec<PendingRequest>> {
    let conn = self.db.conn()?;

    let mut stmt = conn
      .prepare(
        "SELECT id, url, method, headers, body, created_at, attempts FROM pending_requests
         ORDER BY created_at, id",
      )
      .map_err(|e| eyre!("Failed to prepare pending query: {}", e))?;

    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, i64>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
          row.get::<_, String>(3)?,
          row.get::<_, Vec<u8>>(4)?,
          row.get::<_, i64>(5)?,
          row.get::<_, u32>(6)?,
        ))
      })
      .map_err(|e| eyre!("Failed to query pending requests: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read pending request: {}", e))?;

    rows
      .into_iter()
      .map(|(id, url, method, headers, body, created_at, attempts)| {
        let headers = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers of request {}: {}", id, e))?;
        let created_at = DateTime::from_timestamp_millis(created_at)
          .ok_or_else(|| eyre!("Invalid timestamp {} on request {}", created_at, id))?;
        Ok(PendingRequest {
          id,
          url,
          method,
          headers,
          body,
          created_at,
          attempts,
        })
      })
      .collect()
  }

  fn remove(&self, id: i64) -> Result<bool> {
    let conn = self.db.conn()?;
    let removed = conn
      .execute("DELETE FROM pending_requests WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove pending request {}: {}", id, e))?;
    Ok(removed > 0)
  }

  fn record_attempt(&self, id: i64) -> Result<u32> {
    let conn = self.db.conn()?;
    conn
      .query_row(
        "UPDATE pending_requests SET attempts = attempts + 1 WHERE id = ? RETURNING attempts",
        params![id],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to record attempt on request {}: {}", id, e))
  }

  fn len(&self) -> Result<usize> {
    let conn = self.db.conn()?;
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM pending_requests", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count pending requests: {}", e))?;
    Ok(count as usize)
  }
}
