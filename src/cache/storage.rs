//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;

use super::traits::{CachedResponse, NamespaceInfo};
use crate::db::Database;

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Create the namespace if it does not exist yet.
  fn open_namespace(&self, name: &str) -> Result<()>;

  /// All namespaces with their entry counts, ordered by name.
  fn namespaces(&self) -> Result<Vec<NamespaceInfo>>;

  /// Delete a namespace and every entry in it. Returns false if it did not exist.
  fn delete_namespace(&self, name: &str) -> Result<bool>;

  /// Look up one entry.
  fn get(&self, namespace: &str, key: &str) -> Result<Option<CachedResponse>>;

  /// Upsert one entry, opening the namespace if needed.
  fn put(&self, namespace: &str, key: &str, entry: &CachedResponse) -> Result<()>;

  /// Upsert a batch of entries atomically.
  fn put_all(&self, namespace: &str, entries: &[(String, CachedResponse)]) -> Result<()>;

  fn get_meta(&self, key: &str) -> Result<Option<String>>;

  fn set_meta(&self, key: &str, value: &str) -> Result<()>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  db: Arc<Database>,
}

impl SqliteStorage {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

impl CacheStorage for SqliteStorage {
  fn open_namespace(&self, name: &str) -> Result<()> {
    let conn = self.db.conn()?;
    open_namespace(&conn, name)
  }

  fn namespaces(&self) -> Result<Vec<NamespaceInfo>> {
    let conn = self.db.conn()?;

    let mut stmt = conn
      .prepare(
        "SELECT n.name, COUNT(e.cache_key) FROM cache_namespaces n
         LEFT JOIN cache_entries e ON e.namespace = n.name
         GROUP BY n.name
         ORDER BY n.name",
      )
      .map_err(|e| eyre!("Failed to prepare namespace query: {}", e))?;

    let namespaces = stmt
      .query_map([], |row| {
        Ok(NamespaceInfo {
          name: row.get(0)?,
          entries: row.get::<_, i64>(1)? as usize,
        })
      })
      .map_err(|e| eyre!("Failed to query namespaces: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read namespace row: {}", e))?;

    Ok(namespaces)
  }

  fn delete_namespace(&self, name: &str) -> Result<bool> {
    let conn = self.db.conn()?;

    // Entries go first so the delete does not rely on foreign key enforcement
    conn
      .execute("DELETE FROM cache_entries WHERE namespace = ?", params![name])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", name, e))?;

    let removed = conn
      .execute("DELETE FROM cache_namespaces WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete namespace {}: {}", name, e))?;

    Ok(removed > 0)
  }

  fn get(&self, namespace: &str, key: &str) -> Result<Option<CachedResponse>> {
    let conn = self.db.conn()?;

    let row: Option<(String, String, u16, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT method, url, status, headers, body, cached_at FROM cache_entries
         WHERE namespace = ? AND cache_key = ?",
        params![namespace, key],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
          ))
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to query cache entry: {}", e))?;

    match row {
      Some((method, url, status, headers, body, cached_at)) => {
        let headers = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers for {}: {}", url, e))?;
        Ok(Some(CachedResponse {
          method,
          url,
          status,
          headers,
          body,
          cached_at: parse_datetime(&cached_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, namespace: &str, key: &str, entry: &CachedResponse) -> Result<()> {
    let conn = self.db.conn()?;
    open_namespace(&conn, namespace)?;
    insert_entry(&conn, namespace, key, entry)
  }

  fn put_all(&self, namespace: &str, entries: &[(String, CachedResponse)]) -> Result<()> {
    let mut conn = self.db.conn()?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    open_namespace(&tx, namespace)?;
    for (key, entry) in entries {
      insert_entry(&tx, namespace, key, entry)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn get_meta(&self, key: &str) -> Result<Option<String>> {
    let conn = self.db.conn()?;

    conn
      .query_row(
        "SELECT value FROM gateway_meta WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read metadata {}: {}", key, e))
  }

  fn set_meta(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.db.conn()?;

    conn
      .execute(
        "INSERT OR REPLACE INTO gateway_meta (key, value) VALUES (?, ?)",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write metadata {}: {}", key, e))?;

    Ok(())
  }
}

fn open_namespace(conn: &Connection, name: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO cache_namespaces (name) VALUES (?)",
      params![name],
    )
    .map_err(|e| eyre!("Failed to open namespace {}: {}", name, e))?;
  Ok(())
}

fn insert_entry(conn: &Connection, namespace: &str, key: &str, entry: &CachedResponse) -> Result<()> {
  let headers = serde_json::to_string(&entry.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries (namespace, cache_key, method, url, status, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
      params![
        namespace,
        key,
        entry.method,
        entry.url,
        entry.status,
        headers,
        entry.body,
        format_datetime(&entry.cached_at)
      ],
    )
    .map_err(|e| eyre!("Failed to store cache entry {}: {}", entry.url, e))?;

  Ok(())
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
  dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
