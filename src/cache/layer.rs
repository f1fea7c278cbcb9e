//! Cache layer that orchestrates caching strategies around network fetching.

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::sync::RwLock;
use tracing::{debug, info, warn};

use super::storage::CacheStorage;
use super::traits::{CacheNamespaces, CachedResponse, NamespaceInfo};
use crate::error::GatewayError;
use crate::http::GatewayResponse;

const ACTIVE_VERSION_KEY: &str = "active_version";

/// Cache layer that manages the versioned namespaces and the fetch strategies.
///
/// Lookups only consult the namespaces of the active version.
pub struct CacheLayer<S: CacheStorage> {
  storage: S,
  active: RwLock<CacheNamespaces>,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a cache layer. The version persisted by the last `activate` wins
  /// over `namespaces`' own version.
  pub fn new(storage: S, namespaces: CacheNamespaces) -> Result<Self> {
    let active = match storage.get_meta(ACTIVE_VERSION_KEY)? {
      Some(version) => namespaces.with_version(&version),
      None => namespaces,
    };

    Ok(Self {
      storage,
      active: RwLock::new(active),
    })
  }

  /// Namespaces of the active version.
  pub fn active(&self) -> Result<CacheNamespaces> {
    self
      .active
      .read()
      .map(|ns| ns.clone())
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  pub fn namespaces(&self) -> Result<Vec<NamespaceInfo>> {
    self.storage.namespaces()
  }

  /// Look `key` up in the static namespace, then the dynamic one.
  pub fn lookup(&self, key: &str) -> Result<Option<CachedResponse>> {
    let active = self.active()?;
    if let Some(hit) = self.storage.get(&active.static_name(), key)? {
      return Ok(Some(hit));
    }
    self.storage.get(&active.dynamic_name(), key)
  }

  /// Upsert into the active dynamic namespace.
  pub fn store_dynamic(&self, key: &str, entry: &CachedResponse) -> Result<()> {
    let active = self.active()?;
    self.storage.put(&active.dynamic_name(), key, entry)
  }

  /// Write a full batch into a static namespace in one transaction.
  pub fn store_static(&self, namespace: &str, entries: &[(String, CachedResponse)]) -> Result<()> {
    self.storage.put_all(namespace, entries)
  }

  /// Delete every namespace not owned by `version` and make it the active one.
  ///
  /// Returns the deleted namespace names.
  pub fn activate(&self, version: &str) -> Result<Vec<String>> {
    let next = self.active()?.with_version(version);

    let mut deleted = Vec::new();
    for ns in self.storage.namespaces()? {
      if !next.owns(&ns.name) {
        info!("Deleting old cache: {}", ns.name);
        self.storage.delete_namespace(&ns.name)?;
        deleted.push(ns.name);
      }
    }

    self.storage.open_namespace(&next.static_name())?;
    self.storage.open_namespace(&next.dynamic_name())?;
    self.storage.set_meta(ACTIVE_VERSION_KEY, version)?;

    *self
      .active
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))? = next;

    Ok(deleted)
  }

  /// Lookup that never fails: storage errors are logged and treated as a miss.
  fn lookup_or_miss(&self, key: &str, url: &str) -> Result<GatewayResponse, GatewayError> {
    match self.lookup(key) {
      Ok(Some(cached)) => Ok(cached.into_response()),
      Ok(None) => Err(GatewayError::CacheMiss(url.to_string())),
      Err(e) => {
        warn!("Cache lookup for {} failed: {}", url, e);
        Err(GatewayError::CacheMiss(url.to_string()))
      }
    }
  }

  /// Store an ok response in the dynamic namespace; failures are logged only.
  fn remember(&self, key: &str, entry: CachedResponse) {
    if let Err(e) = self.store_dynamic(key, &entry) {
      warn!("Failed to cache {}: {}", entry.url, e);
    }
  }

  /// Network-first strategy.
  ///
  /// 1. Fetch from network; store ok responses when `cacheable`
  /// 2. On network failure, serve the cached copy
  /// 3. On a miss, return `CacheMiss` for the caller to synthesize a response
  pub async fn network_first<F, Fut>(
    &self,
    key: &str,
    method: &str,
    url: &str,
    cacheable: bool,
    fetcher: F,
  ) -> Result<GatewayResponse, GatewayError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<GatewayResponse, GatewayError>>,
  {
    match fetcher().await {
      Ok(response) => {
        if cacheable && response.is_ok() {
          self.remember(key, CachedResponse::capture(method, url, &response));
        }
        Ok(response)
      }
      Err(e) if e.is_network() => {
        debug!("Network failed for {}, checking cache: {}", url, e);
        self.lookup_or_miss(key, url)
      }
      Err(e) => Err(e),
    }
  }

  /// Cache-first strategy.
  ///
  /// 1. Serve a cached copy if there is one
  /// 2. Otherwise fetch from network, storing ok responses when `cacheable`
  /// 3. Network failures propagate to the caller
  pub async fn cache_first<F, Fut>(
    &self,
    key: &str,
    method: &str,
    url: &str,
    cacheable: bool,
    fetcher: F,
  ) -> Result<GatewayResponse, GatewayError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<GatewayResponse, GatewayError>>,
  {
    if let Ok(cached) = self.lookup_or_miss(key, url) {
      return Ok(cached);
    }

    let response = fetcher().await?;
    if cacheable && response.is_ok() {
      self.remember(key, CachedResponse::capture(method, url, &response));
    }
    Ok(response)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;
  use crate::db::Database;
  use crate::http::{GatewayResponse, ResponseSource};
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;

  fn layer() -> CacheLayer<SqliteStorage> {
    let db = Arc::new(Database::open_in_memory().unwrap());
    CacheLayer::new(SqliteStorage::new(db), CacheNamespaces::new("test", "v1")).unwrap()
  }

  fn ok(body: &str) -> Result<GatewayResponse, GatewayError> {
    Ok(GatewayResponse::synthesized(200, "text/plain", body, ResponseSource::Network))
  }

  fn down() -> Result<GatewayResponse, GatewayError> {
    Err(GatewayError::NetworkUnavailable("down".to_string()))
  }

  const URL: &str = "http://localhost/page";

  #[tokio::test]
  async fn test_network_first_caches_then_falls_back() {
    let layer = layer();

    let resp = layer
      .network_first("k", "GET", URL, true, || async { ok("fresh") })
      .await
      .unwrap();
    assert_eq!(resp.source, ResponseSource::Network);

    let resp = layer
      .network_first("k", "GET", URL, true, || async { down() })
      .await
      .unwrap();
    assert_eq!(resp.source, ResponseSource::Cache);
    assert_eq!(resp.text(), "fresh");
  }

  #[tokio::test]
  async fn test_network_first_does_not_cache_errors() {
    let layer = layer();

    let resp = layer
      .network_first("k", "GET", URL, true, || async {
        Ok(GatewayResponse::synthesized(500, "text/plain", "oops", ResponseSource::Network))
      })
      .await
      .unwrap();
    assert_eq!(resp.status, 500);
    assert!(layer.lookup("k").unwrap().is_none());

    let err = layer
      .network_first("k", "GET", URL, true, || async { down() })
      .await
      .unwrap_err();
    assert!(matches!(err, GatewayError::CacheMiss(_)));
  }

  #[tokio::test]
  async fn test_network_first_respects_cacheable_flag() {
    let layer = layer();
    layer
      .network_first("k", "GET", URL, false, || async { ok("x") })
      .await
      .unwrap();
    assert!(layer.lookup("k").unwrap().is_none());
  }

  #[tokio::test]
  async fn test_cache_first_skips_network_on_hit() {
    let layer = layer();
    let calls = AtomicU32::new(0);

    for _ in 0..2 {
      let resp = layer
        .cache_first("k", "GET", URL, true, || async {
          calls.fetch_add(1, Ordering::SeqCst);
          ok("asset")
        })
        .await
        .unwrap();
      assert_eq!(resp.text(), "asset");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_cache_first_propagates_network_failure() {
    let layer = layer();
    let err = layer
      .cache_first("k", "GET", URL, true, || async { down() })
      .await
      .unwrap_err();
    assert!(err.is_network());
  }

  #[tokio::test]
  async fn test_activate_drops_other_versions() {
    let layer = layer();
    layer
      .network_first("k", "GET", URL, true, || async { ok("v1 page") })
      .await
      .unwrap();

    let deleted = layer.activate("v2").unwrap();
    assert_eq!(deleted, vec!["test-dynamic-v1".to_string()]);
    assert_eq!(layer.active().unwrap().version(), "v2");
    assert!(layer.lookup("k").unwrap().is_none());

    let names: Vec<String> = layer.namespaces().unwrap().into_iter().map(|n| n.name).collect();
    assert_eq!(names, vec!["test-dynamic-v2", "test-static-v2"]);
  }

  #[test]
  fn test_persisted_version_wins() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let first = CacheLayer::new(
      SqliteStorage::new(Arc::clone(&db)),
      CacheNamespaces::new("test", "v1"),
    )
    .unwrap();
    first.activate("v3").unwrap();

    let second =
      CacheLayer::new(SqliteStorage::new(db), CacheNamespaces::new("test", "v1")).unwrap();
    assert_eq!(second.active().unwrap().version(), "v3");
  }
}
