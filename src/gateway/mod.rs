//! Offline cache and sync gateway.
//!
//! Every request from the client application goes through [`Gateway::handle`],
//! which picks a strategy from the request's category:
//! - navigations, API calls and everything else go network-first
//! - static assets go cache-first
//! - mutations go to the network and are queued for replay when it is down
//!
//! [`Gateway::reconcile`] replays queued mutations in creation order.

mod classify;
mod key;
pub mod offline;

use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::{CacheLayer, CacheNamespaces, CacheStorage, CachedResponse, NamespaceInfo, SqliteStorage};
use crate::config::Config;
use crate::db::Database;
use crate::error::GatewayError;
use crate::http::{GatewayRequest, GatewayResponse, Transport};
use crate::sync::{PendingLog, PendingRequest, SqlitePendingLog};

pub use classify::{Classifier, RequestKind, Strategy};
pub use key::cache_key;

/// Constructor-injected gateway settings.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
  pub origin: Url,
  pub prefix: String,
  /// Version that `install` populates
  pub version: String,
  pub static_assets: Vec<String>,
  pub static_prefixes: Vec<String>,
  pub api_prefix: String,
  pub api_cache: Vec<String>,
  pub offline_page: String,
  pub max_attempts: Option<u32>,
}

impl GatewayOptions {
  pub fn from_config(config: &Config) -> Self {
    Self {
      origin: config.origin.clone(),
      prefix: config.cache.prefix.clone(),
      version: config.cache.version.clone(),
      static_assets: config.cache.static_assets.clone(),
      static_prefixes: config.cache.static_prefixes.clone(),
      api_prefix: config.cache.api_prefix.clone(),
      api_cache: config.cache.api_cache.clone(),
      offline_page: config.cache.offline_page.clone(),
      max_attempts: config.sync.max_attempts,
    }
  }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
  /// Another pass was already running; nothing was done
  pub skipped: bool,
  pub replayed: usize,
  pub failed: usize,
  /// Dropped after reaching the attempt cap
  pub dropped: usize,
  /// Replayed but still in the log because removal failed
  pub unremoved: usize,
  /// Still queued after the pass
  pub remaining: usize,
}

/// Snapshot of the gateway's durable state.
#[derive(Debug, Clone)]
pub struct GatewayStatus {
  pub active_version: String,
  pub namespaces: Vec<NamespaceInfo>,
  pub pending: usize,
}

/// The gateway as wired for production.
pub type SqliteGateway<T> = Gateway<T, SqliteStorage, SqlitePendingLog>;

pub struct Gateway<T: Transport, S: CacheStorage, L: PendingLog> {
  transport: Arc<T>,
  cache: CacheLayer<S>,
  pending: Arc<L>,
  classifier: Classifier,
  options: GatewayOptions,
  /// Held for the duration of a reconciliation pass
  reconciling: tokio::sync::Mutex<()>,
}

impl<T: Transport> SqliteGateway<T> {
  /// Open the database named by `config` and build a gateway over it.
  pub fn open(config: &Config, transport: T) -> color_eyre::Result<Self> {
    let db = Arc::new(Database::open(config.database.as_deref())?);
    let storage = SqliteStorage::new(Arc::clone(&db));
    let pending = SqlitePendingLog::new(db);
    Self::new(GatewayOptions::from_config(config), transport, storage, pending)
  }
}

impl<T: Transport, S: CacheStorage, L: PendingLog> Gateway<T, S, L> {
  pub fn new(
    options: GatewayOptions,
    transport: T,
    storage: S,
    pending: L,
  ) -> color_eyre::Result<Self> {
    let static_urls = options
      .static_assets
      .iter()
      .filter_map(|asset| options.origin.join(asset).ok());
    let classifier = Classifier::new(&options.api_prefix, &options.static_prefixes, static_urls);

    let cache = CacheLayer::new(storage, CacheNamespaces::new(&options.prefix, &options.version))?;

    Ok(Self {
      transport: Arc::new(transport),
      cache,
      pending: Arc::new(pending),
      classifier,
      options,
      reconciling: tokio::sync::Mutex::new(()),
    })
  }

  pub fn transport(&self) -> Arc<T> {
    Arc::clone(&self.transport)
  }

  /// Resolve a path or absolute URL against the origin.
  pub fn resolve(&self, target: &str) -> Result<Url, GatewayError> {
    self
      .options
      .origin
      .join(target)
      .map_err(|source| GatewayError::InvalidUrl {
        url: target.to_string(),
        source,
      })
  }

  pub fn classify(&self, request: &GatewayRequest) -> RequestKind {
    self.classifier.classify(request)
  }

  /// Serve one intercepted request.
  ///
  /// Fails when the request cannot be sent as given, or when a mutation could
  /// neither reach the network nor be stored for later replay.
  pub async fn handle(&self, mut request: GatewayRequest) -> Result<GatewayResponse, GatewayError> {
    request.url.set_fragment(None);

    if request.is_mutating() {
      return self.handle_mutation(request).await;
    }

    let kind = self.classify(&request);
    let key = cache_key(&request.method, &request.url);
    let method = request.method.as_str().to_string();
    let url = request.url.to_string();
    let cacheable = request.method == Method::GET && self.is_cacheable(kind, &request.url);

    debug!("{} {} as {:?}", method, url, kind);

    let transport = Arc::clone(&self.transport);
    let fetch = || async move { transport.send(&request).await };

    let result = match kind.strategy() {
      Strategy::CacheFirst => self.cache.cache_first(&key, &method, &url, cacheable, fetch).await,
      Strategy::NetworkFirst => self.cache.network_first(&key, &method, &url, cacheable, fetch).await,
    };

    match result {
      Ok(response) => Ok(response),
      Err(e @ GatewayError::InvalidRequest(_)) => Err(e),
      Err(e) => {
        info!("Serving offline response for {}: {}", url, e);
        Ok(self.offline_response(kind))
      }
    }
  }

  fn is_cacheable(&self, kind: RequestKind, url: &Url) -> bool {
    match kind {
      RequestKind::Api => {
        self.options.api_cache.is_empty() || self.options.api_cache.iter().any(|p| p == url.path())
      }
      _ => true,
    }
  }

  fn offline_response(&self, kind: RequestKind) -> GatewayResponse {
    match kind {
      RequestKind::Navigation => self.offline_page().unwrap_or_else(offline::navigation),
      RequestKind::Api => offline::api(),
      RequestKind::StaticAsset => offline::asset(),
      RequestKind::Other => offline::other(),
    }
  }

  /// Cached copy of the designated offline page, if any.
  fn offline_page(&self) -> Option<GatewayResponse> {
    let url = self.resolve(&self.options.offline_page).ok()?;
    match self.cache.lookup(&cache_key(&Method::GET, &url)) {
      Ok(cached) => cached.map(CachedResponse::into_response),
      Err(e) => {
        warn!("Failed to read offline page from cache: {}", e);
        None
      }
    }
  }

  async fn handle_mutation(&self, request: GatewayRequest) -> Result<GatewayResponse, GatewayError> {
    match self.transport.send(&request).await {
      Ok(response) => Ok(response),
      Err(e) if e.is_network() => {
        info!("{} {} failed, storing for background sync", request.method, request.url);
        self.enqueue_mutation(&request)
      }
      Err(e) => Err(e),
    }
  }

  /// Persist a mutation for replay and answer 202 in its place.
  pub fn enqueue_mutation(&self, request: &GatewayRequest) -> Result<GatewayResponse, GatewayError> {
    let id = self.pending.push(request).map_err(|e| {
      error!("Failed to store {} {} for sync: {}", request.method, request.url, e);
      GatewayError::storage(e)
    })?;

    debug!("Queued pending request {}", id);
    Ok(offline::queued())
  }

  /// Replay queued mutations in creation order.
  ///
  /// At most one pass runs at a time; a concurrent call returns a skipped
  /// report. A network failure ends the pass early; a rejected replay stays
  /// queued and the pass moves on.
  pub async fn reconcile(&self) -> Result<ReconcileReport, GatewayError> {
    let Ok(_guard) = self.reconciling.try_lock() else {
      debug!("Reconciliation already running");
      return Ok(ReconcileReport {
        skipped: true,
        ..ReconcileReport::default()
      });
    };

    let queue = self.pending.list().map_err(GatewayError::storage)?;
    let mut report = ReconcileReport::default();

    if !queue.is_empty() {
      info!("Syncing {} offline request(s)", queue.len());
    }

    for entry in queue {
      match self.replay(&entry).await {
        Ok(()) => {
          info!("Synced offline request: {} {}", entry.method, entry.url);
          report.replayed += 1;
          if let Err(e) = self.pending.remove(entry.id) {
            error!(
              "Replayed pending request {} but failed to remove it, it will be replayed again: {}",
              entry.id, e
            );
            report.unremoved += 1;
          }
        }
        Err(e) if e.is_network() => {
          warn!("Network unavailable during sync, stopping: {}", e);
          report.failed += 1;
          break;
        }
        Err(e) => {
          warn!("Failed to sync request: {}", e);
          report.failed += 1;
          if self.attempts_exhausted(&entry)? {
            report.dropped += 1;
          }
        }
      }
    }

    report.remaining = self.pending.len().map_err(GatewayError::storage)?;
    Ok(report)
  }

  async fn replay(&self, entry: &PendingRequest) -> Result<(), GatewayError> {
    let request = entry.to_request()?;
    let response = self.transport.send(&request).await?;

    if response.is_ok() {
      Ok(())
    } else {
      Err(GatewayError::ReplayFailure {
        id: entry.id,
        reason: format!("{} {} returned {}", entry.method, entry.url, response.status),
      })
    }
  }

  /// Count a rejected replay; drops the entry once the configured cap is hit.
  fn attempts_exhausted(&self, entry: &PendingRequest) -> Result<bool, GatewayError> {
    let attempts = self
      .pending
      .record_attempt(entry.id)
      .map_err(GatewayError::storage)?;

    match self.options.max_attempts {
      Some(max) if attempts >= max => {
        warn!(
          "Dropping pending request {} ({} {}) after {} attempts",
          entry.id, entry.method, entry.url, attempts
        );
        self.pending.remove(entry.id).map_err(GatewayError::storage)?;
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  /// Delete every namespace of other versions and switch lookups to `version`.
  pub fn activate(&self, version: &str) -> Result<Vec<String>, GatewayError> {
    info!("Activating cache version {}", version);
    self.cache.activate(version).map_err(GatewayError::storage)
  }

  /// Fetch every asset and store them in the static namespace of the
  /// configured version. Nothing is stored unless every fetch succeeds.
  pub async fn install(&self, assets: &[String]) -> Result<usize, GatewayError> {
    let namespace = CacheNamespaces::new(&self.options.prefix, &self.options.version).static_name();
    self.populate(&namespace, assets).await
  }

  /// Add `urls` to the static namespace of the active version on demand.
  /// All-or-nothing, like `install`.
  pub async fn precache(&self, urls: &[String]) -> Result<usize, GatewayError> {
    let namespace = self
      .cache
      .active()
      .map_err(GatewayError::storage)?
      .static_name();
    self.populate(&namespace, urls).await
  }

  async fn populate(&self, namespace: &str, assets: &[String]) -> Result<usize, GatewayError> {
    info!("Caching {} static file(s) into {}", assets.len(), namespace);

    let fetches = assets.iter().map(|asset| self.fetch_asset(asset));
    let entries = futures::future::try_join_all(fetches).await?;

    self
      .cache
      .store_static(namespace, &entries)
      .map_err(GatewayError::storage)?;

    Ok(entries.len())
  }

  async fn fetch_asset(&self, asset: &str) -> Result<(String, CachedResponse), GatewayError> {
    let request = GatewayRequest::get(self.resolve(asset)?);
    let url = request.url.to_string();

    let response = self
      .transport
      .send(&request)
      .await
      .map_err(|e| GatewayError::InstallFailed {
        url: url.clone(),
        reason: e.to_string(),
      })?;

    if !response.is_ok() {
      return Err(GatewayError::InstallFailed {
        url,
        reason: format!("status {}", response.status),
      });
    }

    let entry = CachedResponse::capture(request.method.as_str(), &url, &response);
    Ok((cache_key(&request.method, &request.url), entry))
  }

  /// Pending requests in replay order.
  pub fn pending(&self) -> Result<Vec<PendingRequest>, GatewayError> {
    self.pending.list().map_err(GatewayError::storage)
  }

  pub fn status(&self) -> Result<GatewayStatus, GatewayError> {
    let active = self.cache.active().map_err(GatewayError::storage)?;
    Ok(GatewayStatus {
      active_version: active.version().to_string(),
      namespaces: self.cache.namespaces().map_err(GatewayError::storage)?,
      pending: self.pending.len().map_err(GatewayError::storage)?,
    })
  }
}
