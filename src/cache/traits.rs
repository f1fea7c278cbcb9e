//! Core types for the caching system.

use chrono::{DateTime, Utc};

use crate::http::{GatewayResponse, Headers, ResponseSource};

/// Partition of the cache an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceKind {
  /// Build-time assets, populated once at install
  Static,
  /// Runtime responses, upserted after successful fetches
  Dynamic,
}

impl NamespaceKind {
  fn as_str(self) -> &'static str {
    match self {
      Self::Static => "static",
      Self::Dynamic => "dynamic",
    }
  }
}

/// Namespace names for one cache version.
///
/// Names look like `<prefix>-static-<version>` and `<prefix>-dynamic-<version>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNamespaces {
  prefix: String,
  version: String,
}

impl CacheNamespaces {
  pub fn new(prefix: &str, version: &str) -> Self {
    Self {
      prefix: prefix.to_string(),
      version: version.to_string(),
    }
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn name(&self, kind: NamespaceKind) -> String {
    format!("{}-{}-{}", self.prefix, kind.as_str(), self.version)
  }

  pub fn static_name(&self) -> String {
    self.name(NamespaceKind::Static)
  }

  pub fn dynamic_name(&self) -> String {
    self.name(NamespaceKind::Dynamic)
  }

  /// Whether `name` belongs to this version.
  pub fn owns(&self, name: &str) -> bool {
    name == self.static_name() || name == self.dynamic_name()
  }

  /// Same prefix, different version.
  pub fn with_version(&self, version: &str) -> Self {
    Self::new(&self.prefix, version)
  }
}

/// A response as stored in a namespace.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub method: String,
  pub url: String,
  pub status: u16,
  pub headers: Headers,
  pub body: Vec<u8>,
  pub cached_at: DateTime<Utc>,
}

impl CachedResponse {
  /// Snapshot a network response for storage.
  pub fn capture(method: &str, url: &str, response: &GatewayResponse) -> Self {
    Self {
      method: method.to_string(),
      url: url.to_string(),
      status: response.status,
      headers: response.headers.clone(),
      body: response.body.clone(),
      cached_at: Utc::now(),
    }
  }

  pub fn into_response(self) -> GatewayResponse {
    GatewayResponse {
      status: self.status,
      headers: self.headers,
      body: self.body,
      source: ResponseSource::Cache,
    }
  }
}

/// A namespace and how many entries it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceInfo {
  pub name: String,
  pub entries: usize,
}
