use thiserror::Error;

/// Errors surfaced by gateway operations.
///
/// Network and cache failures are normally absorbed by the gateway and turned
/// into synthesized responses; they only escape from the lower-level helpers.
#[derive(Debug, Error)]
pub enum GatewayError {
  #[error("network unavailable: {0}")]
  NetworkUnavailable(String),

  /// The request cannot be sent as given (bad header name or URL scheme)
  #[error("invalid request: {0}")]
  InvalidRequest(String),

  #[error("no cached response for {0}")]
  CacheMiss(String),

  #[error("storage unavailable: {0}")]
  StorageUnavailable(String),

  #[error("replay of pending request {id} failed: {reason}")]
  ReplayFailure { id: i64, reason: String },

  #[error("failed to install {url}: {reason}")]
  InstallFailed { url: String, reason: String },

  #[error("invalid url '{url}': {source}")]
  InvalidUrl {
    url: String,
    #[source]
    source: url::ParseError,
  },
}

impl GatewayError {
  /// Wrap a storage report.
  pub fn storage(report: color_eyre::Report) -> Self {
    Self::StorageUnavailable(report.to_string())
  }

  pub fn is_network(&self) -> bool {
    matches!(self, Self::NetworkUnavailable(_))
  }
}
