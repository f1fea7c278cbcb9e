//! Cache keys for intercepted requests.

use reqwest::Method;
use sha2::{Digest, Sha256};
use url::Url;

/// Stable key for a request: SHA-256 over method and absolute URL.
///
/// The fragment never reaches the origin, so it is not part of the key.
pub fn cache_key(method: &Method, url: &Url) -> String {
  let mut url = url.clone();
  url.set_fragment(None);

  let input = format!("{} {}", method.as_str(), url);

  // SHA256 hash for stable, fixed-length keys
  let mut hasher = Sha256::new();
  hasher.update(input.as_bytes());
  hex::encode(hasher.finalize())
}
