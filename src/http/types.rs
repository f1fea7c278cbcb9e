use reqwest::Method;
use std::collections::BTreeMap;
use url::Url;

/// Header map with lowercased names.
pub type Headers = BTreeMap<String, String>;

/// How the client issued the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestMode {
  /// Top-level page load
  Navigate,
  /// Any programmatic fetch
  #[default]
  Fetch,
}

/// A request on its way from the client application to the origin.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
  pub method: Method,
  pub url: Url,
  pub headers: Headers,
  pub body: Vec<u8>,
  pub mode: RequestMode,
}

impl GatewayRequest {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: Headers::new(),
      body: Vec::new(),
      mode: RequestMode::Fetch,
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  /// A page navigation (GET in navigate mode).
  pub fn navigate(url: Url) -> Self {
    Self {
      mode: RequestMode::Navigate,
      ..Self::get(url)
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self
      .headers
      .insert(name.trim().to_lowercase(), value.trim().to_string());
    self
  }

  pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.body = body.into();
    self
  }

  pub fn is_navigation(&self) -> bool {
    self.mode == RequestMode::Navigate
  }

  /// State-changing requests (POST, PUT, PATCH, DELETE, ...).
  pub fn is_mutating(&self) -> bool {
    !self.method.is_safe()
  }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh from the origin
  Network,
  /// Served from a cache namespace
  Cache,
  /// Synthesized because neither network nor cache could answer
  Offline,
  /// Synthesized after the request was stored for later replay
  Queued,
}

impl std::fmt::Display for ResponseSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      Self::Network => "network",
      Self::Cache => "cache",
      Self::Offline => "offline",
      Self::Queued => "queued",
    };
    f.write_str(name)
  }
}

/// A response handed back to the client application.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
  pub status: u16,
  pub headers: Headers,
  pub body: Vec<u8>,
  pub source: ResponseSource,
}

impl GatewayResponse {
  /// Build a response that did not come from the origin.
  pub fn synthesized(
    status: u16,
    content_type: &str,
    body: impl Into<Vec<u8>>,
    source: ResponseSource,
  ) -> Self {
    let mut headers = Headers::new();
    headers.insert("content-type".to_string(), content_type.to_string());
    Self {
      status,
      headers,
      body: body.into(),
      source,
    }
  }

  /// 2xx status.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }

  pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::from_slice(&self.body)
  }

  pub fn content_type(&self) -> Option<&str> {
    self.headers.get("content-type").map(String::as_str)
  }
}
