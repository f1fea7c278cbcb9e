use std::collections::HashSet;
use url::Url;

use crate::http::GatewayRequest;

/// Target category of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
  Navigation,
  Api,
  StaticAsset,
  Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  NetworkFirst,
  CacheFirst,
}

impl RequestKind {
  pub fn strategy(self) -> Strategy {
    match self {
      Self::StaticAsset => Strategy::CacheFirst,
      Self::Navigation | Self::Api | Self::Other => Strategy::NetworkFirst,
    }
  }
}

/// Path-prefix classifier.
#[derive(Debug, Clone)]
pub struct Classifier {
  api_prefix: String,
  static_prefixes: Vec<String>,
  /// Absolute URLs of the install list, fragment stripped
  static_urls: HashSet<String>,
}

impl Classifier {
  pub fn new(
    api_prefix: &str,
    static_prefixes: &[String],
    static_urls: impl IntoIterator<Item = Url>,
  ) -> Self {
    Self {
      api_prefix: api_prefix.to_string(),
      static_prefixes: static_prefixes.to_vec(),
      static_urls: static_urls.into_iter().map(|u| strip_fragment(&u)).collect(),
    }
  }

  /// Navigation wins, then the API prefix, then static prefixes and the
  /// install list.
  pub fn classify(&self, request: &GatewayRequest) -> RequestKind {
    let path = request.url.path();

    if request.is_navigation() {
      RequestKind::Navigation
    } else if path.starts_with(&self.api_prefix) {
      RequestKind::Api
    } else if self.static_prefixes.iter().any(|p| path.starts_with(p.as_str()))
      || self.static_urls.contains(&strip_fragment(&request.url))
    {
      RequestKind::StaticAsset
    } else {
      RequestKind::Other
    }
  }
}

fn strip_fragment(url: &Url) -> String {
  let mut url = url.clone();
  url.set_fragment(None);
  url.into()
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::Method;

  fn classifier() -> Classifier {
    let origin = Url::parse("http://localhost:5000").unwrap();
    Classifier::new(
      "/api/",
      &["/static/".to_string()],
      vec![
        origin.join("/").unwrap(),
        origin.join("/manifest.json").unwrap(),
        Url::parse("https://unpkg.com/leaflet@1.9.4/dist/leaflet.css").unwrap(),
      ],
    )
  }

  fn get(s: &str) -> GatewayRequest {
    GatewayRequest::get(Url::parse(s).unwrap())
  }

  #[test]
  fn test_navigation_wins() {
    let req = GatewayRequest::navigate(Url::parse("http://localhost:5000/static/page").unwrap());
    assert_eq!(classifier().classify(&req), RequestKind::Navigation);
  }

  #[test]
  fn test_api_prefix() {
    let c = classifier();
    assert_eq!(c.classify(&get("http://localhost:5000/api/get-routes")), RequestKind::Api);
    let post = GatewayRequest::new(Method::POST, Url::parse("http://localhost:5000/api/scan").unwrap());
    assert_eq!(c.classify(&post), RequestKind::Api);
  }

  #[test]
  fn test_static_by_prefix_and_list() {
    let c = classifier();
    assert_eq!(c.classify(&get("http://localhost:5000/static/css/style.css")), RequestKind::StaticAsset);
    assert_eq!(c.classify(&get("http://localhost:5000/manifest.json")), RequestKind::StaticAsset);
    assert_eq!(c.classify(&get("http://localhost:5000/")), RequestKind::StaticAsset);
    assert_eq!(
      c.classify(&get("https://unpkg.com/leaflet@1.9.4/dist/leaflet.css")),
      RequestKind::StaticAsset
    );
  }

  #[test]
  fn test_other() {
    assert_eq!(classifier().classify(&get("http://localhost:5000/admin")), RequestKind::Other);
  }

  #[test]
  fn test_strategies() {
    assert_eq!(RequestKind::StaticAsset.strategy(), Strategy::CacheFirst);
    assert_eq!(RequestKind::Navigation.strategy(), Strategy::NetworkFirst);
    assert_eq!(RequestKind::Api.strategy(), Strategy::NetworkFirst);
    assert_eq!(RequestKind::Other.strategy(), Strategy::NetworkFirst);
  }
}
