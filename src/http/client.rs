use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::time::Duration;

use crate::error::GatewayError;

use super::types::{GatewayRequest, GatewayResponse, Headers, ResponseSource};

/// The network seam. Implementations report any failure to reach the origin
/// as `GatewayError::NetworkUnavailable` and a request that cannot be sent as
/// given as `GatewayError::InvalidRequest`; HTTP error statuses are ordinary
/// responses.
pub trait Transport: Send + Sync {
  fn send(
    &self,
    request: &GatewayRequest,
  ) -> impl Future<Output = Result<GatewayResponse, GatewayError>> + Send;
}

/// reqwest-backed transport
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
}

impl HttpTransport {
  pub fn new(timeout: Option<Duration>) -> Result<Self> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
      builder = builder.timeout(timeout);
    }

    let client = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

impl Transport for HttpTransport {
  async fn send(&self, request: &GatewayRequest) -> Result<GatewayResponse, GatewayError> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());

    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if !request.body.is_empty() {
      builder = builder.body(request.body.clone());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| send_error(format!("{} {}", request.method, request.url), e))?;

    let status = response.status().as_u16();
    let headers: Headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_lowercase(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| send_error(format!("reading body of {}", request.url), e))?;

    Ok(GatewayResponse {
      status,
      headers,
      body: body.to_vec(),
      source: ResponseSource::Network,
    })
  }
}

/// Only failures to reach or hear back from the origin count as network
/// failures; anything else means the request itself is unusable.
fn send_error(context: String, e: reqwest::Error) -> GatewayError {
  if e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() || e.is_decode() {
    GatewayError::NetworkUnavailable(format!("{}: {}", context, e))
  } else {
    GatewayError::InvalidRequest(format!("{}: {}", context, e))
  }
}
