//! In-process transport for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::GatewayError;

use super::client::Transport;
use super::types::{GatewayRequest, GatewayResponse, ResponseSource};

/// Routes by URL path, records every call that reaches the "network", and
/// fails everything while offline.
#[derive(Default)]
pub struct FakeTransport {
  offline: AtomicBool,
  hanging: AtomicBool,
  routes: Mutex<HashMap<String, (u16, String)>>,
  calls: Mutex<Vec<GatewayRequest>>,
}

impl FakeTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn route(&self, path: &str, status: u16, body: &str) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(path.to_string(), (status, body.to_string()));
  }

  pub fn set_online(&self, online: bool) {
    self.offline.store(!online, Ordering::SeqCst);
  }

  /// Never answer while set.
  pub fn set_hanging(&self, hanging: bool) {
    self.hanging.store(hanging, Ordering::SeqCst);
  }

  /// Requests that reached the network, in order.
  pub fn calls(&self) -> Vec<GatewayRequest> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self) -> usize {
    self.calls.lock().unwrap().len()
  }

  pub fn reset_calls(&self) {
    self.calls.lock().unwrap().clear();
  }
}

impl Transport for FakeTransport {
  async fn send(&self, request: &GatewayRequest) -> Result<GatewayResponse, GatewayError> {
    if self.hanging.load(Ordering::SeqCst) {
      std::future::pending::<()>().await;
    }
    if self.offline.load(Ordering::SeqCst) {
      return Err(GatewayError::NetworkUnavailable(format!(
        "{} {}: offline",
        request.method, request.url
      )));
    }

    self.calls.lock().unwrap().push(request.clone());

    let route = self.routes.lock().unwrap().get(request.url.path()).cloned();
    let (status, body) = route.unwrap_or((404, "not found".to_string()));
    Ok(GatewayResponse::synthesized(
      status,
      "text/plain",
      body,
      ResponseSource::Network,
    ))
  }
}
