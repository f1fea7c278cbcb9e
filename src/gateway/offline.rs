//! Responses synthesized when neither network nor cache can answer.

use serde_json::json;

use crate::http::{GatewayResponse, ResponseSource};

const SERVICE_UNAVAILABLE: u16 = 503;
const ACCEPTED: u16 = 202;

/// Navigation miss with no cached offline page.
pub fn navigation() -> GatewayResponse {
  text(SERVICE_UNAVAILABLE, "Offline")
}

/// API miss.
pub fn api() -> GatewayResponse {
  let body = json!({
    "error": "Offline",
    "offline": true,
    "message": "This request failed because you are offline",
  });
  GatewayResponse::synthesized(
    SERVICE_UNAVAILABLE,
    "application/json",
    body.to_string(),
    ResponseSource::Offline,
  )
}

/// Static asset neither cached nor reachable.
pub fn asset() -> GatewayResponse {
  text(SERVICE_UNAVAILABLE, "Asset not available offline")
}

pub fn other() -> GatewayResponse {
  text(SERVICE_UNAVAILABLE, "Service unavailable offline")
}

/// Mutation stored for background sync.
pub fn queued() -> GatewayResponse {
  let body = json!({
    "success": true,
    "offline": true,
    "message": "Request stored for sync when online",
  });
  GatewayResponse::synthesized(
    ACCEPTED,
    "application/json",
    body.to_string(),
    ResponseSource::Queued,
  )
}

fn text(status: u16, body: &str) -> GatewayResponse {
  GatewayResponse::synthesized(status, "text/plain", body, ResponseSource::Offline)
}
