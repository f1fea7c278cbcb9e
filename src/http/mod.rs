pub mod client;
#[cfg(test)]
pub mod fake;
pub mod types;

pub use client::{HttpTransport, Transport};
pub use types::{GatewayRequest, GatewayResponse, Headers, ResponseSource};
