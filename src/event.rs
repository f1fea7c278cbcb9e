use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use url::Url;

use crate::http::{GatewayRequest, Transport};

/// Connectivity events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
  /// The origin became reachable
  Online,
  /// The origin stopped answering
  Offline,
  /// Periodic sync trigger
  Tick,
}

/// Event handler that produces connectivity transitions from origin probes
/// and a sync timer
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Probe `probe_url` every `probe_interval` and tick every `sync_interval`.
  pub fn new<T: Transport + 'static>(
    transport: Arc<T>,
    probe_url: Url,
    probe_interval: Duration,
    sync_interval: Duration,
  ) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
      let mut probe = tokio::time::interval(probe_interval);
      probe.set_missed_tick_behavior(MissedTickBehavior::Delay);

      let mut sync = tokio::time::interval(sync_interval);
      sync.set_missed_tick_behavior(MissedTickBehavior::Delay);
      // The first tick fires immediately; the online transition covers startup
      sync.tick().await;

      let mut online: Option<bool> = None;

      loop {
        let event = tokio::select! {
          _ = probe.tick() => {
            // A probe that outlives the interval counts as unreachable
            let request = GatewayRequest::get(probe_url.clone());
            let reachable = matches!(
              tokio::time::timeout(probe_interval, transport.send(&request)).await,
              Ok(Ok(_))
            );
            debug!("Probe {}: reachable={}", probe_url, reachable);
            if online == Some(reachable) {
              None
            } else {
              online = Some(reachable);
              Some(if reachable { Event::Online } else { Event::Offline })
            }
          }
          _ = sync.tick() => Some(Event::Tick),
        };

        let Some(event) = event else {
          continue;
        };
        if tx.send(event).is_err() {
          break;
        }
      }
    });

    Self { rx }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::fake::FakeTransport;

  fn handler(transport: Arc<FakeTransport>) -> EventHandler {
    EventHandler::new(
      transport,
      Url::parse("http://localhost:5000/").unwrap(),
      Duration::from_millis(10),
      Duration::from_secs(3600),
    )
  }

  #[tokio::test]
  async fn test_emits_transitions_only() {
    let transport = Arc::new(FakeTransport::new());
    let mut events = handler(Arc::clone(&transport));

    assert_eq!(events.next().await, Some(Event::Online));

    transport.set_online(false);
    assert_eq!(events.next().await, Some(Event::Offline));

    transport.set_online(true);
    assert_eq!(events.next().await, Some(Event::Online));
  }

  #[tokio::test]
  async fn test_starts_offline_when_unreachable() {
    let transport = Arc::new(FakeTransport::new());
    transport.set_online(false);
    let mut events = handler(transport);

    assert_eq!(events.next().await, Some(Event::Offline));
  }

  #[tokio::test]
  async fn test_hung_probe_counts_as_offline() {
    let transport = Arc::new(FakeTransport::new());
    let mut events = handler(Arc::clone(&transport));
    assert_eq!(events.next().await, Some(Event::Online));

    transport.set_hanging(true);
    assert_eq!(events.next().await, Some(Event::Offline));

    transport.set_hanging(false);
    assert_eq!(events.next().await, Some(Event::Online));
  }

  #[tokio::test]
  async fn test_tick() {
    let transport = Arc::new(FakeTransport::new());
    let mut events = EventHandler::new(
      transport,
      Url::parse("http://localhost:5000/").unwrap(),
      Duration::from_secs(3600),
      Duration::from_millis(10),
    );

    assert_eq!(events.next().await, Some(Event::Online));
    assert_eq!(events.next().await, Some(Event::Tick));
  }
}
