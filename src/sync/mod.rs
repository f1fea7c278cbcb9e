//! Background sync: the pending-request log and the loop that drains it.

mod pending;

pub use pending::{PendingLog, PendingRequest, SqlitePendingLog};

use tracing::{info, warn};

use crate::cache::CacheStorage;
use crate::event::{Event, EventHandler};
use crate::gateway::Gateway;
use crate::http::Transport;

/// Tracks connectivity and decides when to reconcile.
#[derive(Debug, Default)]
pub struct SyncState {
  online: bool,
}

impl SyncState {
  /// Apply an event; returns whether a reconciliation pass should run.
  pub fn on_event(&mut self, event: Event) -> bool {
    match event {
      Event::Online => {
        self.online = true;
        true
      }
      Event::Offline => {
        self.online = false;
        false
      }
      Event::Tick => self.online,
    }
  }

  pub fn is_online(&self) -> bool {
    self.online
  }
}

/// Reconcile on every online transition and on ticks while online, until
/// the event stream ends or Ctrl-C.
pub async fn run<T, S, L>(gateway: &Gateway<T, S, L>, mut events: EventHandler) -> color_eyre::Result<()>
where
  T: Transport,
  S: CacheStorage,
  L: PendingLog,
{
  let mut state = SyncState::default();

  loop {
    let event = tokio::select! {
      event = events.next() => event,
      _ = tokio::signal::ctrl_c() => {
        info!("Interrupted, stopping sync loop");
        break;
      }
    };

    let Some(event) = event else {
      break;
    };

    match event {
      Event::Online => info!("Connection restored"),
      Event::Offline => info!("Connection lost, queuing until online"),
      Event::Tick => {}
    }

    if !state.on_event(event) {
      continue;
    }

    match gateway.reconcile().await {
      Ok(report) if report.replayed > 0 || report.failed > 0 => info!(
        "Sync pass: {} replayed, {} failed, {} dropped, {} remaining",
        report.replayed, report.failed, report.dropped, report.remaining
      ),
      Ok(_) => {}
      Err(e) => warn!("Sync pass failed: {}", e),
    }
  }

  Ok(())
}
