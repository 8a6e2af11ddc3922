//! In-process [`Dispatcher`] implementations.
//!
//! Real delivery (email, push) lives outside the engine. The broadcast
//! dispatcher lets any number of in-process consumers pick events up; the
//! binary subscribes one that logs every event.

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;
use venuehold_core::{
  dispatch::{DispatchError, Dispatcher},
  event::EngineEvent,
};

const CHANNEL_CAPACITY: usize = 256;

// ─── Broadcast ───────────────────────────────────────────────────────────────

/// Fans events out to every subscriber, plus per-vendor channels for
/// consumers that only care about one recipient.
pub struct BroadcastDispatcher {
  all:     broadcast::Sender<EngineEvent>,
  vendors: DashMap<Uuid, broadcast::Sender<EngineEvent>>,
}

impl BroadcastDispatcher {
  pub fn new() -> Self {
    Self {
      all:     broadcast::channel(CHANNEL_CAPACITY).0,
      vendors: DashMap::new(),
    }
  }

  /// Receive every event.
  pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> { self.all.subscribe() }

  /// Receive only events addressed to `vendor_id`. Creates the channel if
  /// needed.
  pub fn subscribe_vendor(&self, vendor_id: Uuid) -> broadcast::Receiver<EngineEvent> {
    self
      .vendors
      .entry(vendor_id)
      .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
      .subscribe()
  }

  /// Drop per-vendor channels whose receivers have all gone away.
  pub fn prune(&self) {
    self.vendors.retain(|_, tx| tx.receiver_count() > 0);
  }
}

impl Default for BroadcastDispatcher {
  fn default() -> Self { Self::new() }
}

impl Dispatcher for BroadcastDispatcher {
  fn dispatch(&self, event: &EngineEvent) -> Result<(), DispatchError> {
    let mut delivered = false;
    if let Some(tx) = self.vendors.get(&event.recipient()) {
      delivered |= tx.send(event.clone()).is_ok();
    }
    delivered |= self.all.send(event.clone()).is_ok();

    if delivered {
      Ok(())
    } else {
      Err(DispatchError::NoSubscribers(event.name()))
    }
  }
}

// ─── Null ────────────────────────────────────────────────────────────────────

/// Accepts and discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDispatcher;

impl Dispatcher for NullDispatcher {
  fn dispatch(&self, _event: &EngineEvent) -> Result<(), DispatchError> { Ok(()) }
}
