//! The temporary reservation and waiting-queue engine.
//!
//! [`Engine`] is generic over a [`HoldStore`] and a [`Dispatcher`]. It holds
//! no timers and caches nothing between calls: every operation takes the
//! current time as an explicit `now` argument and works from what the store
//! reports. The only in-process state is a registry of per-slot locks that
//! serialises queue reorders for a slot.

mod locks;
mod queue;
mod reservations;
mod scoring;

pub mod config;
pub mod dispatch;
pub mod sweeper;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use tracing::{debug, warn};
use venuehold_core::{dispatch::Dispatcher, event::EngineEvent, store::HoldStore};

pub use config::EngineConfig;
pub use dispatch::{BroadcastDispatcher, NullDispatcher};
pub use sweeper::{Bucket, Reminders, SweepReport};

use crate::locks::SlotLocks;

/// Entry point for every reservation, queue and sweep operation.
pub struct Engine<S, D> {
  store:      Arc<S>,
  dispatcher: Arc<D>,
  locks:      SlotLocks,
  config:     EngineConfig,
}

impl<S, D> Engine<S, D>
where
  S: HoldStore,
  D: Dispatcher,
{
  pub fn new(store: Arc<S>, dispatcher: Arc<D>, config: EngineConfig) -> Self {
    Self {
      store,
      dispatcher,
      locks: SlotLocks::new(),
      config,
    }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn dispatcher(&self) -> &Arc<D> { &self.dispatcher }

  /// Hand an event to the dispatcher. Failures are logged, never returned.
  fn emit(&self, event: EngineEvent) {
    match self.dispatcher.dispatch(&event) {
      Ok(()) => debug!(
        event = event.name(),
        recipient = %event.recipient(),
        "event dispatched"
      ),
      Err(e) => warn!(
        event = event.name(),
        recipient = %event.recipient(),
        error = %e,
        "event dispatch failed"
      ),
    }
  }
}
