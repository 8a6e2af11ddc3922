//! The notification dispatcher seam.

use thiserror::Error;

use crate::event::EngineEvent;

#[derive(Debug, Error)]
pub enum DispatchError {
  #[error("no subscriber is listening for {0} events")]
  NoSubscribers(&'static str),

  #[error("delivery failed: {0}")]
  Delivery(String),
}

/// Accepts events for asynchronous delivery.
///
/// `dispatch` must not block on delivery. A returned error is logged by the
/// engine and otherwise ignored; it never undoes the state change that
/// produced the event.
pub trait Dispatcher: Send + Sync {
  fn dispatch(&self, event: &EngineEvent) -> Result<(), DispatchError>;
}
