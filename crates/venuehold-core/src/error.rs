//! Error types for `venuehold-core`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{AsRefStr, Display};
use thiserror::Error;
use uuid::Uuid;

use crate::slot::SlotKey;

/// Returned when a status change is not listed in a state machine's table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} a {entity} that is {from}")]
pub struct TransitionError {
  pub entity: &'static str,
  pub from:   &'static str,
  pub action: &'static str,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("reservation not found: {0}")]
  ReservationNotFound(Uuid),

  #[error("queue entry not found: {0}")]
  QueueEntryNotFound(Uuid),

  #[error("vendor {vendor_id} already holds an active reservation on {slot}")]
  DuplicateHold { vendor_id: Uuid, slot: SlotKey },

  #[error("{slot} overlaps confirmed booking {booking_id}")]
  SlotBooked { slot: SlotKey, booking_id: Uuid },

  #[error("queue for {0} kept changing while being reordered")]
  QueueContention(SlotKey),

  #[error("vendor {vendor_id} does not own {id}")]
  Forbidden { id: Uuid, vendor_id: Uuid },

  #[error(transparent)]
  InvalidTransition(#[from] TransitionError),

  #[error("reservation {id} expired at {expires_at}")]
  Expired { id: Uuid, expires_at: DateTime<Utc> },

  #[error("invalid input: {0}")]
  InvalidInput(String),

  #[error("store unavailable: {0}")]
  StoreUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// The coarse failure taxonomy callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  NotFound,
  Conflict,
  Forbidden,
  InvalidState,
  Expired,
  InvalidInput,
  StoreUnavailable,
}

impl Error {
  /// Wrap a collaborator failure.
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::StoreUnavailable(Box::new(e))
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::ReservationNotFound(_) | Self::QueueEntryNotFound(_) => {
        ErrorKind::NotFound
      }
      Self::DuplicateHold { .. }
      | Self::SlotBooked { .. }
      | Self::QueueContention(_) => ErrorKind::Conflict,
      Self::Forbidden { .. } => ErrorKind::Forbidden,
      Self::InvalidTransition(_) => ErrorKind::InvalidState,
      Self::Expired { .. } => ErrorKind::Expired,
      Self::InvalidInput(_) => ErrorKind::InvalidInput,
      Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
