//! Outbound events handed to the notification dispatcher.
//!
//! The engine decides *that* something must be communicated; how it reaches
//! the vendor (email, push, ...) is entirely the dispatcher's business.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::slot::SlotKey;

/// How close a hold is to its deadline when a reminder is raised.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Display,
  AsRefStr,
  EnumString,
  Serialize,
  Deserialize,
)]
pub enum ReminderTier {
  /// Expires within 24 hours (but more than 12).
  #[strum(serialize = "24h")]
  #[serde(rename = "24h")]
  Hours24,
  #[strum(serialize = "12h")]
  #[serde(rename = "12h")]
  Hours12,
  #[strum(serialize = "2h")]
  #[serde(rename = "2h")]
  Hours2,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EngineEvent {
  ReservationCreated {
    reservation_id: Uuid,
    vendor_id:      Uuid,
    client_id:      Uuid,
    slot:           SlotKey,
    expires_at:     DateTime<Utc>,
  },
  /// A freed slot is offered to the top-ranked waiting vendor.
  SlotAvailable {
    vendor_id: Uuid,
    entry_id:  Uuid,
    slot:      SlotKey,
  },
  Reminder {
    reservation_id: Uuid,
    vendor_id:      Uuid,
    tier:           ReminderTier,
    expires_at:     DateTime<Utc>,
  },
}

impl EngineEvent {
  /// The vendor the event is addressed to.
  pub fn recipient(&self) -> Uuid {
    match self {
      Self::ReservationCreated { vendor_id, .. }
      | Self::SlotAvailable { vendor_id, .. }
      | Self::Reminder { vendor_id, .. } => *vendor_id,
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      Self::ReservationCreated { .. } => "reservation-created",
      Self::SlotAvailable { .. } => "slot-available",
      Self::Reminder { .. } => "reminder",
    }
  }
}
