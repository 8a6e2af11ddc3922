//! Temporary reservations (holds) and their lifecycle.
//!
//! A hold is created `active` and leaves that state exactly once, into one of
//! four terminal states. [`ReservationStatus::apply`] is the only place that
//! decides which moves are legal.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{error::TransitionError, slot::SlotKey};

// ─── State machine ───────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Display,
  AsRefStr,
  EnumString,
  IntoStaticStr,
  Serialize,
  Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
  Active,
  Expired,
  Converted,
  Released,
  Cancelled,
}

/// A request to move a reservation out of its current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ReservationAction {
  /// Deadline passed; only the sweeper issues this.
  Expire,
  Convert,
  Release,
  Cancel,
}

impl ReservationStatus {
  pub fn is_terminal(self) -> bool { !matches!(self, Self::Active) }

  /// The transition table. Every mutating operation goes through here.
  pub fn apply(
    self,
    action: ReservationAction,
  ) -> Result<ReservationStatus, TransitionError> {
    use ReservationAction as A;
    use ReservationStatus as S;

    match (self, action) {
      (S::Active, A::Expire) => Ok(S::Expired),
      (S::Active, A::Convert) => Ok(S::Converted),
      (S::Active, A::Release) => Ok(S::Released),
      (S::Active, A::Cancel) => Ok(S::Cancelled),
      (from, action) => Err(TransitionError {
        entity: "reservation",
        from:   from.into(),
        action: action.into(),
      }),
    }
  }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// A time-boxed, non-binding claim on a slot by a vendor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporaryReservation {
  pub id:                    Uuid,
  pub client_id:             Uuid,
  /// The owning salesperson.
  pub vendor_id:             Uuid,
  pub slot:                  SlotKey,
  pub estimated_value:       Decimal,
  pub observations:          Option<String>,
  pub status:                ReservationStatus,
  /// Absolute deadline; the hold is expirable once `now > expires_at`.
  pub expires_at:            DateTime<Utc>,
  pub created_at:            DateTime<Utc>,
  /// When the hold left `active`, whichever way it went.
  pub resolved_at:           Option<DateTime<Utc>>,
  pub converted_proposal_id: Option<String>,
  pub conversion_time_hours: Option<f64>,
}

impl TemporaryReservation {
  pub fn is_owned_by(&self, vendor_id: Uuid) -> bool { self.vendor_id == vendor_id }

  /// Past the deadline, regardless of whether a sweep has recorded it yet.
  pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool { now > self.expires_at }
}

// ─── Input ───────────────────────────────────────────────────────────────────

/// Caller-supplied fields for a new hold. Identity, status and timestamps are
/// assigned by the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct NewReservation {
  pub client_id:           Uuid,
  pub slot:                SlotKey,
  #[serde(default)]
  pub estimated_value:     Decimal,
  #[serde(default)]
  pub observations:        Option<String>,
  /// Falls back to the engine's configured default (48h) when absent.
  #[serde(default)]
  pub hold_duration_hours: Option<u32>,
}

/// Audit row linking a converted hold to the proposal it became.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRecord {
  pub conversion_id:         Uuid,
  pub reservation_id:        Uuid,
  pub proposal_id:           String,
  pub vendor_id:             Uuid,
  pub converted_at:          DateTime<Utc>,
  pub conversion_time_hours: f64,
}

/// A committed booking owned by the wider system. The engine only reads these
/// to keep holds off already-sold slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedBooking {
  pub booking_id: Uuid,
  pub slot:       SlotKey,
}
