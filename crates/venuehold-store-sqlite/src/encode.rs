//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;
use venuehold_core::{
  queue::{QueueStatus, WaitingQueueEntry},
  reservation::{ConfirmedBooking, ReservationStatus, TemporaryReservation},
  score::VendorScoreSnapshot,
  slot::SlotKey,
};

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

/// Fixed width so that SQL string comparison orders chronologically.
pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

/// Slot times are canonicalised to whole minutes before they get here.
pub fn encode_time(t: NaiveTime) -> String { t.format("%H:%M").to_string() }

fn decode_time(s: &str) -> Result<NaiveTime> {
  NaiveTime::parse_from_str(s, "%H:%M").map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_decimal(s: &str) -> Result<Decimal> { Ok(Decimal::from_str(s)?) }

pub fn decode_reservation_status(s: &str) -> Result<ReservationStatus> {
  s.parse().map_err(|_| Error::UnknownValue {
    column: "temporary_reservations.status",
    value:  s.to_owned(),
  })
}

pub fn decode_queue_status(s: &str) -> Result<QueueStatus> {
  s.parse().map_err(|_| Error::UnknownValue {
    column: "waiting_queue_entries.status",
    value:  s.to_owned(),
  })
}

// ─── SlotKey ─────────────────────────────────────────────────────────────────

/// The five slot columns, in table order.
#[derive(Debug, Clone)]
pub struct SlotColumns {
  pub space_id:   String,
  pub date_start: String,
  pub date_end:   String,
  pub time_start: String,
  pub time_end:   String,
}

impl SlotColumns {
  pub fn as_params(&self) -> [&str; 5] {
    [
      self.space_id.as_str(),
      self.date_start.as_str(),
      self.date_end.as_str(),
      self.time_start.as_str(),
      self.time_end.as_str(),
    ]
  }

  pub fn into_slot(self) -> Result<SlotKey> {
    Ok(SlotKey::resolve(
      decode_uuid(&self.space_id)?,
      decode_date(&self.date_start)?,
      decode_date(&self.date_end)?,
      decode_time(&self.time_start)?,
      decode_time(&self.time_end)?,
    ))
  }
}

pub fn encode_slot(slot: &SlotKey) -> SlotColumns {
  SlotColumns {
    space_id:   encode_uuid(slot.space_id),
    date_start: encode_date(slot.date_start),
    date_end:   encode_date(slot.date_end),
    time_start: encode_time(slot.time_start),
    time_end:   encode_time(slot.time_end),
  }
}

/// `WHERE` fragment matching all five slot columns against `?`
/// placeholders in [`SlotColumns::as_params`] order.
pub const SLOT_MATCH: &str = "space_id = ? AND date_start = ? AND date_end = ? \
                              AND time_start = ? AND time_end = ?";

/// Read the five slot columns starting at `first`.
pub fn slot_columns(row: &rusqlite::Row<'_>, first: usize) -> rusqlite::Result<SlotColumns> {
  Ok(SlotColumns {
    space_id:   row.get(first)?,
    date_start: row.get(first + 1)?,
    date_end:   row.get(first + 2)?,
    time_start: row.get(first + 3)?,
    time_end:   row.get(first + 4)?,
  })
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const RESERVATION_COLUMNS: &str = "reservation_id, client_id, vendor_id, \
   space_id, date_start, date_end, time_start, time_end, \
   estimated_value, observations, status, expires_at, created_at, \
   resolved_at, converted_proposal_id, conversion_time_hours";

/// Raw strings read directly from a `temporary_reservations` row.
pub struct RawReservation {
  pub reservation_id:        String,
  pub client_id:             String,
  pub vendor_id:             String,
  pub slot:                  SlotColumns,
  pub estimated_value:       String,
  pub observations:          Option<String>,
  pub status:                String,
  pub expires_at:            String,
  pub created_at:            String,
  pub resolved_at:           Option<String>,
  pub converted_proposal_id: Option<String>,
  pub conversion_time_hours: Option<f64>,
}

impl RawReservation {
  /// Map a row selected with [`RESERVATION_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      reservation_id:        row.get(0)?,
      client_id:             row.get(1)?,
      vendor_id:             row.get(2)?,
      slot:                  slot_columns(row, 3)?,
      estimated_value:       row.get(8)?,
      observations:          row.get(9)?,
      status:                row.get(10)?,
      expires_at:            row.get(11)?,
      created_at:            row.get(12)?,
      resolved_at:           row.get(13)?,
      converted_proposal_id: row.get(14)?,
      conversion_time_hours: row.get(15)?,
    })
  }

  pub fn into_reservation(self) -> Result<TemporaryReservation> {
    Ok(TemporaryReservation {
      id:                    decode_uuid(&self.reservation_id)?,
      client_id:             decode_uuid(&self.client_id)?,
      vendor_id:             decode_uuid(&self.vendor_id)?,
      slot:                  self.slot.into_slot()?,
      estimated_value:       decode_decimal(&self.estimated_value)?,
      observations:          self.observations,
      status:                decode_reservation_status(&self.status)?,
      expires_at:            decode_dt(&self.expires_at)?,
      created_at:            decode_dt(&self.created_at)?,
      resolved_at:           decode_opt_dt(self.resolved_at.as_deref())?,
      converted_proposal_id: self.converted_proposal_id,
      conversion_time_hours: self.conversion_time_hours,
    })
  }
}

pub const QUEUE_COLUMNS: &str = "entry_id, vendor_id, \
   space_id, date_start, date_end, time_start, time_end, \
   position, score_base, score_performance, score_tenure, score_total, \
   status, created_at, notified_at, removed_at";

/// Raw values read directly from a `waiting_queue_entries` row.
pub struct RawQueueEntry {
  pub entry_id:          String,
  pub vendor_id:         String,
  pub slot:              SlotColumns,
  pub position:          Option<i64>,
  pub score_base:        i64,
  pub score_performance: i64,
  pub score_tenure:      i64,
  pub score_total:       i64,
  pub status:            String,
  pub created_at:        String,
  pub notified_at:       Option<String>,
  pub removed_at:        Option<String>,
}

impl RawQueueEntry {
  /// Map a row selected with [`QUEUE_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entry_id:          row.get(0)?,
      vendor_id:         row.get(1)?,
      slot:              slot_columns(row, 2)?,
      position:          row.get(7)?,
      score_base:        row.get(8)?,
      score_performance: row.get(9)?,
      score_tenure:      row.get(10)?,
      score_total:       row.get(11)?,
      status:            row.get(12)?,
      created_at:        row.get(13)?,
      notified_at:       row.get(14)?,
      removed_at:        row.get(15)?,
    })
  }

  pub fn into_entry(self) -> Result<WaitingQueueEntry> {
    Ok(WaitingQueueEntry {
      id:          decode_uuid(&self.entry_id)?,
      vendor_id:   decode_uuid(&self.vendor_id)?,
      slot:        self.slot.into_slot()?,
      position:    self.position.map(|p| p as u32),
      score:       VendorScoreSnapshot {
        base:              self.score_base as u32,
        performance_bonus: self.score_performance as u32,
        tenure_bonus:      self.score_tenure as u32,
        total:             self.score_total as u32,
      },
      status:      decode_queue_status(&self.status)?,
      created_at:  decode_dt(&self.created_at)?,
      notified_at: decode_opt_dt(self.notified_at.as_deref())?,
      removed_at:  decode_opt_dt(self.removed_at.as_deref())?,
    })
  }
}

/// Raw strings read directly from a `confirmed_bookings` row.
pub struct RawBooking {
  pub booking_id: String,
  pub slot:       SlotColumns,
}

impl RawBooking {
  pub fn into_booking(self) -> Result<ConfirmedBooking> {
    Ok(ConfirmedBooking {
      booking_id: decode_uuid(&self.booking_id)?,
      slot:       self.slot.into_slot()?,
    })
  }
}
