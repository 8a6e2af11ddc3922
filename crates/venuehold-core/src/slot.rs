//! SlotKey: the identity of a bookable unit.
//!
//! Holds and queue entries that resolve to equal keys compete for the same
//! resource. The engine never compares raw date/time fields, only keys.

use std::fmt;

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// A venue space over a date range and a daily time window.
///
/// Ordering is derived field-by-field so keys can live in ordered sets; it
/// carries no business meaning.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SlotKey {
  pub space_id:   Uuid,
  pub date_start: NaiveDate,
  pub date_end:   NaiveDate,
  pub time_start: NaiveTime,
  pub time_end:   NaiveTime,
}

impl SlotKey {
  /// Canonicalise the raw fields into a key. Times are truncated to whole
  /// minutes so `14:00` and `14:00:00.250` resolve identically.
  pub fn resolve(
    space_id: Uuid,
    date_start: NaiveDate,
    date_end: NaiveDate,
    time_start: NaiveTime,
    time_end: NaiveTime,
  ) -> Self {
    Self {
      space_id,
      date_start,
      date_end,
      time_start: truncate_to_minute(time_start),
      time_end: truncate_to_minute(time_end),
    }
  }

  /// Re-canonicalise a key that was deserialised from untrusted input.
  pub fn canonical(self) -> Self {
    Self::resolve(
      self.space_id,
      self.date_start,
      self.date_end,
      self.time_start,
      self.time_end,
    )
  }

  /// Reject keys that cannot describe a bookable unit.
  ///
  /// The time window applies to every day of the date range, so it must not
  /// wrap past midnight.
  pub fn validate(&self) -> Result<()> {
    if self.date_end < self.date_start {
      return Err(Error::InvalidInput(format!(
        "slot date_end {} precedes date_start {}",
        self.date_end, self.date_start
      )));
    }
    if self.time_end <= self.time_start {
      return Err(Error::InvalidInput(format!(
        "slot time_end {} must be after time_start {}",
        self.time_end, self.time_start
      )));
    }
    Ok(())
  }

  /// Whether two keys claim any common minute of the same space.
  ///
  /// Date ranges are inclusive on both ends; time windows are half-open, so
  /// `10:00–12:00` and `12:00–14:00` do not overlap.
  pub fn overlaps(&self, other: &SlotKey) -> bool {
    self.space_id == other.space_id
      && self.date_start <= other.date_end
      && other.date_start <= self.date_end
      && self.time_start < other.time_end
      && other.time_start < self.time_end
  }
}

impl fmt::Display for SlotKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}@{}..{} {}-{}",
      self.space_id,
      self.date_start,
      self.date_end,
      self.time_start.format("%H:%M"),
      self.time_end.format("%H:%M"),
    )
  }
}

fn truncate_to_minute(t: NaiveTime) -> NaiveTime {
  t.with_second(0)
    .and_then(|t| t.with_nanosecond(0))
    .unwrap_or(t)
}
