//! Vendor priority scoring.
//!
//! A score is recomputed at every enrollment from the vendor's trailing
//! 30-day activity and account age, then frozen into the queue entry.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Points every vendor starts with.
pub const BASE_POINTS: u32 = 100;

/// Length of the trailing performance window.
pub const PERFORMANCE_WINDOW_DAYS: i64 = 30;

/// `(minimum conversion rate %, bonus)`, highest threshold first.
const PERFORMANCE_TIERS: [(f64, u32); 3] = [(80.0, 50), (60.0, 30), (40.0, 15)];

/// `(minimum account age in days, bonus)`, highest threshold first.
const TENURE_TIERS: [(i64, u32); 4] = [(365, 25), (180, 15), (90, 10), (30, 5)];

/// Raw inputs the store reports for one vendor over the performance window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorActivity {
  pub account_created_at:    DateTime<Utc>,
  /// Holds the vendor created inside the window.
  pub reservations_created:  u32,
  /// How many of those holds were converted into proposals.
  pub conversions:           u32,
}

impl VendorActivity {
  /// `conversions / reservations_created × 100`; zero when nothing was held.
  pub fn conversion_rate(&self) -> f64 {
    if self.reservations_created == 0 {
      return 0.0;
    }
    f64::from(self.conversions) / f64::from(self.reservations_created) * 100.0
  }
}

/// The trailing window `[now - 30d, now]`.
pub fn performance_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
  (now - Duration::days(PERFORMANCE_WINDOW_DAYS), now)
}

pub fn performance_bonus(conversion_rate: f64) -> u32 {
  PERFORMANCE_TIERS
    .iter()
    .find(|(min, _)| conversion_rate >= *min)
    .map_or(0, |(_, bonus)| *bonus)
}

pub fn tenure_bonus(account_age_days: i64) -> u32 {
  TENURE_TIERS
    .iter()
    .find(|(min, _)| account_age_days >= *min)
    .map_or(0, |(_, bonus)| *bonus)
}

/// A point-in-time priority score. Never cached beyond the queue entry that
/// captured it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorScoreSnapshot {
  pub base:              u32,
  pub performance_bonus: u32,
  pub tenure_bonus:      u32,
  pub total:             u32,
}

impl Default for VendorScoreSnapshot {
  /// Base points only. Used when the vendor's data cannot be read.
  fn default() -> Self { Self::from_parts(0, 0) }
}

impl VendorScoreSnapshot {
  pub fn from_parts(performance_bonus: u32, tenure_bonus: u32) -> Self {
    Self {
      base: BASE_POINTS,
      performance_bonus,
      tenure_bonus,
      total: BASE_POINTS + performance_bonus + tenure_bonus,
    }
  }

  pub fn from_activity(activity: &VendorActivity, now: DateTime<Utc>) -> Self {
    let age_days = (now - activity.account_created_at).num_days();
    Self::from_parts(
      performance_bonus(activity.conversion_rate()),
      tenure_bonus(age_days),
    )
  }
}
