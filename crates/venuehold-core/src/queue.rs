//! Waiting-queue entries and the ranking rule.
//!
//! Entries are never deleted. Live entries (`active` or `notified`) hold a
//! dense 1-based position; removed entries hold none.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{error::TransitionError, score::VendorScoreSnapshot, slot::SlotKey};

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
pub enum QueueStatus {
  Active,
  /// Offered a freed slot. Still ranked; not terminal.
  Notified,
  Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum QueueAction {
  Notify,
  Leave,
}

impl QueueStatus {
  /// Statuses that occupy a position in the ranking.
  pub const LIVE: [QueueStatus; 2] = [QueueStatus::Active, QueueStatus::Notified];

  pub fn is_live(self) -> bool { Self::LIVE.contains(&self) }

  pub fn apply(self, action: QueueAction) -> Result<QueueStatus, TransitionError> {
    use QueueAction as A;
    use QueueStatus as S;

    match (self, action) {
      (S::Active, A::Notify) => Ok(S::Notified),
      (S::Active | S::Notified, A::Leave) => Ok(S::Removed),
      (from, action) => Err(TransitionError {
        entity: "queue entry",
        from:   from.into(),
        action: action.into(),
      }),
    }
  }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// A vendor's registered interest in a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingQueueEntry {
  pub id:          Uuid,
  pub vendor_id:   Uuid,
  pub slot:        SlotKey,
  /// 1-based rank among live entries; `None` once removed.
  pub position:    Option<u32>,
  /// Captured at enrollment; never refreshed.
  pub score:       VendorScoreSnapshot,
  pub status:      QueueStatus,
  pub created_at:  DateTime<Utc>,
  pub notified_at: Option<DateTime<Utc>>,
  pub removed_at:  Option<DateTime<Utc>>,
}

impl WaitingQueueEntry {
  pub fn is_owned_by(&self, vendor_id: Uuid) -> bool { self.vendor_id == vendor_id }
}

// ─── Ranking ─────────────────────────────────────────────────────────────────

/// Score descending, then earlier enrollment, then id so the order is total
/// and a reorder never swaps two otherwise-equal entries.
pub fn standing(a: &WaitingQueueEntry, b: &WaitingQueueEntry) -> Ordering {
  b.score
    .total
    .cmp(&a.score.total)
    .then_with(|| a.created_at.cmp(&b.created_at))
    .then_with(|| a.id.cmp(&b.id))
}

/// Order live entries by [`standing`] and assign positions `1..=n`.
/// Non-live entries are dropped from the result.
pub fn rank(entries: Vec<WaitingQueueEntry>) -> Vec<WaitingQueueEntry> {
  let mut live: Vec<_> = entries.into_iter().filter(|e| e.status.is_live()).collect();
  live.sort_by(standing);
  for (i, entry) in live.iter_mut().enumerate() {
    entry.position = Some(i as u32 + 1);
  }
  live
}

/// True when live entries carry exactly positions `1..=n` in standing order.
pub fn is_dense_ranking(entries: &[WaitingQueueEntry]) -> bool {
  let mut live: Vec<_> = entries.iter().filter(|e| e.status.is_live()).collect();
  live.sort_by_key(|e| e.position);
  live
    .iter()
    .enumerate()
    .all(|(i, e)| e.position == Some(i as u32 + 1))
    && live.windows(2).all(|w| standing(w[0], w[1]) == Ordering::Less)
}
