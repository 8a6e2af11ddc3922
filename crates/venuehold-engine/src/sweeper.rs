//! The expiration sweep.
//!
//! One [`Engine::sweep`] call expires lapsed holds, offers each freed slot to
//! its waiting queue, and raises reminders for holds close to their deadline.
//! The engine owns no timer; whoever schedules sweeps picks the cadence.
//!
//! Freed slots are recorded in the store together with the write that frees
//! them. A slot whose queue cannot be consulted stays recorded and is offered
//! again by the next sweep, so one failing slot never holds back the others.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;
use venuehold_core::{
  dispatch::Dispatcher,
  error::{Error, Result},
  event::{EngineEvent, ReminderTier},
  queue::WaitingQueueEntry,
  reservation::{ReservationAction, ReservationStatus},
  slot::SlotKey,
  store::{HoldStore, ReservationQuery},
};

use crate::Engine;

const MS_PER_HOUR: f64 = 3_600_000.0;

// ─── Classification ──────────────────────────────────────────────────────────

/// What a sweep does with one active hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
  Expire,
  Remind(ReminderTier),
  /// More than 24 hours left.
  Ignore,
}

/// Hours from `now` until `expires_at`; negative once the deadline passed.
pub fn hours_until(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
  (expires_at - now).num_milliseconds() as f64 / MS_PER_HOUR
}

/// `<= 0` expires, `(0, 2]`, `(2, 12]` and `(12, 24]` map to the 2h, 12h and
/// 24h reminder tiers, anything later is left alone.
pub fn classify(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Bucket {
  let hours = hours_until(expires_at, now);
  if hours <= 0.0 {
    Bucket::Expire
  } else if hours <= 2.0 {
    Bucket::Remind(ReminderTier::Hours2)
  } else if hours <= 12.0 {
    Bucket::Remind(ReminderTier::Hours12)
  } else if hours <= 24.0 {
    Bucket::Remind(ReminderTier::Hours24)
  } else {
    Bucket::Ignore
  }
}

// ─── Report ──────────────────────────────────────────────────────────────────

/// Reservation ids reminded in one sweep, by tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reminders {
  #[serde(rename = "tier24h")]
  pub tier_24h: Vec<Uuid>,
  #[serde(rename = "tier12h")]
  pub tier_12h: Vec<Uuid>,
  #[serde(rename = "tier2h")]
  pub tier_2h:  Vec<Uuid>,
}

impl Reminders {
  fn push(&mut self, tier: ReminderTier, id: Uuid) {
    match tier {
      ReminderTier::Hours24 => self.tier_24h.push(id),
      ReminderTier::Hours12 => self.tier_12h.push(id),
      ReminderTier::Hours2 => self.tier_2h.push(id),
    }
  }

  pub fn len(&self) -> usize { self.tier_24h.len() + self.tier_12h.len() + self.tier_2h.len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
  /// Holds this sweep moved to `expired`.
  pub expired:       Vec<Uuid>,
  /// Queue entries offered a slot freed by this sweep or left pending by an
  /// earlier release or sweep.
  pub notified:      Vec<WaitingQueueEntry>,
  /// Slots whose waiting queue could not be consulted; retried next sweep.
  pub notify_failed: Vec<SlotKey>,
  pub reminders:     Reminders,
}

impl SweepReport {
  pub fn expired_count(&self) -> usize { self.expired.len() }
}

// ─── Sweep ───────────────────────────────────────────────────────────────────

impl<S, D> Engine<S, D>
where
  S: HoldStore,
  D: Dispatcher,
{
  /// Run one sweep at `now`.
  ///
  /// Fails only if the active holds cannot be listed or expired, or if the
  /// pending slots cannot be read. Notification failures land in
  /// [`SweepReport::notify_failed`].
  pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
    let active = self
      .store
      .list_reservations(ReservationQuery {
        status: Some(ReservationStatus::Active),
        ..Default::default()
      })
      .await
      .map_err(Error::store)?;

    let mut report = SweepReport::default();
    let mut lapsed: BTreeSet<Uuid> = BTreeSet::new();

    for reservation in &active {
      match classify(reservation.expires_at, now) {
        Bucket::Expire => match reservation.status.apply(ReservationAction::Expire) {
          Ok(_) => {
            lapsed.insert(reservation.id);
          }
          Err(e) => debug!(reservation_id = %reservation.id, error = %e, "not expirable"),
        },
        Bucket::Remind(tier) => {
          report.reminders.push(tier, reservation.id);
          self.emit(EngineEvent::Reminder {
            reservation_id: reservation.id,
            vendor_id: reservation.vendor_id,
            tier,
            expires_at: reservation.expires_at,
          });
        }
        Bucket::Ignore => {}
      }
    }

    if !lapsed.is_empty() {
      report.expired = self
        .store
        .expire_reservations(lapsed.iter().copied().collect(), now)
        .await
        .map_err(Error::store)?;
      if report.expired.len() < lapsed.len() {
        debug!(
          candidates = lapsed.len(),
          expired = report.expired.len(),
          "some lapsed holds were resolved before the sweep reached them"
        );
      }
    }

    let pending = self.store.pending_notifications().await.map_err(Error::store)?;
    for slot in pending {
      match self.notify_on_free(slot, now).await {
        Ok(Some(entry)) => report.notified.push(entry),
        Ok(None) => {}
        Err(e) => {
          warn!(%slot, error = %e, "queue notification failed; slot stays pending");
          report.notify_failed.push(slot);
        }
      }
    }

    let pruned = self.locks.prune();
    info!(
      expired = report.expired_count(),
      notified = report.notified.len(),
      notify_failed = report.notify_failed.len(),
      reminders_24h = report.reminders.tier_24h.len(),
      reminders_12h = report.reminders.tier_12h.len(),
      reminders_2h = report.reminders.tier_2h.len(),
      locks_pruned = pruned,
      locks_live = self.locks.len(),
      "sweep complete"
    );
    Ok(report)
  }
}
