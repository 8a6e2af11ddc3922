//! Waiting-queue operations.
//!
//! Positions are recomputed eagerly after every enrollment and removal so
//! reads never have to rank. Every path that changes a slot's live set or
//! its positions runs under that slot's lock.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;
use venuehold_core::{
  dispatch::Dispatcher,
  error::{Error, Result, TransitionError},
  event::EngineEvent,
  queue::{self, QueueAction, QueueStatus, WaitingQueueEntry},
  slot::SlotKey,
  store::{HoldStore, QueueQuery, QueueTransition},
};

use crate::Engine;

impl<S, D> Engine<S, D>
where
  S: HoldStore,
  D: Dispatcher,
{
  // ── Reads ───────────────────────────────────────────────────────────────

  pub async fn get_queue_entry(&self, id: Uuid) -> Result<WaitingQueueEntry> {
    self
      .store
      .get_queue_entry(id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::QueueEntryNotFound(id))
  }

  /// Live standings for `slot`, in position order.
  pub async fn slot_queue(&self, slot: SlotKey) -> Result<Vec<WaitingQueueEntry>> {
    let slot = slot.canonical();
    slot.validate()?;
    self.live_entries(slot, QueueStatus::LIVE.to_vec()).await
  }

  /// Every entry `vendor_id` ever created, live ones first.
  pub async fn vendor_queue(&self, vendor_id: Uuid) -> Result<Vec<WaitingQueueEntry>> {
    self
      .store
      .list_queue_entries(QueueQuery { vendor_id: Some(vendor_id), ..Default::default() })
      .await
      .map_err(Error::store)
  }

  async fn live_entries(
    &self,
    slot: SlotKey,
    statuses: Vec<QueueStatus>,
  ) -> Result<Vec<WaitingQueueEntry>> {
    self
      .store
      .list_queue_entries(QueueQuery { vendor_id: None, slot: Some(slot), statuses })
      .await
      .map_err(Error::store)
  }

  // ── Enroll / leave ──────────────────────────────────────────────────────

  /// Join the waiting queue for `slot`. If the vendor already has a live
  /// entry there, that entry is returned unchanged.
  pub async fn enroll(
    &self,
    vendor_id: Uuid,
    slot: SlotKey,
    now: DateTime<Utc>,
  ) -> Result<WaitingQueueEntry> {
    let slot = slot.canonical();
    slot.validate()?;

    if let Some(existing) = self.live_entry_for(vendor_id, slot).await? {
      debug!(entry_id = %existing.id, %vendor_id, %slot, "already enrolled");
      return Ok(existing);
    }

    let score = self.compute_score(vendor_id, now).await;
    let _guard = self.locks.acquire(slot).await;

    let attempts = self.config.reorder_attempts.max(1);
    let mut attempt = 0;
    let entry = loop {
      let entry = WaitingQueueEntry {
        id: Uuid::new_v4(),
        vendor_id,
        slot,
        position: None,
        score,
        status: QueueStatus::Active,
        created_at: now,
        notified_at: None,
        removed_at: None,
      };
      if self.store.insert_queue_entry(entry.clone()).await.map_err(Error::store)? {
        break entry;
      }
      // Lost to a concurrent enrollment by the same vendor.
      if let Some(existing) = self.live_entry_for(vendor_id, slot).await? {
        return Ok(existing);
      }

      // The conflicting entry left before it could be read.
      attempt += 1;
      if attempt >= attempts {
        warn!(%vendor_id, %slot, attempts, "giving up on enrollment");
        return Err(Error::QueueContention(slot));
      }
      debug!(%vendor_id, %slot, attempt, "live entry vanished during enrollment; retrying");
    };

    let ranked = self.reorder_locked(slot).await?;
    let entry = ranked
      .into_iter()
      .find(|e| e.id == entry.id)
      .ok_or(Error::QueueEntryNotFound(entry.id))?;

    info!(
      entry_id = %entry.id,
      %vendor_id,
      %slot,
      score = entry.score.total,
      position = entry.position.unwrap_or_default(),
      "vendor enrolled"
    );
    Ok(entry)
  }

  /// Leave the waiting queue. The entry is kept with status `removed`.
  pub async fn leave(
    &self,
    entry_id: Uuid,
    vendor_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<WaitingQueueEntry> {
    let mut entry = self.get_queue_entry(entry_id).await?;
    if !entry.is_owned_by(vendor_id) {
      return Err(Error::Forbidden { id: entry_id, vendor_id });
    }
    let to = entry.status.apply(QueueAction::Leave)?;

    let _guard = self.locks.acquire(entry.slot).await;
    let applied = self
      .store
      .transition_queue_entry(QueueTransition {
        id: entry_id,
        from: QueueStatus::LIVE.to_vec(),
        to,
        at: now,
      })
      .await
      .map_err(Error::store)?;
    if !applied {
      let latest = self.get_queue_entry(entry_id).await?;
      return Err(
        TransitionError {
          entity: "queue entry",
          from:   latest.status.into(),
          action: QueueAction::Leave.into(),
        }
        .into(),
      );
    }
    self.reorder_locked(entry.slot).await?;

    info!(%entry_id, %vendor_id, slot = %entry.slot, "vendor left queue");
    entry.status = to;
    entry.position = None;
    entry.removed_at = Some(now);
    Ok(entry)
  }

  async fn live_entry_for(
    &self,
    vendor_id: Uuid,
    slot: SlotKey,
  ) -> Result<Option<WaitingQueueEntry>> {
    let mut found = self
      .store
      .list_queue_entries(QueueQuery {
        vendor_id: Some(vendor_id),
        slot:      Some(slot),
        statuses:  QueueStatus::LIVE.to_vec(),
      })
      .await
      .map_err(Error::store)?;
    Ok(found.pop())
  }

  // ── Ordering ────────────────────────────────────────────────────────────

  /// Recompute and persist the positions of `slot`'s live entries.
  pub async fn reorder(&self, slot: SlotKey) -> Result<Vec<WaitingQueueEntry>> {
    let slot = slot.canonical();
    let _guard = self.locks.acquire(slot).await;
    self.reorder_locked(slot).await
  }

  /// Rank and write the whole slot in one store transaction. The write only
  /// lands if the live set is unchanged since it was read; otherwise the
  /// ranking is recomputed.
  async fn reorder_locked(&self, slot: SlotKey) -> Result<Vec<WaitingQueueEntry>> {
    let attempts = self.config.reorder_attempts.max(1);
    for attempt in 1..=attempts {
      let live = self.live_entries(slot, QueueStatus::LIVE.to_vec()).await?;
      let ranked = queue::rank(live);
      let positions = ranked
        .iter()
        .filter_map(|e| e.position.map(|p| (e.id, p)))
        .collect();

      if self.store.apply_positions(slot, positions).await.map_err(Error::store)? {
        debug!(%slot, live = ranked.len(), "queue reordered");
        return Ok(ranked);
      }
      debug!(%slot, attempt, "live set changed during reorder; retrying");
    }

    warn!(%slot, attempts, "giving up on reorder");
    Err(Error::QueueContention(slot))
  }

  // ── Notification ────────────────────────────────────────────────────────

  /// Offer a freed `slot` to its top-ranked `active` entry. At most one
  /// entry is notified per call; returns it, or `None` if nobody waits.
  ///
  /// Either outcome settles the slot's pending notification. On error it
  /// stays pending for the next sweep.
  pub async fn notify_on_free(
    &self,
    slot: SlotKey,
    now: DateTime<Utc>,
  ) -> Result<Option<WaitingQueueEntry>> {
    let _guard = self.locks.acquire(slot).await;
    let waiting = self.live_entries(slot, vec![QueueStatus::Active]).await?;

    for mut entry in waiting {
      let to = entry.status.apply(QueueAction::Notify)?;
      let applied = self
        .store
        .transition_queue_entry(QueueTransition {
          id: entry.id,
          from: vec![QueueStatus::Active],
          to,
          at: now,
        })
        .await
        .map_err(Error::store)?;
      if !applied {
        // Left between the read and the write; offer to the next in line.
        debug!(entry_id = %entry.id, %slot, "entry no longer active; skipping");
        continue;
      }

      entry.status = to;
      entry.notified_at = Some(now);
      info!(
        entry_id = %entry.id,
        vendor_id = %entry.vendor_id,
        %slot,
        position = entry.position.unwrap_or_default(),
        "waiting vendor notified"
      );
      self.emit(EngineEvent::SlotAvailable {
        vendor_id: entry.vendor_id,
        entry_id: entry.id,
        slot,
      });
      return Ok(Some(entry));
    }

    self.store.settle_notification(slot).await.map_err(Error::store)?;
    debug!(%slot, "no active entries to notify");
    Ok(None)
  }
}
