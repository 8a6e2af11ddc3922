//! The `HoldStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g.
//! `venuehold-store-sqlite`). The engine depends on this abstraction, not on
//! any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  queue::{QueueStatus, WaitingQueueEntry},
  reservation::{
    ConfirmedBooking, ConversionRecord, ReservationStatus, TemporaryReservation,
  },
  score::VendorActivity,
  slot::SlotKey,
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`HoldStore::list_reservations`]. Empty fields do not
/// filter.
#[derive(Debug, Clone, Default)]
pub struct ReservationQuery {
  pub vendor_id: Option<Uuid>,
  pub slot:      Option<SlotKey>,
  pub status:    Option<ReservationStatus>,
  pub limit:     Option<usize>,
}

/// Parameters for [`HoldStore::list_queue_entries`]. An empty `statuses`
/// list matches every status.
#[derive(Debug, Clone, Default)]
pub struct QueueQuery {
  pub vendor_id: Option<Uuid>,
  pub slot:      Option<SlotKey>,
  pub statuses:  Vec<QueueStatus>,
}

// ─── Commands ────────────────────────────────────────────────────────────────

/// Move one reservation out of `active`. The store applies it only if the
/// row is still `active` at write time.
#[derive(Debug, Clone)]
pub struct ReservationTransition {
  pub id:         Uuid,
  pub to:         ReservationStatus,
  pub at:         DateTime<Utc>,
  /// Present only for conversions; written in the same unit as the status.
  pub conversion: Option<ConversionRecord>,
  /// Record the slot as owing its waiting queue a notification, in the same
  /// unit as the status. See [`HoldStore::pending_notifications`].
  pub frees_slot: bool,
}

/// Move one queue entry from any of `from` into `to`.
#[derive(Debug, Clone)]
pub struct QueueTransition {
  pub id:   Uuid,
  pub from: Vec<QueueStatus>,
  pub to:   QueueStatus,
  pub at:   DateTime<Utc>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the relational store holding reservations and queue
/// entries.
///
/// Every write is conditional on the row's current state and reports whether
/// it took effect, so callers can tell a lost race from success. Reservation
/// and queue rows are never deleted.
///
/// A slot freed by a release or an expiry stays *pending* until its waiting
/// queue has been consulted. The pending record is written together with the
/// status change that frees the slot and cleared together with the queue
/// entry it notifies, so a failure in between is retried rather than lost.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait HoldStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Reservations ──────────────────────────────────────────────────────

  /// Persist a new reservation. Returns `false` without writing when the
  /// vendor already has an `active` reservation on the same slot.
  fn insert_reservation(
    &self,
    reservation: TemporaryReservation,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn get_reservation(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<TemporaryReservation>, Self::Error>> + Send + '_;

  /// Matching reservations, oldest first.
  fn list_reservations(
    &self,
    query: ReservationQuery,
  ) -> impl Future<Output = Result<Vec<TemporaryReservation>, Self::Error>> + Send + '_;

  /// Apply a single-row status change. Returns `false` if the row no longer
  /// exists or is no longer `active`.
  fn transition_reservation(
    &self,
    transition: ReservationTransition,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Mark every listed reservation that is still `active` and past its
  /// deadline at `now` as `expired`, in one batch, leaving each affected
  /// slot pending. Returns the ids actually changed.
  fn expire_reservations(
    &self,
    ids: Vec<Uuid>,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  /// Confirmed bookings that overlap `slot` (see [`SlotKey::overlaps`]).
  fn overlapping_bookings(
    &self,
    slot: SlotKey,
  ) -> impl Future<Output = Result<Vec<ConfirmedBooking>, Self::Error>> + Send + '_;

  // ── Queue entries ─────────────────────────────────────────────────────

  /// Persist a new entry. Returns `false` without writing when the vendor
  /// already has a live entry for the same slot.
  fn insert_queue_entry(
    &self,
    entry: WaitingQueueEntry,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn get_queue_entry(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<WaitingQueueEntry>, Self::Error>> + Send + '_;

  /// Matching entries. Live entries come first in position order, then the
  /// rest by creation time.
  fn list_queue_entries(
    &self,
    query: QueueQuery,
  ) -> impl Future<Output = Result<Vec<WaitingQueueEntry>, Self::Error>> + Send + '_;

  /// Apply a single-row status change; clears the position when the target
  /// status is not live. Moving an entry to `notified` also settles its
  /// slot's pending notification. Returns `false` if the row's status is not
  /// in `from`.
  fn transition_queue_entry(
    &self,
    transition: QueueTransition,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Write a full ranking for `slot` atomically.
  ///
  /// `ranking` must name every live entry of the slot exactly once. If the
  /// live set in the store differs from the ids in `ranking` (an entry was
  /// added or left concurrently), nothing is written and `false` is
  /// returned.
  fn apply_positions(
    &self,
    slot: SlotKey,
    ranking: Vec<(Uuid, u32)>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Pending notifications ─────────────────────────────────────────────

  /// Slots freed by a release or expiry whose waiting queue has not been
  /// consulted yet, oldest first.
  fn pending_notifications(
    &self,
  ) -> impl Future<Output = Result<Vec<SlotKey>, Self::Error>> + Send + '_;

  /// Forget `slot`'s pending notification. A no-op if none is recorded.
  fn settle_notification(
    &self,
    slot: SlotKey,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Vendors ───────────────────────────────────────────────────────────

  /// Activity counts for holds the vendor created in `[since, until]`, plus
  /// the account creation date. `None` if the vendor is unknown.
  fn vendor_activity(
    &self,
    vendor_id: Uuid,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<VendorActivity>, Self::Error>> + Send + '_;
}
