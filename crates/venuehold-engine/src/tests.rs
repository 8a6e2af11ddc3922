//! Engine tests against an in-memory SQLite store.

use std::sync::{
  Arc, Mutex,
  atomic::{AtomicU32, Ordering},
};

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;
use venuehold_core::{
  dispatch::{DispatchError, Dispatcher},
  error::ErrorKind,
  event::{EngineEvent, ReminderTier},
  queue::{is_dense_ranking, QueueStatus, WaitingQueueEntry},
  reservation::{ConfirmedBooking, NewReservation, ReservationStatus, TemporaryReservation},
  score::{VendorActivity, BASE_POINTS},
  slot::SlotKey,
  store::{HoldStore, QueueQuery, QueueTransition, ReservationQuery, ReservationTransition},
};
use venuehold_store_sqlite::SqliteStore;

use crate::{Engine, EngineConfig, SweepReport};

// ─── Fixtures ────────────────────────────────────────────────────────────────

/// Keeps every event it is handed.
#[derive(Default)]
struct RecordingDispatcher {
  events: Mutex<Vec<EngineEvent>>,
}

impl RecordingDispatcher {
  fn take(&self) -> Vec<EngineEvent> { std::mem::take(&mut *self.events.lock().unwrap()) }
}

impl Dispatcher for RecordingDispatcher {
  fn dispatch(&self, event: &EngineEvent) -> Result<(), DispatchError> {
    self.events.lock().unwrap().push(event.clone());
    Ok(())
  }
}

/// Refuses every event.
struct BrokenDispatcher;

impl Dispatcher for BrokenDispatcher {
  fn dispatch(&self, _event: &EngineEvent) -> Result<(), DispatchError> {
    Err(DispatchError::Delivery("smtp relay down".into()))
  }
}

type TestEngine = Engine<SqliteStore, RecordingDispatcher>;

async fn engine() -> TestEngine {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  Engine::new(
    Arc::new(store),
    Arc::new(RecordingDispatcher::default()),
    EngineConfig::default(),
  )
}

fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2026, 4, 6, 9, 0, 0).unwrap() }

fn slot_in(space: u128) -> SlotKey {
  let day = NaiveDate::from_ymd_opt(2026, 5, 16).unwrap();
  SlotKey::resolve(
    Uuid::from_u128(space),
    day,
    day,
    NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
    NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
  )
}

fn slot() -> SlotKey { slot_in(1) }

fn vendor(n: u128) -> Uuid { Uuid::from_u128(0xbeef_0000 + n) }

fn request(slot: SlotKey, hours: Option<u32>) -> NewReservation {
  NewReservation {
    client_id: Uuid::new_v4(),
    slot,
    estimated_value: Decimal::new(1_200_000, 2),
    observations: None,
    hold_duration_hours: hours,
  }
}

/// Register `vendor_id` with `holds` reservations created yesterday, the
/// first `conversions` of which were converted, and an account `tenure_days`
/// old. Seeds go straight through the store so they raise no events.
async fn seed_vendor(
  engine: &TestEngine,
  vendor_id: Uuid,
  tenure_days: i64,
  holds: u32,
  conversions: u32,
) {
  let store = engine.store();
  store
    .upsert_vendor(vendor_id, "seeded vendor", t0() - Duration::days(tenure_days))
    .await
    .unwrap();

  for i in 0..holds {
    let created_at = t0() - Duration::days(1);
    let id = Uuid::new_v4();
    store
      .insert_reservation(TemporaryReservation {
        id,
        client_id: Uuid::new_v4(),
        vendor_id,
        slot: slot_in(10_000 + u128::from(i)),
        estimated_value: Decimal::ZERO,
        observations: None,
        status: ReservationStatus::Active,
        expires_at: created_at + Duration::hours(48),
        created_at,
        resolved_at: None,
        converted_proposal_id: None,
        conversion_time_hours: None,
      })
      .await
      .unwrap();
    let to = if i < conversions { ReservationStatus::Converted } else { ReservationStatus::Released };
    store
      .transition_reservation(ReservationTransition {
        id,
        to,
        at: created_at + Duration::hours(1),
        conversion: None,
        frees_slot: false,
      })
      .await
      .unwrap();
  }
}

fn positions(entries: &[WaitingQueueEntry]) -> Vec<(Uuid, Option<u32>)> {
  entries.iter().map(|e| (e.vendor_id, e.position)).collect()
}

// ─── Scoring ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn score_combines_performance_and_tenure() {
  let e = engine().await;
  let v = vendor(1);
  seed_vendor(&e, v, 400, 5, 4).await;

  let score = e.compute_score(v, t0()).await;
  assert_eq!(score.base, BASE_POINTS);
  assert_eq!(score.performance_bonus, 50);
  assert_eq!(score.tenure_bonus, 25);
  assert_eq!(score.total, 175);
}

#[tokio::test]
async fn unknown_vendor_gets_base_score() {
  let e = engine().await;
  let score = e.compute_score(vendor(9), t0()).await;
  assert_eq!(score.total, BASE_POINTS);
  assert_eq!(score.performance_bonus, 0);
  assert_eq!(score.tenure_bonus, 0);
}

/// Wraps the SQLite store and fails chosen calls on demand.
struct FaultyStore {
  inner:             SqliteStore,
  statistics_down:   bool,
  /// Queue notifications to refuse before letting them through.
  failing_notifies:  AtomicU32,
  /// Queue inserts to drop as if a conflicting live entry had been there.
  vanishing_inserts: AtomicU32,
}

impl FaultyStore {
  async fn new() -> Self {
    Self {
      inner:             SqliteStore::open_in_memory().await.expect("in-memory store"),
      statistics_down:   false,
      failing_notifies:  AtomicU32::new(0),
      vanishing_inserts: AtomicU32::new(0),
    }
  }

  fn outage(what: &str) -> venuehold_store_sqlite::Error {
    venuehold_store_sqlite::Error::DateParse(format!("{what} offline"))
  }
}

/// Decrement `counter` if it is positive, reporting whether it was.
fn take_one(counter: &AtomicU32) -> bool {
  counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
}

impl HoldStore for FaultyStore {
  type Error = venuehold_store_sqlite::Error;

  async fn insert_reservation(&self, r: TemporaryReservation) -> Result<bool, Self::Error> {
    self.inner.insert_reservation(r).await
  }

  async fn get_reservation(&self, id: Uuid) -> Result<Option<TemporaryReservation>, Self::Error> {
    self.inner.get_reservation(id).await
  }

  async fn list_reservations(
    &self,
    query: ReservationQuery,
  ) -> Result<Vec<TemporaryReservation>, Self::Error> {
    self.inner.list_reservations(query).await
  }

  async fn transition_reservation(&self, t: ReservationTransition) -> Result<bool, Self::Error> {
    self.inner.transition_reservation(t).await
  }

  async fn expire_reservations(
    &self,
    ids: Vec<Uuid>,
    now: DateTime<Utc>,
  ) -> Result<Vec<Uuid>, Self::Error> {
    self.inner.expire_reservations(ids, now).await
  }

  async fn overlapping_bookings(&self, slot: SlotKey) -> Result<Vec<ConfirmedBooking>, Self::Error> {
    self.inner.overlapping_bookings(slot).await
  }

  async fn insert_queue_entry(&self, e: WaitingQueueEntry) -> Result<bool, Self::Error> {
    if take_one(&self.vanishing_inserts) {
      return Ok(false);
    }
    self.inner.insert_queue_entry(e).await
  }

  async fn get_queue_entry(&self, id: Uuid) -> Result<Option<WaitingQueueEntry>, Self::Error> {
    self.inner.get_queue_entry(id).await
  }

  async fn list_queue_entries(&self, query: QueueQuery) -> Result<Vec<WaitingQueueEntry>, Self::Error> {
    self.inner.list_queue_entries(query).await
  }

  async fn transition_queue_entry(&self, t: QueueTransition) -> Result<bool, Self::Error> {
    if t.to == QueueStatus::Notified && take_one(&self.failing_notifies) {
      return Err(Self::outage("queue writer"));
    }
    self.inner.transition_queue_entry(t).await
  }

  async fn apply_positions(
    &self,
    slot: SlotKey,
    ranking: Vec<(Uuid, u32)>,
  ) -> Result<bool, Self::Error> {
    self.inner.apply_positions(slot, ranking).await
  }

  async fn pending_notifications(&self) -> Result<Vec<SlotKey>, Self::Error> {
    self.inner.pending_notifications().await
  }

  async fn settle_notification(&self, slot: SlotKey) -> Result<(), Self::Error> {
    self.inner.settle_notification(slot).await
  }

  async fn vendor_activity(
    &self,
    vendor_id: Uuid,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
  ) -> Result<Option<VendorActivity>, Self::Error> {
    if self.statistics_down {
      return Err(Self::outage("statistics replica"));
    }
    self.inner.vendor_activity(vendor_id, since, until).await
  }
}

fn faulty_engine(store: FaultyStore) -> Engine<FaultyStore, RecordingDispatcher> {
  Engine::new(Arc::new(store), Arc::new(RecordingDispatcher::default()), EngineConfig::default())
}

#[tokio::test]
async fn scoring_outage_degrades_to_base_score() {
  let mut store = FaultyStore::new().await;
  store.statistics_down = true;
  store.inner.upsert_vendor(vendor(1), "veteran", t0() - Duration::days(900)).await.unwrap();
  let e = faulty_engine(store);

  let entry = e.enroll(vendor(1), slot(), t0()).await.unwrap();
  assert_eq!(entry.score.total, BASE_POINTS);
  assert_eq!(entry.position, Some(1));
}

// ─── Reservations ────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_sets_deadline_and_announces_it() {
  let e = engine().await;
  let r = e.create_reservation(vendor(1), request(slot(), None), t0()).await.unwrap();

  assert_eq!(r.status, ReservationStatus::Active);
  assert_eq!(r.expires_at, t0() + Duration::hours(48));
  assert_eq!(r.created_at, t0());
  assert_eq!(e.get_reservation(r.id).await.unwrap(), r);

  let events = e.dispatcher().take();
  assert_eq!(events, vec![EngineEvent::ReservationCreated {
    reservation_id: r.id,
    vendor_id:      vendor(1),
    client_id:      r.client_id,
    slot:           slot(),
    expires_at:     r.expires_at,
  }]);
}

#[tokio::test]
async fn create_canonicalises_the_slot() {
  let e = engine().await;
  let mut raw = slot();
  raw.time_start = NaiveTime::from_hms_milli_opt(14, 0, 0, 250).unwrap();

  let r = e.create_reservation(vendor(1), request(raw, Some(4)), t0()).await.unwrap();
  assert_eq!(r.slot, slot());

  let err = e.create_reservation(vendor(1), request(slot(), Some(4)), t0()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn second_active_hold_conflicts() {
  let e = engine().await;
  e.create_reservation(vendor(1), request(slot(), None), t0()).await.unwrap();

  let err = e.create_reservation(vendor(1), request(slot(), None), t0()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);

  // Another vendor may still hold the same slot.
  e.create_reservation(vendor(2), request(slot(), None), t0()).await.unwrap();
}

#[tokio::test]
async fn hold_on_a_booked_slot_conflicts() {
  let e = engine().await;
  let booked = SlotKey::resolve(
    slot().space_id,
    slot().date_start,
    slot().date_end,
    NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
    NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
  );
  e.store()
    .insert_confirmed_booking(&ConfirmedBooking { booking_id: Uuid::new_v4(), slot: booked })
    .await
    .unwrap();

  let err = e.create_reservation(vendor(1), request(slot(), None), t0()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);
  assert!(e.dispatcher().take().is_empty());
}

#[tokio::test]
async fn malformed_requests_are_invalid_input() {
  let e = engine().await;

  let mut backwards = slot();
  backwards.time_end = NaiveTime::from_hms_opt(13, 0, 0).unwrap();
  let err = e.create_reservation(vendor(1), request(backwards, None), t0()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidInput);

  let err = e.create_reservation(vendor(1), request(slot(), Some(0)), t0()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidInput);

  let err = e.create_reservation(vendor(1), request(slot(), Some(721)), t0()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn failed_dispatch_does_not_undo_the_hold() {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let e = Engine::new(store.clone(), Arc::new(BrokenDispatcher), EngineConfig::default());

  let r = e.create_reservation(vendor(1), request(slot(), None), t0()).await.unwrap();
  let stored = store.get_reservation(r.id).await.unwrap().unwrap();
  assert_eq!(stored.status, ReservationStatus::Active);
}

#[tokio::test]
async fn convert_records_proposal_and_audit() {
  let e = engine().await;
  let r = e.create_reservation(vendor(1), request(slot(), None), t0()).await.unwrap();

  let at = t0() + Duration::minutes(90);
  let converted = e.convert_reservation(r.id, vendor(1), "P123".into(), at).await.unwrap();
  assert_eq!(converted.status, ReservationStatus::Converted);
  assert_eq!(converted.converted_proposal_id.as_deref(), Some("P123"));
  assert_eq!(converted.conversion_time_hours, Some(1.5));
  assert_eq!(e.get_reservation(r.id).await.unwrap(), converted);

  let audit = e.store().conversion_for(r.id).await.unwrap().expect("audit row");
  assert_eq!(audit.proposal_id, "P123");
  assert_eq!(audit.vendor_id, vendor(1));
  assert_eq!(audit.converted_at, at);
}

#[tokio::test]
async fn converted_hold_is_immune_to_sweeps() {
  // Scenario D.
  let e = engine().await;
  let r = e.create_reservation(vendor(1), request(slot(), Some(1)), t0()).await.unwrap();
  e.convert_reservation(r.id, vendor(1), "P123".into(), t0() + Duration::minutes(30))
    .await
    .unwrap();

  let report = e.sweep(t0() + Duration::hours(5)).await.unwrap();
  assert_eq!(report.expired_count(), 0);

  let after = e.get_reservation(r.id).await.unwrap();
  assert_eq!(after.status, ReservationStatus::Converted);
  assert_eq!(after.converted_proposal_id.as_deref(), Some("P123"));
}

#[tokio::test]
async fn converting_an_expired_hold_reports_expired() {
  // Scenario E.
  let e = engine().await;
  let r = e.create_reservation(vendor(1), request(slot(), Some(1)), t0()).await.unwrap();
  e.sweep(t0() + Duration::hours(2)).await.unwrap();

  let err = e
    .convert_reservation(r.id, vendor(1), "P123".into(), t0() + Duration::hours(3))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Expired);
}

#[tokio::test]
async fn converting_past_the_deadline_before_a_sweep_reports_expired() {
  let e = engine().await;
  let r = e.create_reservation(vendor(1), request(slot(), Some(1)), t0()).await.unwrap();

  let err = e
    .convert_reservation(r.id, vendor(1), "P123".into(), t0() + Duration::minutes(61))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Expired);

  // Left for the sweeper.
  let after = e.get_reservation(r.id).await.unwrap();
  assert_eq!(after.status, ReservationStatus::Active);
}

#[tokio::test]
async fn convert_at_exact_deadline_succeeds() {
  let e = engine().await;
  let r = e.create_reservation(vendor(1), request(slot(), Some(1)), t0()).await.unwrap();
  let converted = e
    .convert_reservation(r.id, vendor(1), "P9".into(), r.expires_at)
    .await
    .unwrap();
  assert_eq!(converted.conversion_time_hours, Some(1.0));
}

#[tokio::test]
async fn ownership_and_existence_are_checked_first() {
  let e = engine().await;
  let r = e.create_reservation(vendor(1), request(slot(), None), t0()).await.unwrap();

  let err = e.convert_reservation(r.id, vendor(2), "P1".into(), t0()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);
  let err = e.release_reservation(r.id, vendor(2), t0()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);
  let err = e.cancel_reservation(Uuid::new_v4(), vendor(1), t0()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn terminal_holds_reject_further_actions() {
  let e = engine().await;
  let r = e.create_reservation(vendor(1), request(slot(), None), t0()).await.unwrap();
  e.cancel_reservation(r.id, vendor(1), t0()).await.unwrap();

  let err = e.release_reservation(r.id, vendor(1), t0()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidState);
  let err = e.convert_reservation(r.id, vendor(1), "P1".into(), t0()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidState);
  let err = e.cancel_reservation(r.id, vendor(1), t0()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn release_notifies_top_of_queue_and_cancel_does_not() {
  let e = engine().await;
  seed_vendor(&e, vendor(2), 0, 5, 4).await; // 150
  seed_vendor(&e, vendor(3), 0, 5, 3).await; // 130

  let hold = e.create_reservation(vendor(1), request(slot(), None), t0()).await.unwrap();
  let other = e.create_reservation(vendor(4), request(slot(), None), t0()).await.unwrap();
  let low = e.enroll(vendor(3), slot(), t0()).await.unwrap();
  let top = e.enroll(vendor(2), slot(), t0() + Duration::minutes(1)).await.unwrap();
  e.dispatcher().take();

  e.cancel_reservation(other.id, vendor(4), t0()).await.unwrap();
  assert!(e.dispatcher().take().is_empty());
  assert_eq!(e.get_queue_entry(top.id).await.unwrap().status, QueueStatus::Active);

  let released = e.release_reservation(hold.id, vendor(1), t0()).await.unwrap();
  assert_eq!(released.status, ReservationStatus::Released);

  let notified = e.get_queue_entry(top.id).await.unwrap();
  assert_eq!(notified.status, QueueStatus::Notified);
  assert_eq!(notified.notified_at, Some(t0()));
  assert_eq!(notified.position, Some(1));
  assert_eq!(e.get_queue_entry(low.id).await.unwrap().status, QueueStatus::Active);

  assert_eq!(e.dispatcher().take(), vec![EngineEvent::SlotAvailable {
    vendor_id: vendor(2),
    entry_id:  top.id,
    slot:      slot(),
  }]);
}

#[tokio::test]
async fn later_releases_skip_already_notified_entries() {
  let e = engine().await;
  let first = e.enroll(vendor(2), slot(), t0()).await.unwrap();
  let second = e.enroll(vendor(3), slot(), t0() + Duration::minutes(1)).await.unwrap();
  let a = e.create_reservation(vendor(1), request(slot(), None), t0()).await.unwrap();
  let b = e.create_reservation(vendor(4), request(slot(), None), t0()).await.unwrap();

  e.release_reservation(a.id, vendor(1), t0()).await.unwrap();
  e.release_reservation(b.id, vendor(4), t0()).await.unwrap();

  assert_eq!(e.get_queue_entry(first.id).await.unwrap().status, QueueStatus::Notified);
  assert_eq!(e.get_queue_entry(second.id).await.unwrap().status, QueueStatus::Notified);

  // Nobody left to offer the slot to.
  assert!(e.notify_on_free(slot(), t0()).await.unwrap().is_none());
}

#[tokio::test]
async fn release_survives_a_failed_queue_notification() {
  let e = faulty_engine(FaultyStore::new().await);
  let hold = e.create_reservation(vendor(1), request(slot(), None), t0()).await.unwrap();
  let waiting = e.enroll(vendor(2), slot(), t0()).await.unwrap();
  e.store().failing_notifies.store(1, Ordering::SeqCst);
  e.dispatcher().take();

  let released = e.release_reservation(hold.id, vendor(1), t0()).await.unwrap();
  assert_eq!(released.status, ReservationStatus::Released);
  assert_eq!(e.get_queue_entry(waiting.id).await.unwrap().status, QueueStatus::Active);
  assert_eq!(e.store().pending_notifications().await.unwrap(), vec![slot()]);
  assert!(e.dispatcher().take().is_empty());

  // The next sweep delivers what the release could not.
  let report = e.sweep(t0() + Duration::minutes(1)).await.unwrap();
  assert!(report.expired.is_empty());
  assert!(report.notify_failed.is_empty());
  assert_eq!(report.notified.len(), 1);
  assert_eq!(report.notified[0].id, waiting.id);
  assert_eq!(e.get_queue_entry(waiting.id).await.unwrap().status, QueueStatus::Notified);
  assert!(e.store().pending_notifications().await.unwrap().is_empty());
}

#[tokio::test]
async fn release_with_an_empty_queue_leaves_nothing_pending() {
  let e = engine().await;
  let hold = e.create_reservation(vendor(1), request(slot(), None), t0()).await.unwrap();
  e.release_reservation(hold.id, vendor(1), t0()).await.unwrap();
  assert!(e.store().pending_notifications().await.unwrap().is_empty());
}

// ─── Queue ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn higher_score_ranks_first_despite_later_enrollment() {
  // Scenario B.
  let e = engine().await;
  seed_vendor(&e, vendor(1), 0, 5, 4).await; // 150
  seed_vendor(&e, vendor(2), 0, 5, 3).await; // 130

  e.enroll(vendor(2), slot(), t0()).await.unwrap();
  let v1 = e.enroll(vendor(1), slot(), t0() + Duration::minutes(5)).await.unwrap();
  assert_eq!(v1.score.total, 150);
  assert_eq!(v1.position, Some(1));

  let standings = e.slot_queue(slot()).await.unwrap();
  assert_eq!(positions(&standings), vec![(vendor(1), Some(1)), (vendor(2), Some(2))]);

  // Idempotent re-enrollment changes nothing.
  let again = e.enroll(vendor(2), slot(), t0() + Duration::minutes(10)).await.unwrap();
  assert_eq!(again.position, Some(2));
  assert_eq!(e.slot_queue(slot()).await.unwrap(), standings);
}

#[tokio::test]
async fn newcomer_with_higher_score_takes_the_lead() {
  // Scenario C.
  let e = engine().await;
  seed_vendor(&e, vendor(2), 90, 5, 3).await; // 100 + 30 + 10

  let v1 = e.enroll(vendor(1), slot(), t0()).await.unwrap();
  assert_eq!(v1.score.total, 100);
  assert_eq!(v1.position, Some(1));

  let v2 = e.enroll(vendor(2), slot(), t0() + Duration::minutes(1)).await.unwrap();
  assert_eq!(v2.score.total, 140);
  assert_eq!(v2.position, Some(1));

  let v1 = e.get_queue_entry(v1.id).await.unwrap();
  assert_eq!(v1.position, Some(2));
}

#[tokio::test]
async fn ties_go_to_the_earlier_enrollment() {
  let e = engine().await;
  for (i, v) in [vendor(5), vendor(3), vendor(4)].into_iter().enumerate() {
    e.enroll(v, slot(), t0() + Duration::minutes(i as i64)).await.unwrap();
  }
  let standings = e.slot_queue(slot()).await.unwrap();
  assert_eq!(positions(&standings), vec![
    (vendor(5), Some(1)),
    (vendor(3), Some(2)),
    (vendor(4), Some(3)),
  ]);
}

#[tokio::test]
async fn enrollment_is_idempotent_for_notified_entries() {
  let e = engine().await;
  let entry = e.enroll(vendor(1), slot(), t0()).await.unwrap();
  e.notify_on_free(slot(), t0()).await.unwrap();

  let again = e.enroll(vendor(1), slot(), t0() + Duration::hours(1)).await.unwrap();
  assert_eq!(again.id, entry.id);
  assert_eq!(again.status, QueueStatus::Notified);
  assert_eq!(e.slot_queue(slot()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn leave_closes_the_gap() {
  let e = engine().await;
  e.enroll(vendor(1), slot(), t0()).await.unwrap();
  let b = e.enroll(vendor(2), slot(), t0() + Duration::minutes(1)).await.unwrap();
  let c = e.enroll(vendor(3), slot(), t0() + Duration::minutes(2)).await.unwrap();

  let left = e.leave(b.id, vendor(2), t0() + Duration::hours(1)).await.unwrap();
  assert_eq!(left.status, QueueStatus::Removed);
  assert_eq!(left.position, None);
  assert_eq!(left.removed_at, Some(t0() + Duration::hours(1)));
  assert_eq!(e.get_queue_entry(b.id).await.unwrap(), left);

  let standings = e.slot_queue(slot()).await.unwrap();
  assert_eq!(positions(&standings), vec![(vendor(1), Some(1)), (vendor(3), Some(2))]);
  assert_eq!(standings[1].id, c.id);
  assert!(is_dense_ranking(&standings));

  // History is kept.
  let history = e.vendor_queue(vendor(2)).await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].status, QueueStatus::Removed);
}

#[tokio::test]
async fn leave_checks_owner_and_state() {
  let e = engine().await;
  let entry = e.enroll(vendor(1), slot(), t0()).await.unwrap();

  let err = e.leave(entry.id, vendor(2), t0()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Forbidden);
  let err = e.leave(Uuid::new_v4(), vendor(1), t0()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);

  e.leave(entry.id, vendor(1), t0()).await.unwrap();
  let err = e.leave(entry.id, vendor(1), t0()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidState);

  // A fresh entry may be created after leaving.
  let fresh = e.enroll(vendor(1), slot(), t0()).await.unwrap();
  assert_ne!(fresh.id, entry.id);
  assert_eq!(fresh.position, Some(1));
}

#[tokio::test]
async fn notified_vendor_may_leave() {
  let e = engine().await;
  let entry = e.enroll(vendor(1), slot(), t0()).await.unwrap();
  e.enroll(vendor(2), slot(), t0() + Duration::minutes(1)).await.unwrap();
  e.notify_on_free(slot(), t0()).await.unwrap();

  e.leave(entry.id, vendor(1), t0()).await.unwrap();
  let standings = e.slot_queue(slot()).await.unwrap();
  assert_eq!(positions(&standings), vec![(vendor(2), Some(1))]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_enrollments_keep_a_dense_ranking() {
  let e = Arc::new(engine().await);

  let mut tasks = Vec::new();
  for n in 0..24u128 {
    let e = e.clone();
    tasks.push(tokio::spawn(async move {
      let at = t0() + Duration::seconds(n as i64);
      e.enroll(vendor(n), slot(), at).await
    }));
  }
  for task in tasks {
    task.await.unwrap().unwrap();
  }

  let standings = e.slot_queue(slot()).await.unwrap();
  assert_eq!(standings.len(), 24);
  assert!(is_dense_ranking(&standings));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_enroll_and_leave_keep_a_dense_ranking() {
  let e = Arc::new(engine().await);
  let mut first = Vec::new();
  for n in 0..12u128 {
    first.push(e.enroll(vendor(n), slot(), t0() + Duration::seconds(n as i64)).await.unwrap());
  }

  let mut tasks = Vec::new();
  for (n, entry) in first.into_iter().enumerate().filter(|(n, _)| n % 2 == 0) {
    let leaver = e.clone();
    tasks.push(tokio::spawn(async move {
      leaver.leave(entry.id, entry.vendor_id, t0() + Duration::hours(1)).await.map(|_| ())
    }));
    let joiner = e.clone();
    tasks.push(tokio::spawn(async move {
      let v = vendor(100 + n as u128);
      joiner.enroll(v, slot(), t0() + Duration::hours(1)).await.map(|_| ())
    }));
  }
  for task in tasks {
    task.await.unwrap().unwrap();
  }

  let standings = e.slot_queue(slot()).await.unwrap();
  assert_eq!(standings.len(), 12);
  assert!(is_dense_ranking(&standings));
}

#[tokio::test]
async fn enroll_retries_when_the_conflicting_entry_vanishes() {
  let e = faulty_engine(FaultyStore::new().await);
  e.store().vanishing_inserts.store(1, Ordering::SeqCst);

  let entry = e.enroll(vendor(1), slot(), t0()).await.unwrap();
  assert_eq!(entry.status, QueueStatus::Active);
  assert_eq!(entry.position, Some(1));
  assert_eq!(e.slot_queue(slot()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn enroll_gives_up_after_repeated_vanishing_conflicts() {
  let e = faulty_engine(FaultyStore::new().await);
  e.store().vanishing_inserts.store(u32::MAX, Ordering::SeqCst);

  let err = e.enroll(vendor(1), slot(), t0()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);
  assert!(e.slot_queue(slot()).await.unwrap().is_empty());
}

// ─── Sweeper ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn lapsed_hold_expires_and_frees_slot_for_the_queue() {
  // Scenario A.
  let e = engine().await;
  let hold = e.create_reservation(vendor(1), request(slot(), Some(1)), t0()).await.unwrap();
  let waiting = e.enroll(vendor(2), slot(), t0()).await.unwrap();
  assert_eq!(waiting.position, Some(1));
  e.dispatcher().take();

  let now = t0() + Duration::minutes(61);
  let report = e.sweep(now).await.unwrap();
  assert_eq!(report.expired, vec![hold.id]);
  assert_eq!(report.notified.len(), 1);
  assert_eq!(report.notified[0].id, waiting.id);

  let hold = e.get_reservation(hold.id).await.unwrap();
  assert_eq!(hold.status, ReservationStatus::Expired);
  assert_eq!(hold.resolved_at, Some(now));
  assert_eq!(e.get_queue_entry(waiting.id).await.unwrap().status, QueueStatus::Notified);

  assert_eq!(e.dispatcher().take(), vec![EngineEvent::SlotAvailable {
    vendor_id: vendor(2),
    entry_id:  waiting.id,
    slot:      slot(),
  }]);
}

#[tokio::test]
async fn sweep_buckets_reminders_without_touching_state() {
  let e = engine().await;
  let in_2h = e.create_reservation(vendor(1), request(slot_in(1), Some(2)), t0()).await.unwrap();
  let in_12h = e.create_reservation(vendor(1), request(slot_in(2), Some(12)), t0()).await.unwrap();
  let in_24h = e.create_reservation(vendor(1), request(slot_in(3), Some(24)), t0()).await.unwrap();
  let in_48h = e.create_reservation(vendor(1), request(slot_in(4), Some(48)), t0()).await.unwrap();
  e.dispatcher().take();

  let report = e.sweep(t0()).await.unwrap();
  assert_eq!(report.expired_count(), 0);
  assert_eq!(report.reminders.tier_2h, vec![in_2h.id]);
  assert_eq!(report.reminders.tier_12h, vec![in_12h.id]);
  assert_eq!(report.reminders.tier_24h, vec![in_24h.id]);

  let events = e.dispatcher().take();
  assert_eq!(events.len(), 3);
  assert!(events.contains(&EngineEvent::Reminder {
    reservation_id: in_2h.id,
    vendor_id:      vendor(1),
    tier:           ReminderTier::Hours2,
    expires_at:     in_2h.expires_at,
  }));

  for r in [&in_2h, &in_12h, &in_24h, &in_48h] {
    assert_eq!(e.get_reservation(r.id).await.unwrap().status, ReservationStatus::Active);
  }

  // Reminders repeat on the next pass.
  let again = e.sweep(t0() + Duration::minutes(5)).await.unwrap();
  assert_eq!(again.reminders.len(), 3);
}

#[tokio::test]
async fn second_sweep_finds_nothing_to_expire() {
  let e = engine().await;
  e.create_reservation(vendor(1), request(slot_in(1), Some(1)), t0()).await.unwrap();
  e.create_reservation(vendor(2), request(slot_in(1), Some(1)), t0()).await.unwrap();
  e.enroll(vendor(3), slot_in(1), t0()).await.unwrap();
  e.enroll(vendor(4), slot_in(1), t0()).await.unwrap();

  let later = t0() + Duration::hours(2);
  let report = e.sweep(later).await.unwrap();
  assert_eq!(report.expired_count(), 2);
  // Both holds shared a slot, so it is offered once.
  assert_eq!(report.notified.len(), 1);

  let again = e.sweep(later).await.unwrap();
  assert_eq!(again, SweepReport::default());
}

#[tokio::test]
async fn failed_notification_does_not_stop_the_sweep() {
  let e = faulty_engine(FaultyStore::new().await);
  let mut waiting = Vec::new();
  for n in 1..=2u128 {
    e.create_reservation(vendor(1), request(slot_in(n), Some(1)), t0()).await.unwrap();
    waiting.push(e.enroll(vendor(1 + n), slot_in(n), t0()).await.unwrap());
  }
  e.store().failing_notifies.store(1, Ordering::SeqCst);

  let later = t0() + Duration::hours(2);
  let report = e.sweep(later).await.unwrap();
  assert_eq!(report.expired_count(), 2);
  assert_eq!(report.notified.len(), 1);
  assert_eq!(report.notify_failed.len(), 1);
  let failed = report.notify_failed[0];
  assert_ne!(report.notified[0].slot, failed);
  assert_eq!(e.store().pending_notifications().await.unwrap(), vec![failed]);

  // Nothing left to expire, but the skipped slot is offered now.
  let again = e.sweep(later + Duration::minutes(5)).await.unwrap();
  assert!(again.expired.is_empty());
  assert!(again.notify_failed.is_empty());
  assert_eq!(again.notified.len(), 1);
  assert_eq!(again.notified[0].slot, failed);

  for entry in &waiting {
    assert_eq!(e.get_queue_entry(entry.id).await.unwrap().status, QueueStatus::Notified);
  }
  assert!(e.store().pending_notifications().await.unwrap().is_empty());
}

#[tokio::test]
async fn expiry_with_an_empty_queue_leaves_nothing_pending() {
  let e = engine().await;
  e.create_reservation(vendor(1), request(slot(), Some(1)), t0()).await.unwrap();

  let report = e.sweep(t0() + Duration::hours(2)).await.unwrap();
  assert_eq!(report.expired_count(), 1);
  assert!(report.notified.is_empty());
  assert!(e.store().pending_notifications().await.unwrap().is_empty());
}

// ─── Properties ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
  Create { vendor: u8, slot: u8, hours: u32 },
  Release { vendor: u8, slot: u8 },
  Enroll { vendor: u8, slot: u8 },
  Leave { vendor: u8, slot: u8 },
  Sweep { advance_minutes: i64 },
}

fn arb_op() -> impl Strategy<Value = Op> {
  prop_oneof![
    (0u8..4, 0u8..2, 1u32..6).prop_map(|(vendor, slot, hours)| Op::Create { vendor, slot, hours }),
    (0u8..4, 0u8..2).prop_map(|(vendor, slot)| Op::Release { vendor, slot }),
    (0u8..4, 0u8..2).prop_map(|(vendor, slot)| Op::Enroll { vendor, slot }),
    (0u8..4, 0u8..2).prop_map(|(vendor, slot)| Op::Leave { vendor, slot }),
    (0i64..240).prop_map(|advance_minutes| Op::Sweep { advance_minutes }),
  ]
}

async fn apply_op(e: &TestEngine, op: Op, now: &mut DateTime<Utc>) -> Result<(), TestCaseError> {
  let as_vendor = |n: u8| vendor(u128::from(n));
  let as_slot = |n: u8| slot_in(u128::from(n) + 1);
  let outcome = match op {
    Op::Create { vendor, slot, hours } => e
      .create_reservation(as_vendor(vendor), request(as_slot(slot), Some(hours)), *now)
      .await
      .map(|_| ()),
    Op::Release { vendor, slot } => {
      let held = e
        .list_reservations(ReservationQuery {
          vendor_id: Some(as_vendor(vendor)),
          slot: Some(as_slot(slot)),
          status: Some(ReservationStatus::Active),
          limit: None,
        })
        .await
        .map_err(|err| TestCaseError::fail(err.to_string()))?;
      match held.first() {
        Some(r) => e.release_reservation(r.id, r.vendor_id, *now).await.map(|_| ()),
        None => Ok(()),
      }
    }
    Op::Enroll { vendor, slot } => e.enroll(as_vendor(vendor), as_slot(slot), *now).await.map(|_| ()),
    Op::Leave { vendor, slot } => {
      let mine = e
        .vendor_queue(as_vendor(vendor))
        .await
        .map_err(|err| TestCaseError::fail(err.to_string()))?;
      match mine.iter().find(|q| q.slot == as_slot(slot) && q.status.is_live()) {
        Some(q) => e.leave(q.id, q.vendor_id, *now).await.map(|_| ()),
        None => Ok(()),
      }
    }
    Op::Sweep { advance_minutes } => {
      *now += Duration::minutes(advance_minutes);
      e.sweep(*now).await.map(|_| ())
    }
  };
  match outcome {
    Ok(()) => Ok(()),
    // Expected refusals, e.g. a duplicate hold.
    Err(err) if err.kind() != ErrorKind::StoreUnavailable => Ok(()),
    Err(err) => Err(TestCaseError::fail(err.to_string())),
  }
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(32))]

  #[test]
  fn invariants_hold_over_random_operations(ops in prop::collection::vec(arb_op(), 1..30)) {
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    rt.block_on(async {
      let e = engine().await;
      let mut now = t0();
      let mut expired_seen: Vec<Uuid> = Vec::new();

      for op in ops {
        apply_op(&e, op, &mut now).await?;

        for s in 1..=2u128 {
          let standings = e.slot_queue(slot_in(s)).await.unwrap();
          prop_assert!(is_dense_ranking(&standings), "gap or disorder in {:?}", standings);
          let mut owners: Vec<_> = standings.iter().map(|q| q.vendor_id).collect();
          owners.sort();
          owners.dedup();
          prop_assert_eq!(owners.len(), standings.len());
        }

        let all = e.list_reservations(ReservationQuery::default()).await.unwrap();
        let mut active: Vec<_> = all
          .iter()
          .filter(|r| r.status == ReservationStatus::Active)
          .map(|r| (r.vendor_id, r.slot))
          .collect();
        let active_count = active.len();
        active.sort();
        active.dedup();
        prop_assert_eq!(active.len(), active_count);

        for id in &expired_seen {
          let r = all.iter().find(|r| r.id == *id).unwrap();
          prop_assert_eq!(r.status, ReservationStatus::Expired);
        }
        expired_seen = all
          .iter()
          .filter(|r| r.status == ReservationStatus::Expired)
          .map(|r| r.id)
          .collect();
      }

      // A final sweep leaves no lapsed hold active.
      e.sweep(now).await.unwrap();
      let lapsed_active = e
        .list_reservations(ReservationQuery {
          status: Some(ReservationStatus::Active),
          ..Default::default()
        })
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.expires_at <= now)
        .count();
      prop_assert_eq!(lapsed_active, 0);
      Ok(())
    })?;
  }
}
