//! Temporary reservation operations: create, convert, release, cancel.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;
use venuehold_core::{
  dispatch::Dispatcher,
  error::{Error, Result, TransitionError},
  event::EngineEvent,
  reservation::{
    ConversionRecord, NewReservation, ReservationAction, ReservationStatus, TemporaryReservation,
  },
  store::{HoldStore, ReservationQuery, ReservationTransition},
};

use crate::Engine;

impl<S, D> Engine<S, D>
where
  S: HoldStore,
  D: Dispatcher,
{
  // ── Reads ───────────────────────────────────────────────────────────────

  pub async fn get_reservation(&self, id: Uuid) -> Result<TemporaryReservation> {
    self
      .store
      .get_reservation(id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::ReservationNotFound(id))
  }

  pub async fn list_reservations(
    &self,
    query: ReservationQuery,
  ) -> Result<Vec<TemporaryReservation>> {
    self.store.list_reservations(query).await.map_err(Error::store)
  }

  // ── Create ──────────────────────────────────────────────────────────────

  /// Place a hold for `vendor_id` on `input.slot`, expiring after the
  /// requested (or default) number of hours.
  pub async fn create_reservation(
    &self,
    vendor_id: Uuid,
    input: NewReservation,
    now: DateTime<Utc>,
  ) -> Result<TemporaryReservation> {
    let slot = input.slot.canonical();
    slot.validate()?;
    let hours = self.hold_hours(input.hold_duration_hours)?;

    let _guard = self.locks.acquire(slot).await;

    let existing = self
      .store
      .list_reservations(ReservationQuery {
        vendor_id: Some(vendor_id),
        slot:      Some(slot),
        status:    Some(ReservationStatus::Active),
        limit:     Some(1),
      })
      .await
      .map_err(Error::store)?;
    if !existing.is_empty() {
      return Err(Error::DuplicateHold { vendor_id, slot });
    }

    let booked = self.store.overlapping_bookings(slot).await.map_err(Error::store)?;
    if let Some(booking) = booked.first() {
      return Err(Error::SlotBooked { slot, booking_id: booking.booking_id });
    }

    let reservation = TemporaryReservation {
      id: Uuid::new_v4(),
      client_id: input.client_id,
      vendor_id,
      slot,
      estimated_value: input.estimated_value,
      observations: input.observations,
      status: ReservationStatus::Active,
      expires_at: now + Duration::hours(i64::from(hours)),
      created_at: now,
      resolved_at: None,
      converted_proposal_id: None,
      conversion_time_hours: None,
    };

    // The unique index catches a duplicate written by another process.
    if !self.store.insert_reservation(reservation.clone()).await.map_err(Error::store)? {
      return Err(Error::DuplicateHold { vendor_id, slot });
    }

    info!(
      reservation_id = %reservation.id,
      %vendor_id,
      %slot,
      expires_at = %reservation.expires_at,
      "reservation created"
    );
    self.emit(EngineEvent::ReservationCreated {
      reservation_id: reservation.id,
      vendor_id,
      client_id: reservation.client_id,
      slot,
      expires_at: reservation.expires_at,
    });

    Ok(reservation)
  }

  fn hold_hours(&self, requested: Option<u32>) -> Result<u32> {
    let hours = requested.unwrap_or(self.config.default_hold_hours);
    if hours == 0 {
      return Err(Error::InvalidInput("hold duration must be at least one hour".into()));
    }
    if hours > self.config.max_hold_hours {
      return Err(Error::InvalidInput(format!(
        "hold duration of {hours}h exceeds the {}h maximum",
        self.config.max_hold_hours
      )));
    }
    Ok(hours)
  }

  // ── Convert ─────────────────────────────────────────────────────────────

  /// Turn an active hold into proposal `proposal_id`.
  ///
  /// A hold whose deadline has passed is reported as [`Error::Expired`]
  /// whether or not the sweeper has flipped it yet. The record itself is left
  /// for the sweeper to expire.
  pub async fn convert_reservation(
    &self,
    id: Uuid,
    vendor_id: Uuid,
    proposal_id: String,
    now: DateTime<Utc>,
  ) -> Result<TemporaryReservation> {
    if proposal_id.trim().is_empty() {
      return Err(Error::InvalidInput("proposal id must not be empty".into()));
    }

    let mut reservation = self.owned_reservation(id, vendor_id).await?;
    if reservation.status == ReservationStatus::Expired {
      return Err(Error::Expired { id, expires_at: reservation.expires_at });
    }
    let to = reservation.status.apply(ReservationAction::Convert)?;
    if reservation.is_past_deadline(now) {
      return Err(Error::Expired { id, expires_at: reservation.expires_at });
    }

    let hours = (now - reservation.created_at).num_milliseconds() as f64 / 3_600_000.0;
    let record = ConversionRecord {
      conversion_id: Uuid::new_v4(),
      reservation_id: id,
      proposal_id: proposal_id.clone(),
      vendor_id,
      converted_at: now,
      conversion_time_hours: hours,
    };
    self
      .transition(&reservation, ReservationAction::Convert, ReservationTransition {
        id,
        to,
        at: now,
        conversion: Some(record),
        frees_slot: false,
      })
      .await?;

    info!(
      reservation_id = %id,
      %vendor_id,
      %proposal_id,
      conversion_time_hours = hours,
      "reservation converted"
    );
    reservation.status = to;
    reservation.resolved_at = Some(now);
    reservation.converted_proposal_id = Some(proposal_id);
    reservation.conversion_time_hours = Some(hours);
    Ok(reservation)
  }

  // ── Release / cancel ────────────────────────────────────────────────────

  /// Give a hold up and offer the slot to the top of its waiting queue.
  ///
  /// The release and the slot's pending notification commit together. If
  /// the queue cannot be consulted right away the release still succeeds and
  /// the next [`Engine::sweep`] retries the notification.
  pub async fn release_reservation(
    &self,
    id: Uuid,
    vendor_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<TemporaryReservation> {
    let reservation = self.give_up(id, vendor_id, ReservationAction::Release, now).await?;
    info!(reservation_id = %id, %vendor_id, slot = %reservation.slot, "reservation released");

    if let Err(e) = self.notify_on_free(reservation.slot, now).await {
      warn!(
        reservation_id = %id,
        slot = %reservation.slot,
        error = %e,
        "queue notification deferred to the next sweep"
      );
    }
    Ok(reservation)
  }

  /// Withdraw a hold entered by mistake. The waiting queue is not told.
  pub async fn cancel_reservation(
    &self,
    id: Uuid,
    vendor_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<TemporaryReservation> {
    let reservation = self.give_up(id, vendor_id, ReservationAction::Cancel, now).await?;
    info!(reservation_id = %id, %vendor_id, slot = %reservation.slot, "reservation cancelled");
    Ok(reservation)
  }

  async fn give_up(
    &self,
    id: Uuid,
    vendor_id: Uuid,
    action: ReservationAction,
    now: DateTime<Utc>,
  ) -> Result<TemporaryReservation> {
    let mut reservation = self.owned_reservation(id, vendor_id).await?;
    let to = reservation.status.apply(action)?;
    self
      .transition(&reservation, action, ReservationTransition {
        id,
        to,
        at: now,
        conversion: None,
        frees_slot: action == ReservationAction::Release,
      })
      .await?;

    reservation.status = to;
    reservation.resolved_at = Some(now);
    Ok(reservation)
  }

  // ── Helpers ─────────────────────────────────────────────────────────────

  async fn owned_reservation(&self, id: Uuid, vendor_id: Uuid) -> Result<TemporaryReservation> {
    let reservation = self.get_reservation(id).await?;
    if !reservation.is_owned_by(vendor_id) {
      return Err(Error::Forbidden { id, vendor_id });
    }
    Ok(reservation)
  }

  /// Apply a transition already validated against `current`. If the store
  /// reports the row moved on in the meantime, re-read it and explain why.
  async fn transition(
    &self,
    current: &TemporaryReservation,
    action: ReservationAction,
    transition: ReservationTransition,
  ) -> Result<()> {
    if self.store.transition_reservation(transition).await.map_err(Error::store)? {
      return Ok(());
    }

    let latest = self.get_reservation(current.id).await?;
    debug!(
      reservation_id = %current.id,
      status = %latest.status,
      "reservation changed before transition applied"
    );
    if latest.status == ReservationStatus::Expired {
      return Err(Error::Expired { id: latest.id, expires_at: latest.expires_at });
    }
    Err(
      TransitionError {
        entity: "reservation",
        from:   latest.status.into(),
        action: action.into(),
      }
      .into(),
    )
  }
}
