//! Handlers for waiting-queue endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/queue` | Slot fields as query: `space_id`, `date_start`, `date_end`, `time_start`, `time_end` |
//! | `POST` | `/queue` | Body: `{"vendor_id":..,"slot":{..}}`; idempotent |
//! | `GET`  | `/queue/:id` | 404 if not found |
//! | `POST` | `/queue/:id/leave` | Body: `{"vendor_id":..}` |
//! | `GET`  | `/vendors/:id/queue` | Every entry the vendor created |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use venuehold_core::{
  dispatch::Dispatcher,
  queue::WaitingQueueEntry,
  slot::SlotKey,
  store::HoldStore,
};

use crate::{
  SharedEngine,
  error::{ApiError, JsonBody},
  reservations::ActorBody,
};

/// `GET /queue?space_id=..&date_start=..&date_end=..&time_start=..&time_end=..`
pub async fn standings<S, D>(
  State(engine): State<SharedEngine<S, D>>,
  Query(slot): Query<SlotKey>,
) -> Result<Json<Vec<WaitingQueueEntry>>, ApiError>
where
  S: HoldStore,
  D: Dispatcher,
{
  Ok(Json(engine.slot_queue(slot).await?))
}

#[derive(Debug, Deserialize)]
pub struct EnrollBody {
  pub vendor_id: Uuid,
  pub slot:      SlotKey,
}

/// `POST /queue`. Returns the entry with its current position.
pub async fn enroll<S, D>(
  State(engine): State<SharedEngine<S, D>>,
  JsonBody(body): JsonBody<EnrollBody>,
) -> Result<Json<WaitingQueueEntry>, ApiError>
where
  S: HoldStore,
  D: Dispatcher,
{
  let entry = engine.enroll(body.vendor_id, body.slot, Utc::now()).await?;
  Ok(Json(entry))
}

/// `GET /queue/:id`
pub async fn get_one<S, D>(
  State(engine): State<SharedEngine<S, D>>,
  Path(id): Path<Uuid>,
) -> Result<Json<WaitingQueueEntry>, ApiError>
where
  S: HoldStore,
  D: Dispatcher,
{
  Ok(Json(engine.get_queue_entry(id).await?))
}

/// `POST /queue/:id/leave`
pub async fn leave<S, D>(
  State(engine): State<SharedEngine<S, D>>,
  Path(id): Path<Uuid>,
  JsonBody(body): JsonBody<ActorBody>,
) -> Result<Json<WaitingQueueEntry>, ApiError>
where
  S: HoldStore,
  D: Dispatcher,
{
  Ok(Json(engine.leave(id, body.vendor_id, Utc::now()).await?))
}

/// `GET /vendors/:id/queue`
pub async fn vendor_entries<S, D>(
  State(engine): State<SharedEngine<S, D>>,
  Path(vendor_id): Path<Uuid>,
) -> Result<Json<Vec<WaitingQueueEntry>>, ApiError>
where
  S: HoldStore,
  D: Dispatcher,
{
  Ok(Json(engine.vendor_queue(vendor_id).await?))
}
