//! Handlers for `/reservations` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/reservations` | Optional `?vendor_id`, `status`, `limit` |
//! | `POST` | `/reservations` | Body: [`CreateBody`]; returns 201 + hold |
//! | `GET`  | `/reservations/:id` | 404 if not found |
//! | `POST` | `/reservations/:id/convert` | Body: `{"vendor_id":..,"proposal_id":..}` |
//! | `POST` | `/reservations/:id/release` | Body: `{"vendor_id":..}`; notifies the queue |
//! | `POST` | `/reservations/:id/cancel` | Body: `{"vendor_id":..}` |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use venuehold_core::{
  dispatch::Dispatcher,
  reservation::{NewReservation, ReservationStatus, TemporaryReservation},
  store::{HoldStore, ReservationQuery},
};

use crate::{SharedEngine, error::{ApiError, JsonBody}};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub vendor_id: Option<Uuid>,
  pub status:    Option<ReservationStatus>,
  pub limit:     Option<usize>,
}

/// `GET /reservations[?vendor_id=..][&status=..][&limit=..]`
pub async fn list<S, D>(
  State(engine): State<SharedEngine<S, D>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<TemporaryReservation>>, ApiError>
where
  S: HoldStore,
  D: Dispatcher,
{
  let holds = engine
    .list_reservations(ReservationQuery {
      vendor_id: params.vendor_id,
      slot:      None,
      status:    params.status,
      limit:     params.limit,
    })
    .await?;
  Ok(Json(holds))
}

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub vendor_id:   Uuid,
  #[serde(flatten)]
  pub reservation: NewReservation,
}

/// `POST /reservations`
pub async fn create<S, D>(
  State(engine): State<SharedEngine<S, D>>,
  JsonBody(body): JsonBody<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: HoldStore,
  D: Dispatcher,
{
  let hold = engine
    .create_reservation(body.vendor_id, body.reservation, Utc::now())
    .await?;
  Ok((StatusCode::CREATED, Json(hold)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /reservations/:id`
pub async fn get_one<S, D>(
  State(engine): State<SharedEngine<S, D>>,
  Path(id): Path<Uuid>,
) -> Result<Json<TemporaryReservation>, ApiError>
where
  S: HoldStore,
  D: Dispatcher,
{
  Ok(Json(engine.get_reservation(id).await?))
}

// ─── Transitions ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ConvertBody {
  pub vendor_id:   Uuid,
  pub proposal_id: String,
}

/// `POST /reservations/:id/convert`
pub async fn convert<S, D>(
  State(engine): State<SharedEngine<S, D>>,
  Path(id): Path<Uuid>,
  JsonBody(body): JsonBody<ConvertBody>,
) -> Result<Json<TemporaryReservation>, ApiError>
where
  S: HoldStore,
  D: Dispatcher,
{
  let hold = engine
    .convert_reservation(id, body.vendor_id, body.proposal_id, Utc::now())
    .await?;
  Ok(Json(hold))
}

/// Body shared by endpoints that only need the acting vendor.
#[derive(Debug, Deserialize)]
pub struct ActorBody {
  pub vendor_id: Uuid,
}

/// `POST /reservations/:id/release`
pub async fn release<S, D>(
  State(engine): State<SharedEngine<S, D>>,
  Path(id): Path<Uuid>,
  JsonBody(body): JsonBody<ActorBody>,
) -> Result<Json<TemporaryReservation>, ApiError>
where
  S: HoldStore,
  D: Dispatcher,
{
  let hold = engine.release_reservation(id, body.vendor_id, Utc::now()).await?;
  Ok(Json(hold))
}

/// `POST /reservations/:id/cancel`
pub async fn cancel<S, D>(
  State(engine): State<SharedEngine<S, D>>,
  Path(id): Path<Uuid>,
  JsonBody(body): JsonBody<ActorBody>,
) -> Result<Json<TemporaryReservation>, ApiError>
where
  S: HoldStore,
  D: Dispatcher,
{
  let hold = engine.cancel_reservation(id, body.vendor_id, Utc::now()).await?;
  Ok(Json(hold))
}
