//! `POST /sweep`: run one expiration pass at server time.

use axum::{Json, extract::State};
use chrono::Utc;
use venuehold_core::{dispatch::Dispatcher, store::HoldStore};
use venuehold_engine::SweepReport;

use crate::{SharedEngine, error::ApiError};

pub async fn run<S, D>(
  State(engine): State<SharedEngine<S, D>>,
) -> Result<Json<SweepReport>, ApiError>
where
  S: HoldStore,
  D: Dispatcher,
{
  Ok(Json(engine.sweep(Utc::now()).await?))
}
