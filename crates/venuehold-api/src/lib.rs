//! JSON REST API for venuehold.
//!
//! Exposes an axum [`Router`] backed by a [`venuehold_engine::Engine`].
//! Authentication is the caller's responsibility: handlers trust the
//! `vendor_id` carried in the request.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", venuehold_api::api_router(engine.clone()))
//! ```

pub mod error;
pub mod queue;
pub mod reservations;
pub mod sweep;


use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use venuehold_core::{dispatch::Dispatcher, store::HoldStore};
use venuehold_engine::Engine;

pub use error::ApiError;

/// Shared handler state.
pub type SharedEngine<S, D> = Arc<Engine<S, D>>;

/// Build the API router for `engine`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, D>(engine: SharedEngine<S, D>) -> Router<()>
where
  S: HoldStore + 'static,
  D: Dispatcher + 'static,
{
  Router::new()
    // Reservations
    .route(
      "/reservations",
      get(reservations::list::<S, D>).post(reservations::create::<S, D>),
    )
    .route("/reservations/{id}", get(reservations::get_one::<S, D>))
    .route("/reservations/{id}/convert", post(reservations::convert::<S, D>))
    .route("/reservations/{id}/release", post(reservations::release::<S, D>))
    .route("/reservations/{id}/cancel", post(reservations::cancel::<S, D>))
    // Waiting queue
    .route("/queue", get(queue::standings::<S, D>).post(queue::enroll::<S, D>))
    .route("/queue/{id}", get(queue::get_one::<S, D>))
    .route("/queue/{id}/leave", post(queue::leave::<S, D>))
    .route("/vendors/{id}/queue", get(queue::vendor_entries::<S, D>))
    // Sweeps
    .route("/sweep", post(sweep::run::<S, D>))
    .with_state(engine)
}
