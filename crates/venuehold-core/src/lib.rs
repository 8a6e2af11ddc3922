//! Core types and trait definitions for the venuehold reservation engine.
//!
//! This crate is deliberately free of HTTP and database dependencies. It
//! holds the value types, the reservation and queue state machines, the
//! outbound event vocabulary, and the two collaborator traits the engine is
//! written against: [`store::HoldStore`] and [`dispatch::Dispatcher`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod dispatch;
pub mod error;
pub mod event;
pub mod queue;
pub mod reservation;
pub mod score;
pub mod slot;
pub mod store;

pub use error::{Error, ErrorKind, Result};
