//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  extract::{FromRequest, rejection::JsonRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use venuehold_core::ErrorKind;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Engine(#[from] venuehold_core::Error),

  #[error("bad request: {0}")]
  BadRequest(String),
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self {
    ApiError::BadRequest(rejection.body_text())
  }
}

/// `Json` extractor whose rejections render as [`ApiError::BadRequest`].
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

impl ApiError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      ApiError::Engine(e) => e.kind(),
      ApiError::BadRequest(_) => ErrorKind::InvalidInput,
    }
  }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
  match kind {
    ErrorKind::NotFound => StatusCode::NOT_FOUND,
    ErrorKind::Conflict => StatusCode::CONFLICT,
    ErrorKind::Forbidden => StatusCode::FORBIDDEN,
    ErrorKind::InvalidState => StatusCode::UNPROCESSABLE_ENTITY,
    ErrorKind::Expired => StatusCode::GONE,
    ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
    ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let kind = self.kind();
    if kind == ErrorKind::StoreUnavailable {
      error!(error = %self, "store unavailable");
    }
    let body = json!({ "error": self.to_string(), "kind": kind });
    (status_for(kind), Json(body)).into_response()
  }
}
