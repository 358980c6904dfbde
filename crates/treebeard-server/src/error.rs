//! Error types and axum `IntoResponse` implementation for server-only routes.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use treebeard_api::ApiError;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unauthorized")]
  Unauthorized,
  #[error("forbidden: {0}")]
  Forbidden(String),
  #[error("payload exceeds {limit} bytes")]
  PayloadTooLarge { limit: u64 },
  #[error(transparent)]
  Core(#[from] treebeard_core::Error),
}

fn body(status: &str, message: impl Into<String>) -> Json<serde_json::Value> {
  Json(json!({ "status": status, "error": message.into() }))
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    match self {
      Error::Unauthorized => {
        let mut res =
          (StatusCode::UNAUTHORIZED, body("unauthorized", "authentication required"))
            .into_response();
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Basic realm=\"treebeard\""),
        );
        res
      }
      Error::Forbidden(msg) => (StatusCode::FORBIDDEN, body("forbidden", msg)).into_response(),
      e @ Error::PayloadTooLarge { .. } => {
        (StatusCode::PAYLOAD_TOO_LARGE, body("payload_too_large", e.to_string())).into_response()
      }
      Error::Core(e) => ApiError::from(e).into_response(),
    }
  }
}
