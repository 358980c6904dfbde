//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use treebeard_core::ErrorKind;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Core(#[from] treebeard_core::Error),
}

impl ApiError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      ApiError::Core(e) => e.kind(),
    }
  }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
  match kind {
    ErrorKind::Validation => StatusCode::BAD_REQUEST,
    ErrorKind::CapacityExceeded => StatusCode::CONFLICT,
    ErrorKind::NotFound => StatusCode::NOT_FOUND,
    ErrorKind::Forbidden => StatusCode::FORBIDDEN,
    ErrorKind::TransientStore => StatusCode::SERVICE_UNAVAILABLE,
    ErrorKind::Collaborator => StatusCode::BAD_GATEWAY,
    ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let kind = self.kind();
    let status = status_for(kind);
    let message = self.to_string();
    if status.is_server_error() {
      tracing::error!(status = kind.as_str(), error = %message, "request failed");
    } else {
      tracing::debug!(status = kind.as_str(), error = %message, "request rejected");
    }
    (status, Json(json!({ "status": kind.as_str(), "error": message }))).into_response()
  }
}
