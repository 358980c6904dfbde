//! Handlers for `/dashboards` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/dashboards/{id}` | Last committed data; never waits on a refresh |
//! | `POST` | `/dashboards/{id}/refresh` | `202`; idempotent while a refresh is pending |

use axum::{
  Extension, Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use treebeard_core::{
  dataset::DashboardView, external::Collaborators, store::BlobStore, user::User,
};

use crate::{Service, error::ApiError};

/// `GET /dashboards/{id}`
pub async fn get_one<S, X>(
  State(service): State<Service<S, X>>,
  Extension(user): Extension<User>,
  Path(id): Path<String>,
) -> Result<Json<DashboardView>, ApiError>
where
  S: BlobStore + 'static,
  X: Collaborators + 'static,
{
  Ok(Json(service.get_dashboard(&user, &id).await?))
}

/// `POST /dashboards/{id}/refresh`
pub async fn refresh<S, X>(
  State(service): State<Service<S, X>>,
  Extension(user): Extension<User>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
  S: BlobStore + 'static,
  X: Collaborators + 'static,
{
  let accepted = service.refresh_dashboard(&user, &id).await?;
  Ok((StatusCode::ACCEPTED, Json(accepted)))
}
