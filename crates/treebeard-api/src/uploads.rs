//! Handlers for upload endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/uploads` | Body: `{"filename":"q3.pdf","extension":".pdf","conversation_id":null}` |
//! | `GET`    | `/conversations/{id}/uploads` | Records, oldest first |
//! | `POST`   | `/conversations/{id}/uploads/{key}/finalize` | After the direct upload |
//! | `DELETE` | `/conversations/{id}/uploads/{key}` | Bare key or full object key |

use axum::{
  Extension, Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use treebeard_core::{
  external::Collaborators,
  service::{DeleteUploadOutcome, UploadUrlRequest},
  store::BlobStore,
  upload::Upload,
  user::User,
};

use crate::{Service, error::ApiError};

/// `POST /uploads`
pub async fn request_url<S, X>(
  State(service): State<Service<S, X>>,
  Extension(user): Extension<User>,
  Json(body): Json<UploadUrlRequest>,
) -> Result<impl IntoResponse, ApiError>
where
  S: BlobStore + 'static,
  X: Collaborators + 'static,
{
  let grant = service.get_upload_url(&user, body).await?;
  Ok((StatusCode::CREATED, Json(grant)))
}

/// `GET /conversations/{id}/uploads`
pub async fn list<S, X>(
  State(service): State<Service<S, X>>,
  Extension(user): Extension<User>,
  Path(id): Path<String>,
) -> Result<Json<Vec<Upload>>, ApiError>
where
  S: BlobStore + 'static,
  X: Collaborators + 'static,
{
  Ok(Json(service.list_uploads(&user, &id).await?))
}

/// `POST /conversations/{id}/uploads/{key}/finalize`
pub async fn finalize<S, X>(
  State(service): State<Service<S, X>>,
  Extension(user): Extension<User>,
  Path((id, key)): Path<(String, String)>,
) -> Result<Json<Upload>, ApiError>
where
  S: BlobStore + 'static,
  X: Collaborators + 'static,
{
  Ok(Json(service.finalize_upload(&user, &id, &key).await?))
}

/// `DELETE /conversations/{id}/uploads/{key}`
pub async fn delete_one<S, X>(
  State(service): State<Service<S, X>>,
  Extension(user): Extension<User>,
  Path((id, key)): Path<(String, String)>,
) -> Result<Json<DeleteUploadOutcome>, ApiError>
where
  S: BlobStore + 'static,
  X: Collaborators + 'static,
{
  Ok(Json(service.delete_upload(&user, &id, &key).await?))
}
