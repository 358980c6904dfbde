//! Handlers for `/chat` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/chat` | One LLM turn; body is a [`ChatRequest`] |
//! | `POST` | `/chat/invisible` | Append a system note; no LLM call |

use axum::{Extension, Json, extract::State};
use treebeard_core::{
  external::Collaborators,
  service::{ChatRequest, ChatResponse, InvisibleMessageRequest, InvisibleMessageResponse},
  store::BlobStore,
  user::User,
};

use crate::{Service, error::ApiError};

/// `POST /chat`
pub async fn send<S, X>(
  State(service): State<Service<S, X>>,
  Extension(user): Extension<User>,
  Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError>
where
  S: BlobStore + 'static,
  X: Collaborators + 'static,
{
  Ok(Json(service.chat(&user, body).await?))
}

/// `POST /chat/invisible`
pub async fn send_invisible<S, X>(
  State(service): State<Service<S, X>>,
  Extension(user): Extension<User>,
  Json(body): Json<InvisibleMessageRequest>,
) -> Result<Json<InvisibleMessageResponse>, ApiError>
where
  S: BlobStore + 'static,
  X: Collaborators + 'static,
{
  Ok(Json(service.send_invisible_message(&user, body).await?))
}
