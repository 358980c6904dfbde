//! Handlers for `/conversations` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/conversations` | Optional `?dashboard_id=`; `{"conversations":[…]}`, saved only, newest first |
//! | `GET`    | `/conversations/{id}` | 404 if not saved |
//! | `PUT`    | `/conversations/{id}` | Body: `{"dashboard_id":"lucius","messages":[…]}` |
//! | `PATCH`  | `/conversations/{id}/name` | Body: `{"name":"…"}` |
//! | `DELETE` | `/conversations/{id}` | Cascades to uploads; idempotent |

use axum::{
  Extension, Json,
  extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use treebeard_core::{
  conversation::{Conversation, ConversationSummary},
  external::Collaborators,
  message::Message,
  oracle::home::HOME_ID,
  service::{DeleteOutcome, RenameOutcome, SaveOutcome},
  store::BlobStore,
  user::User,
};

use crate::{Service, error::ApiError};

fn home() -> String { HOME_ID.to_string() }

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  #[serde(default = "home")]
  pub dashboard_id: String,
}

#[derive(Debug, Serialize)]
pub struct ConversationList {
  pub conversations: Vec<ConversationSummary>,
}

/// `GET /conversations[?dashboard_id=<id>]`
pub async fn list<S, X>(
  State(service): State<Service<S, X>>,
  Extension(user): Extension<User>,
  Query(params): Query<ListParams>,
) -> Result<Json<ConversationList>, ApiError>
where
  S: BlobStore + 'static,
  X: Collaborators + 'static,
{
  let conversations = service.list_conversations(&user, &params.dashboard_id).await?;
  Ok(Json(ConversationList { conversations }))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /conversations/{id}`
pub async fn get_one<S, X>(
  State(service): State<Service<S, X>>,
  Extension(user): Extension<User>,
  Path(id): Path<String>,
) -> Result<Json<Conversation>, ApiError>
where
  S: BlobStore + 'static,
  X: Collaborators + 'static,
{
  Ok(Json(service.get_conversation(&user, &id).await?))
}

// ─── Save ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SaveBody {
  #[serde(default = "home")]
  pub dashboard_id: String,
  pub messages:     Vec<Message>,
}

/// `PUT /conversations/{id}`
pub async fn save<S, X>(
  State(service): State<Service<S, X>>,
  Extension(user): Extension<User>,
  Path(id): Path<String>,
  Json(body): Json<SaveBody>,
) -> Result<Json<SaveOutcome>, ApiError>
where
  S: BlobStore + 'static,
  X: Collaborators + 'static,
{
  let outcome = service
    .save_conversation(&user, &body.dashboard_id, &id, body.messages)
    .await?;
  Ok(Json(outcome))
}

// ─── Rename ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RenameBody {
  pub name: String,
}

/// `PATCH /conversations/{id}/name`
pub async fn rename<S, X>(
  State(service): State<Service<S, X>>,
  Extension(user): Extension<User>,
  Path(id): Path<String>,
  Json(body): Json<RenameBody>,
) -> Result<Json<RenameOutcome>, ApiError>
where
  S: BlobStore + 'static,
  X: Collaborators + 'static,
{
  Ok(Json(service.update_conversation_name(&user, &id, &body.name).await?))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /conversations/{id}`
pub async fn delete_one<S, X>(
  State(service): State<Service<S, X>>,
  Extension(user): Extension<User>,
  Path(id): Path<String>,
) -> Result<Json<DeleteOutcome>, ApiError>
where
  S: BlobStore + 'static,
  X: Collaborators + 'static,
{
  Ok(Json(service.delete_conversation(&user, &id).await?))
}
