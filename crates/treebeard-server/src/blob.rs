//! Store-side upload receiver.
//!
//! Clients `PUT` file bytes to the URL from an upload descriptor, carrying
//! the descriptor's `policy` and `signature` fields as query parameters. The
//! policy names the only key it may be used for, its expiry, and its size
//! ceiling.

use axum::{
  Json,
  body::Body,
  extract::{Path, Query, State},
  http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;
use treebeard_core::{external::Collaborators, store::BlobStore};

use crate::{AppState, error::Error};

#[derive(Deserialize)]
pub struct PolicyQuery {
  policy:    String,
  signature: String,
}

pub async fn receive<S, X>(
  State(state): State<AppState<S, X>>,
  Path(key): Path<String>,
  Query(query): Query<PolicyQuery>,
  body: Body,
) -> Result<(StatusCode, Json<Value>), Error>
where
  S: BlobStore + 'static,
  X: Collaborators + 'static,
{
  let policy = state.service.signer().verify(&query.policy, &query.signature)?;
  if policy.is_expired(Utc::now()) {
    return Err(Error::Forbidden("upload policy has expired".into()));
  }
  if policy.key != key {
    return Err(Error::Forbidden(format!("policy does not cover {key}")));
  }

  let limit = policy.max_bytes;
  let bytes = axum::body::to_bytes(body, usize::try_from(limit).unwrap_or(usize::MAX))
    .await
    .map_err(|_| Error::PayloadTooLarge { limit })?;

  let info = state
    .service
    .store()
    .put(&key, bytes)
    .await
    .map_err(treebeard_core::Error::store)?;

  info!(key = %info.key, size = info.size, conversation_id = %policy.conversation_id, "upload received");
  Ok((StatusCode::CREATED, Json(json!({ "key": info.key, "size": info.size }))))
}
