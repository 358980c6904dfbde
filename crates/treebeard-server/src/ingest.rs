//! Dataset ingestion for the out-of-process refresh compute.
//!
//! `PUT /ingest/{dashboard_id}` with a bearer token replaces the dashboard's
//! committed dataset. The previous dataset stays readable until the new one
//! is written in full.

use axum::{
  Json,
  extract::{Path, State},
  http::{HeaderMap, header},
};
use chrono::Utc;
use serde_json::{Value, json};
use subtle::ConstantTimeEq;
use tracing::info;
use treebeard_core::{
  dataset::OracleDataset,
  external::Collaborators,
  keys,
  store::{self, BlobStore},
};

use crate::{AppState, error::Error};

fn bearer(headers: &HeaderMap) -> Option<&str> {
  headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(str::trim)
}

/// Compares without an early exit, so timing does not reveal how much of the
/// token matched.
fn token_matches(presented: Option<&str>, expected: &str) -> bool {
  presented.is_some_and(|token| bool::from(token.as_bytes().ct_eq(expected.as_bytes())))
}

pub async fn receive<S, X>(
  State(state): State<AppState<S, X>>,
  Path(dashboard_id): Path<String>,
  headers: HeaderMap,
  Json(payload): Json<Value>,
) -> Result<Json<Value>, Error>
where
  S: BlobStore + 'static,
  X: Collaborators + 'static,
{
  let expected = state.config.refresh.ingest_token.as_str();
  if expected.is_empty() {
    return Err(Error::Forbidden("ingestion is disabled".into()));
  }
  if !token_matches(bearer(&headers), expected) {
    return Err(Error::Forbidden("invalid ingest token".into()));
  }

  let oracle = state.service.registry().resolve(&dashboard_id)?;
  if oracle.is_self_aggregating() {
    return Err(
      treebeard_core::Error::Validation(format!("{} has no ingested dataset", oracle.id())).into(),
    );
  }

  let store = state.service.store().as_ref();
  let key = keys::dataset(oracle.id());
  let previous: Option<OracleDataset> = store::get_json(store, &key).await?;
  let dataset = OracleDataset::successor(oracle.id(), previous.as_ref(), payload, Utc::now());
  store::put_json(store, &key, &dataset).await?;

  info!(dashboard_id = %dataset.dashboard_id, updated_at = %dataset.updated_at, "dataset ingested");
  Ok(Json(json!({
    "dashboard_id": dataset.dashboard_id,
    "updated_at": dataset.updated_at,
  })))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tokens_must_match_exactly() {
    assert!(token_matches(Some("ingest-secret"), "ingest-secret"));
    assert!(!token_matches(Some("ingest-secre"), "ingest-secret"));
    assert!(!token_matches(Some("ingest-secret-and-more"), "ingest-secret"));
    assert!(!token_matches(Some(""), "ingest-secret"));
    assert!(!token_matches(None, "ingest-secret"));
  }
}
