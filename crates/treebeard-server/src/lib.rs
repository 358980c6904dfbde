//! HTTP server for Treebeard.
//!
//! Mounts the JSON API behind authentication and adds the endpoints the
//! outside world talks to directly:
//!
//! | Method | Path                    | Who                                  |
//! |--------|-------------------------|--------------------------------------|
//! | GET    | `/healthz`              | load balancers                       |
//! | PUT    | `/blob/{*key}`          | browsers, with a signed upload policy |
//! | PUT    | `/ingest/{dashboard_id}`| the refresh compute, bearer token    |
//! | *      | `/api/...`              | authenticated users                  |

pub mod auth;
pub mod blob;
pub mod error;
pub mod ingest;
pub mod remote;
pub mod scheduler;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Json, Router,
  extract::DefaultBodyLimit,
  middleware,
  routing::{get, put},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use treebeard_api::Service;
use treebeard_core::{
  Settings,
  external::Collaborators,
  oracle::{ProxyConfig, standard_proxies},
  store::BlobStore,
};

use auth::{AuthConfig, Authenticator};
use remote::{AnalysisConfig, LlmConfig, RefreshConfig};

/// Largest dataset accepted by `/ingest`.
const INGEST_LIMIT: usize = 32 * 1024 * 1024;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `TREEBEARD_*` environment variables.
#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:        String,
  pub port:        u16,
  pub store_path:  PathBuf,
  /// `development` enables the configured dev user.
  pub environment: String,
  pub auth:        AuthConfig,
  pub llm:         LlmConfig,
  pub refresh:     RefreshConfig,
  pub analysis:    AnalysisConfig,
  /// Proxy dashboards. The home dashboard is always present.
  pub dashboards:  Vec<ProxyConfig>,
  pub settings:    Settings,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:        "127.0.0.1".to_string(),
      port:        8080,
      store_path:  PathBuf::from("~/.local/share/treebeard/treebeard.db"),
      environment: "production".to_string(),
      auth:        AuthConfig::default(),
      llm:         LlmConfig::default(),
      refresh:     RefreshConfig::default(),
      analysis:    AnalysisConfig::default(),
      dashboards:  standard_proxies(),
      settings:    Settings::default(),
    }
  }
}

impl ServerConfig {
  pub fn is_development(&self) -> bool {
    self.environment.eq_ignore_ascii_case("development")
  }
}

// ─── Application state ────────────────────────────────────────────────────────

pub struct AppState<S, X> {
  pub service: Service<S, X>,
  pub config:  Arc<ServerConfig>,
  pub auth:    Arc<Authenticator>,
}

impl<S, X> Clone for AppState<S, X> {
  fn clone(&self) -> Self {
    Self {
      service: self.service.clone(),
      config:  self.config.clone(),
      auth:    self.auth.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

pub fn router<S, X>(state: AppState<S, X>) -> Router
where
  S: BlobStore + 'static,
  X: Collaborators + 'static,
{
  let api = treebeard_api::api_router(state.service.clone())
    .layer(middleware::from_fn_with_state(state.auth.clone(), auth::require_user));

  Router::new()
    .route("/healthz", get(healthz))
    .route("/blob/{*key}", put(blob::receive::<S, X>))
    .route(
      "/ingest/{dashboard_id}",
      put(ingest::receive::<S, X>).layer(DefaultBodyLimit::max(INGEST_LIMIT)),
    )
    .with_state(state)
    .nest("/api", api)
    .layer(TraceLayer::new_for_http())
}

async fn healthz() -> Json<Value> { Json(json!({ "status": "ok" })) }

#[cfg(test)]
mod tests;
