//! Router tests for the server-only endpoints over an in-memory SQLite store.

use std::sync::Arc;

use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt as _;
use treebeard_core::{
  Settings, Treebeard, oracle::OracleRegistry, service::UploadUrlRequest, store::BlobStore,
  upload::UploadGrant, user::User,
};
use treebeard_store_sqlite::SqliteStore;

use crate::{
  AppState, ServerConfig,
  auth::{AuthConfig, Authenticator},
  remote::{AnalysisConfig, HttpCollaborators, LlmConfig, RefreshConfig},
  router, scheduler,
};

type TestService = Treebeard<SqliteStore, HttpCollaborators>;

struct App {
  router:  Router,
  service: Arc<TestService>,
}

async fn app_with(config: ServerConfig) -> App {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let remote = HttpCollaborators::new(
    config.llm.clone(),
    config.refresh.clone(),
    config.analysis.clone(),
  )
  .unwrap();
  let service = Arc::new(Treebeard::new(
    store,
    Arc::new(remote),
    OracleRegistry::new(config.dashboards.clone()),
    config.settings.clone(),
  ));
  let state = AppState {
    service: service.clone(),
    auth:    Arc::new(Authenticator::new(config.auth.clone(), config.is_development())),
    config:  Arc::new(config),
  };
  App { router: router(state), service }
}

fn config() -> ServerConfig {
  ServerConfig {
    auth: AuthConfig {
      identity_header: Some("x-auth-request-email".into()),
      ..AuthConfig::default()
    },
    llm: LlmConfig { api_key: "test-key".into(), ..LlmConfig::default() },
    refresh: RefreshConfig { ingest_token: "ingest-secret".into(), ..RefreshConfig::default() },
    analysis: AnalysisConfig::default(),
    settings: Settings {
      signing_secret: "test secret".into(),
      max_upload_bytes: 16,
      ..Settings::default()
    },
    ..ServerConfig::default()
  }
}

async fn app() -> App { app_with(config()).await }

async fn call(router: &Router, req: Request<Body>) -> (StatusCode, Value, Option<String>) {
  let res = router.clone().oneshot(req).await.unwrap();
  let status = res.status();
  let challenge = res
    .headers()
    .get(header::WWW_AUTHENTICATE)
    .map(|v| v.to_str().unwrap().to_string());
  let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
  let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
  (status, body, challenge)
}

fn as_ada(method: &str, uri: &str) -> Request<Body> {
  Request::builder()
    .method(method)
    .uri(uri)
    .header("x-auth-request-email", "ada@example.com")
    .body(Body::empty())
    .unwrap()
}

fn ingest(dashboard_id: &str, token: Option<&str>, payload: Value) -> Request<Body> {
  let mut req = Request::builder()
    .method("PUT")
    .uri(format!("/ingest/{dashboard_id}"))
    .header(header::CONTENT_TYPE, "application/json");
  if let Some(token) = token {
    req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
  }
  req.body(Body::from(payload.to_string())).unwrap()
}

async fn grant(app: &App) -> UploadGrant {
  app
    .service
    .get_upload_url(&User::new("ada@example.com"), UploadUrlRequest {
      filename:        "notes.txt".into(),
      extension:       "txt".into(),
      conversation_id: None,
    })
    .await
    .unwrap()
}

fn blob_put(key: &str, policy: &str, signature: &str, body: &'static str) -> Request<Body> {
  Request::builder()
    .method("PUT")
    .uri(format!("/blob/{key}?policy={policy}&signature={signature}"))
    .body(Body::from(body))
    .unwrap()
}

// ─── Health & auth ───────────────────────────────────────────────────────────

#[tokio::test]
async fn healthz_needs_no_auth() {
  let app = app().await;
  let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
  let (status, body, _) = call(&app.router, req).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn api_without_identity_is_401_with_challenge() {
  let app = app().await;
  let req = Request::builder().uri("/api/dashboards/treebeard").body(Body::empty()).unwrap();
  let (status, body, challenge) = call(&app.router, req).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(body["status"], "unauthorized");
  assert_eq!(challenge.as_deref(), Some("Basic realm=\"treebeard\""));
}

#[tokio::test]
async fn identity_header_reaches_the_api() {
  let app = app().await;
  let (status, body, _) = call(&app.router, as_ada("GET", "/api/dashboards/treebeard")).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["dashboard_id"], "treebeard");
}

#[tokio::test]
async fn dev_user_is_used_in_development_only() {
  let mut cfg = config();
  cfg.auth.dev_user = Some("dev@example.com".into());
  cfg.environment = "development".into();
  let app = app_with(cfg).await;
  let req = Request::builder().uri("/api/conversations").body(Body::empty()).unwrap();
  let (status, _, _) = call(&app.router, req).await;
  assert_eq!(status, StatusCode::OK);

  let mut cfg = config();
  cfg.auth.dev_user = Some("dev@example.com".into());
  let app = app_with(cfg).await;
  let req = Request::builder().uri("/api/conversations").body(Body::empty()).unwrap();
  let (status, _, _) = call(&app.router, req).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ─── Blob receiver ───────────────────────────────────────────────────────────

#[tokio::test]
async fn signed_upload_lands_in_the_store() {
  let app = app().await;
  let grant = grant(&app).await;
  let fields = &grant.descriptor.fields;
  let req = blob_put(&grant.file_name, &fields["policy"], &fields["signature"], "hello");
  let (status, body, _) = call(&app.router, req).await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["size"], 5);
  assert!(app.service.store().head(&grant.file_name).await.unwrap().is_some());

  let finalized = app
    .service
    .finalize_upload(
      &User::new("ada@example.com"),
      grant.conversation_id.as_str(),
      &grant.upload_key,
    )
    .await
    .unwrap();
  assert_eq!(finalized.size, Some(5));
  assert_eq!(finalized.analysis, None);
}

#[tokio::test]
async fn tampered_signature_is_403() {
  let app = app().await;
  let grant = grant(&app).await;
  let req = blob_put(&grant.file_name, &grant.descriptor.fields["policy"], "00ff", "hello");
  let (status, _, _) = call(&app.router, req).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert!(app.service.store().head(&grant.file_name).await.unwrap().is_none());
}

#[tokio::test]
async fn policy_only_covers_its_own_key() {
  let app = app().await;
  let grant = grant(&app).await;
  let fields = &grant.descriptor.fields;
  let req = blob_put("blob_files/other/x.txt", &fields["policy"], &fields["signature"], "hello");
  let (status, _, _) = call(&app.router, req).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn oversized_upload_is_413() {
  let app = app().await;
  let grant = grant(&app).await;
  let fields = &grant.descriptor.fields;
  let req = blob_put(
    &grant.file_name,
    &fields["policy"],
    &fields["signature"],
    "this body is longer than sixteen bytes",
  );
  let (status, body, _) = call(&app.router, req).await;
  assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
  assert_eq!(body["status"], "payload_too_large");
  assert!(app.service.store().head(&grant.file_name).await.unwrap().is_none());
}

// ─── Ingest ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ingest_requires_the_token() {
  let app = app().await;
  let (status, _, _) = call(&app.router, ingest("lucius", None, json!([]))).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  let (status, _, _) = call(&app.router, ingest("lucius", Some("nope"), json!([]))).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  let (status, _, _) = call(&app.router, ingest("lucius", Some("ingest-secre"), json!([]))).await;
  assert_eq!(status, StatusCode::FORBIDDEN);

  let mut cfg = config();
  cfg.refresh.ingest_token = String::new();
  let disabled = app_with(cfg).await;
  let (status, _, _) = call(&disabled.router, ingest("lucius", Some(""), json!([]))).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn ingested_dataset_is_served_fresh() {
  let app = app().await;
  let alerts = json!([
    { "type": "code_scanning", "severity": "high", "state": "open", "rule": "sql-injection" },
  ]);
  let (status, body, _) = call(&app.router, ingest("lucius", Some("ingest-secret"), alerts)).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["dashboard_id"], "lucius");

  let (status, view, _) = call(&app.router, as_ada("GET", "/api/dashboards/lucius")).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(view["stale"], false);
  assert_eq!(view["stats"]["total_alerts"], 1);
}

#[tokio::test]
async fn ingest_rejects_unknown_and_home_dashboards() {
  let app = app().await;
  let (status, _, _) = call(&app.router, ingest("nope", Some("ingest-secret"), json!({}))).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  let (status, _, _) =
    call(&app.router, ingest("treebeard", Some("ingest-secret"), json!({}))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn scheduled_refresh_without_webhooks_sends_nothing() {
  let app = app().await;
  scheduler::warm_up(&app.service).await;
  assert_eq!(scheduler::refresh_all(&app.service).await, 0);
}
