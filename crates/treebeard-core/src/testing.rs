//! In-memory store and scripted collaborators for unit tests.

use std::{
  collections::BTreeMap,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
  },
};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Notify;

use crate::{
  Error, Result, Settings, Treebeard,
  external::{Completion, CompletionRequest, FileAnalyzer, RefreshTrigger},
  oracle::OracleRegistry,
  store::{BlobStore, ObjectInfo},
  upload::Upload,
  user::User,
};

// ─── Store ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("memory store unavailable")]
pub struct Unavailable;

#[derive(Default)]
pub struct MemoryStore {
  objects:  Mutex<BTreeMap<String, (Bytes, DateTime<Utc>)>>,
  pub fail: AtomicBool,
}

impl MemoryStore {
  fn check(&self) -> Result<(), Unavailable> {
    if self.fail.load(Ordering::SeqCst) { Err(Unavailable) } else { Ok(()) }
  }

  /// Every key and body currently stored.
  pub fn dump(&self) -> BTreeMap<String, Bytes> {
    let objects = self.objects.lock().unwrap();
    objects.iter().map(|(k, (body, _))| (k.clone(), body.clone())).collect()
  }

  pub fn keys(&self) -> Vec<String> { self.dump().into_keys().collect() }
}

impl BlobStore for MemoryStore {
  type Error = Unavailable;

  async fn get(&self, key: &str) -> Result<Option<Bytes>, Unavailable> {
    self.check()?;
    Ok(self.objects.lock().unwrap().get(key).map(|(body, _)| body.clone()))
  }

  async fn head(&self, key: &str) -> Result<Option<ObjectInfo>, Unavailable> {
    self.check()?;
    let objects = self.objects.lock().unwrap();
    Ok(objects.get(key).map(|(body, at)| ObjectInfo {
      key:           key.to_string(),
      size:          body.len() as u64,
      last_modified: *at,
    }))
  }

  async fn put(&self, key: &str, body: Bytes) -> Result<ObjectInfo, Unavailable> {
    self.check()?;
    let now = Utc::now();
    let size = body.len() as u64;
    self.objects.lock().unwrap().insert(key.to_string(), (body, now));
    Ok(ObjectInfo { key: key.to_string(), size, last_modified: now })
  }

  async fn delete(&self, key: &str) -> Result<bool, Unavailable> {
    self.check()?;
    Ok(self.objects.lock().unwrap().remove(key).is_some())
  }

  async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, Unavailable> {
    self.check()?;
    let objects = self.objects.lock().unwrap();
    Ok(
      objects
        .range(prefix.to_string()..)
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, (body, at))| ObjectInfo {
          key:           k.clone(),
          size:          body.len() as u64,
          last_modified: *at,
        })
        .collect(),
    )
  }
}

// ─── Collaborators ───────────────────────────────────────────────────────────

pub struct FakeCollaborators {
  pub chat_reply:    Mutex<String>,
  /// `None` makes naming requests fail.
  pub name_reply:    Mutex<Option<String>>,
  pub completions:   Mutex<Vec<CompletionRequest>>,
  pub triggers:      Mutex<Vec<String>>,
  /// When set, triggers wait for a notification before accepting.
  pub trigger_gate:  Mutex<Option<Arc<Notify>>>,
  pub trigger_fail:  AtomicBool,
  pub analysis:      Mutex<Option<Value>>,
  pub analysis_fail: AtomicBool,
}

impl Default for FakeCollaborators {
  fn default() -> Self {
    Self {
      chat_reply:    Mutex::new("Here is what I found.".into()),
      name_reply:    Mutex::new(Some("Security Alert Review".into())),
      completions:   Mutex::default(),
      triggers:      Mutex::default(),
      trigger_gate:  Mutex::default(),
      trigger_fail:  AtomicBool::new(false),
      analysis:      Mutex::default(),
      analysis_fail: AtomicBool::new(false),
    }
  }
}

impl FakeCollaborators {
  pub fn completions(&self) -> Vec<CompletionRequest> { self.completions.lock().unwrap().clone() }

  pub fn chat_completions(&self) -> Vec<CompletionRequest> {
    self.completions().into_iter().filter(|r| !is_naming(r)).collect()
  }

  pub fn triggers(&self) -> Vec<String> { self.triggers.lock().unwrap().clone() }
}

fn is_naming(request: &CompletionRequest) -> bool {
  request.system.starts_with("Generate a short title")
}

impl Completion for FakeCollaborators {
  async fn complete(&self, request: &CompletionRequest) -> Result<String> {
    self.completions.lock().unwrap().push(request.clone());
    if is_naming(request) {
      let reply = self.name_reply.lock().unwrap().clone();
      reply.ok_or_else(|| Error::Collaborator("naming model unavailable".into()))
    } else {
      Ok(self.chat_reply.lock().unwrap().clone())
    }
  }
}

impl RefreshTrigger for FakeCollaborators {
  async fn trigger(&self, dashboard_id: &str) -> Result<()> {
    let gate = self.trigger_gate.lock().unwrap().clone();
    if let Some(gate) = gate {
      gate.notified().await;
    }
    if self.trigger_fail.load(Ordering::SeqCst) {
      return Err(Error::Collaborator("webhook returned 502".into()));
    }
    self.triggers.lock().unwrap().push(dashboard_id.to_string());
    Ok(())
  }
}

impl FileAnalyzer for FakeCollaborators {
  async fn analyze(&self, _owner: &str, _upload: &Upload) -> Result<Option<Value>> {
    if self.analysis_fail.load(Ordering::SeqCst) {
      return Err(Error::Collaborator("analysis hook returned 500".into()));
    }
    Ok(self.analysis.lock().unwrap().clone())
  }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

pub type TestService = Treebeard<MemoryStore, FakeCollaborators>;

pub struct Harness {
  pub service:  Arc<TestService>,
  pub store:    Arc<MemoryStore>,
  pub external: Arc<FakeCollaborators>,
}

pub fn harness() -> Harness {
  let store = Arc::new(MemoryStore::default());
  let external = Arc::new(FakeCollaborators::default());
  let settings = Settings { signing_secret: "test secret".into(), ..Settings::default() };
  let service = Arc::new(Treebeard::new(
    store.clone(),
    external.clone(),
    OracleRegistry::standard(),
    settings,
  ));
  Harness { service, store, external }
}

pub fn ada() -> User { User::new("ada@example.com") }
