//! [`Treebeard`]: the single entry point the transport layer calls.
//!
//! Every operation takes the authenticated [`User`] and works inside that
//! user's namespace. Conversation state between turns is carried by the
//! client; only explicit saves persist messages.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  compose::{CallerContext, OracleSnapshot, compose},
  conversation::{Conversation, ConversationId, ConversationState, ConversationSummary},
  dataset::{DashboardView, RefreshAccepted},
  external::{Collaborators, Completion, CompletionRequest},
  message::{self, Message, Role},
  oracle::{Oracle, OracleEnv, OracleRegistry, ProxyOracle, home},
  pipeline::{self, UploadPipeline},
  session::{self, Renamed, Sessions},
  settings::Settings,
  store::BlobStore,
  upload::{Upload, UploadGrant, UploadSigner},
  user::User,
};

/// Prompt used when a file is sent without any text.
pub const DEFAULT_FILE_PROMPT: &str = "Please analyze the uploaded file.";

const CHAT_MAX_TOKENS: u32 = 4_000;
const NAME_MAX_TOKENS: u32 = 50;

const NAMING_PROMPT: &str = "Generate a short title (2 to 5 words) for the \
following conversation. Reply with the title only, without quotes or \
punctuation at the end.";

// ─── Requests & responses ────────────────────────────────────────────────────

fn default_dashboard() -> String { crate::oracle::home::HOME_ID.to_string() }

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
  #[serde(default = "default_dashboard")]
  pub dashboard_id:      String,
  #[serde(default)]
  pub prompt:            String,
  #[serde(default)]
  pub conversation_id:   Option<String>,
  /// Prior messages held by the client, invisible ones included.
  #[serde(default)]
  pub messages:          Vec<Message>,
  /// Upload to discuss, as a bare key or full object key.
  #[serde(default)]
  pub file_name:         Option<String>,
  /// Send the prompt as an invisible system note rather than a user message.
  #[serde(default)]
  pub is_system_message: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
  pub conversation_id:  ConversationId,
  pub new_conversation: bool,
  /// Full updated history: prior messages, the new prompt, the reply.
  pub messages:         Vec<Message>,
  pub response:         String,
  pub file_analysis:    Option<Value>,
  pub state:            ConversationState,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvisibleMessageRequest {
  #[serde(default = "default_dashboard")]
  pub dashboard_id:    String,
  pub message:         String,
  #[serde(default)]
  pub conversation_id: Option<String>,
  #[serde(default)]
  pub messages:        Vec<Message>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvisibleMessageResponse {
  pub conversation_id: ConversationId,
  pub messages:        Vec<Message>,
  pub state:           ConversationState,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadUrlRequest {
  pub filename:        String,
  pub extension:       String,
  #[serde(default)]
  pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
  Success,
  Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
  pub status:          Status,
  pub conversation_id: ConversationId,
  pub name:            String,
  pub etag:            String,
  pub last_modified:   DateTime<Utc>,
  pub state:           ConversationState,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenameOutcome {
  pub status:          Status,
  pub conversation_id: ConversationId,
  pub name:            String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
  pub status:          Status,
  pub conversation_id: ConversationId,
  pub existed:         bool,
  pub removed_uploads: usize,
  pub state:           ConversationState,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteUploadOutcome {
  pub status:          Status,
  pub conversation_id: ConversationId,
  pub upload_key:      String,
  pub existed:         bool,
}

// ─── Facade ──────────────────────────────────────────────────────────────────

pub struct Treebeard<S, X> {
  store:    Arc<S>,
  external: Arc<X>,
  registry: OracleRegistry,
  settings: Arc<Settings>,
  sessions: Sessions<S>,
  uploads:  UploadPipeline<S>,
}

impl<S, X> Treebeard<S, X>
where
  S: BlobStore + 'static,
  X: Collaborators + 'static,
{
  pub fn new(store: Arc<S>, external: Arc<X>, registry: OracleRegistry, settings: Settings) -> Self {
    let settings = Arc::new(settings);
    let signer = UploadSigner::new(settings.signing_secret.as_bytes());
    Self {
      sessions: Sessions::new(store.clone(), settings.clone()),
      uploads: UploadPipeline::new(store.clone(), settings.clone(), signer),
      store,
      external,
      registry,
      settings,
    }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn registry(&self) -> &OracleRegistry { &self.registry }

  pub fn settings(&self) -> &Settings { &self.settings }

  /// Verifies the policies this instance signs.
  pub fn signer(&self) -> &UploadSigner { self.uploads.signer() }

  fn env<'a>(&'a self, user: &'a User, now: DateTime<Utc>) -> OracleEnv<'a, S, X> {
    OracleEnv {
      store: &*self.store,
      trigger: &*self.external,
      user,
      settings: &self.settings,
      now,
    }
  }

  fn conversation_id(raw: &str) -> Result<ConversationId> { ConversationId::parse(raw.trim()) }

  // ─── Dashboards ────────────────────────────────────────────────────────────

  pub async fn get_dashboard(&self, user: &User, dashboard_id: &str) -> Result<DashboardView> {
    let oracle = self.registry.resolve(dashboard_id)?;
    self.dashboard_view(user, oracle, Utc::now()).await
  }

  /// Read `oracle`'s dashboard. A proxy that has never had a dataset gets its
  /// first refresh claimed here, with the trigger sent in the background so
  /// the read returns at once.
  async fn dashboard_view(
    &self,
    user: &User,
    oracle: &Oracle,
    now: DateTime<Utc>,
  ) -> Result<DashboardView> {
    let env = self.env(user, now);
    let mut view = oracle.get_dashboard(&env).await?;
    let Oracle::Proxy(proxy) = oracle else {
      return Ok(view);
    };
    if view.updated_at.is_some() || view.refresh_pending {
      return Ok(view);
    }
    match proxy.claim_bootstrap(&env).await {
      Ok(true) => {
        self.spawn_trigger(user, proxy, now);
        view.refresh_pending = true;
      }
      Ok(false) => {}
      Err(e) => warn!(dashboard = %proxy.id(), error = %e, "could not request first dataset"),
    }
    Ok(view)
  }

  fn spawn_trigger(&self, user: &User, proxy: &ProxyOracle, now: DateTime<Utc>) {
    let store = self.store.clone();
    let external = self.external.clone();
    let settings = self.settings.clone();
    let user = user.clone();
    let proxy = proxy.clone();
    tokio::spawn(async move {
      let env = OracleEnv {
        store: &*store,
        trigger: &*external,
        user: &user,
        settings: &settings,
        now,
      };
      if let Err(e) = proxy.send_trigger(&env).await {
        warn!(dashboard = %proxy.id(), error = %e, "first refresh trigger failed");
      }
    });
  }

  pub async fn refresh_dashboard(&self, user: &User, dashboard_id: &str) -> Result<RefreshAccepted> {
    let oracle = self.registry.resolve(dashboard_id)?;
    oracle.refresh(&self.env(user, Utc::now())).await
  }

  /// Make sure every oracle has data on its way.
  pub async fn initialize_data(&self, user: &User, dashboard_id: &str) -> Result<()> {
    let oracle = self.registry.resolve(dashboard_id)?;
    oracle.initialize_data(&self.env(user, Utc::now())).await
  }

  // ─── Chat ──────────────────────────────────────────────────────────────────

  /// The id to use for this turn: the caller's, or a freshly allocated one.
  async fn id_for_turn(
    &self,
    owner: &str,
    raw: Option<&str>,
    now: DateTime<Utc>,
  ) -> Result<(ConversationId, bool)> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
      Some(raw) => Ok((Self::conversation_id(raw)?, false)),
      None => Ok((self.sessions.allocate_id(owner, now).await?, true)),
    }
  }

  pub async fn chat(&self, user: &User, request: ChatRequest) -> Result<ChatResponse> {
    let now = Utc::now();
    let owner = user.namespace();
    let oracle = self.registry.resolve(&request.dashboard_id)?;

    let file_name = request.file_name.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let prompt = match (request.prompt.trim(), file_name) {
      ("", Some(_)) => DEFAULT_FILE_PROMPT.to_string(),
      ("", None) => return Err(Error::Validation("prompt or file_name is required".into())),
      (prompt, _) => prompt.to_string(),
    };

    let (conversation_id, new_conversation) =
      self.id_for_turn(&owner, request.conversation_id.as_deref(), now).await?;

    let mut history = message::normalize_history(request.messages);
    let saved = !new_conversation && self.sessions.meta(&owner, &conversation_id).await?.is_some();
    if !new_conversation && history.is_empty() {
      match self.sessions.history(&owner, &conversation_id).await? {
        Some(persisted) => history = persisted,
        None => {
          if !self.sessions.is_known(&owner, &conversation_id).await? {
            return Err(Error::ConversationNotFound(conversation_id.to_string()));
          }
        }
      }
    }

    let file_analysis = match file_name {
      Some(name) => self.uploads.analysis_for(&owner, &conversation_id, name).await?,
      None if new_conversation => None,
      None => self.uploads.latest_analysis(&owner, &conversation_id).await?,
    };

    let view = self.dashboard_view(user, oracle, now).await?;
    let facts = home::load_facts(&*self.store, &owner).await?;
    let snapshot =
      OracleSnapshot::new(oracle.context(), &view, CallerContext::new(user, &facts.facts));
    let latest = if request.is_system_message {
      Message::system_note(prompt)
    } else {
      Message::user(prompt)
    };

    let composed = compose(&snapshot, &history, &latest, file_analysis.as_ref());
    debug!(
      conversation_id = %conversation_id,
      fingerprint = %composed.fingerprint(),
      segments = composed.segments.len(),
      "context composed"
    );
    let completion = composed.to_request(&self.settings.system_prompt, CHAT_MAX_TOKENS);
    let reply = self.external.complete(&completion).await?;

    info!(
      conversation_id = %conversation_id,
      dashboard = %oracle.id(),
      history = history.len(),
      with_file = file_analysis.is_some(),
      "chat turn completed"
    );

    let mut messages = history;
    messages.push(latest);
    messages.push(Message::assistant(reply.clone()));
    Ok(ChatResponse {
      conversation_id,
      new_conversation,
      messages,
      response: reply,
      file_analysis,
      state: if saved { ConversationState::Saved } else { ConversationState::Active },
    })
  }

  /// Append an invisible system note to the client's history without calling
  /// the LLM, e.g. when the user switches dashboards mid-conversation.
  pub async fn send_invisible_message(
    &self,
    user: &User,
    request: InvisibleMessageRequest,
  ) -> Result<InvisibleMessageResponse> {
    let now = Utc::now();
    let owner = user.namespace();
    let oracle = self.registry.resolve(&request.dashboard_id)?;
    let text = request.message.trim();
    if text.is_empty() {
      return Err(Error::Validation("message cannot be empty".into()));
    }

    let (conversation_id, new_conversation) =
      self.id_for_turn(&owner, request.conversation_id.as_deref(), now).await?;
    let saved = !new_conversation && self.sessions.meta(&owner, &conversation_id).await?.is_some();

    let mut messages = message::normalize_history(request.messages);
    messages.push(Message::system_note(text));
    debug!(conversation_id = %conversation_id, dashboard = %oracle.id(), "invisible note added");

    Ok(InvisibleMessageResponse {
      conversation_id,
      messages,
      state: if saved { ConversationState::Saved } else { ConversationState::Active },
    })
  }

  // ─── Conversations ─────────────────────────────────────────────────────────

  pub async fn save_conversation(
    &self,
    user: &User,
    dashboard_id: &str,
    conversation_id: &str,
    messages: Vec<Message>,
  ) -> Result<SaveOutcome> {
    self.registry.resolve(dashboard_id)?;
    let owner = user.namespace();
    let id = Self::conversation_id(conversation_id)?;

    let plan = self.sessions.prepare_save(&owner, id, &messages).await?;
    let name = if plan.needs_name() {
      Some((self.generate_name(&plan.messages).await, true))
    } else {
      None
    };
    let meta = self.sessions.commit_save(plan, name, Utc::now()).await?;

    Ok(SaveOutcome {
      status:          Status::Success,
      conversation_id: meta.conversation_id,
      name:            meta.name,
      etag:            meta.etag,
      last_modified:   meta.last_modified,
      state:           ConversationState::Saved,
    })
  }

  /// A 2 to 5 word title for `messages`. Falls back to the first user
  /// message if the LLM fails or answers with nothing usable.
  async fn generate_name(&self, messages: &[Message]) -> String {
    let max_len = self.settings.max_name_len;
    let transcript = messages
      .iter()
      .filter(|m| m.role != Role::System)
      .map(|m| format!("{:?}: {}", m.role, m.content))
      .collect::<Vec<_>>()
      .join("\n");
    let request = CompletionRequest {
      system:     NAMING_PROMPT.to_string(),
      messages:   vec![Message::user(transcript)],
      max_tokens: NAME_MAX_TOKENS,
    };

    match self.external.complete(&request).await {
      Ok(raw) => match clean_name(&raw, max_len) {
        Some(name) => return name,
        None => warn!(raw = %raw, "generated conversation name was unusable"),
      },
      Err(e) => warn!(error = %e, "could not generate conversation name"),
    }
    session::fallback_name(messages, max_len)
  }

  /// Saved conversations, most recent first. The dashboard id is validated but
  /// does not filter: conversations belong to the user, not the dashboard.
  pub async fn list_conversations(
    &self,
    user: &User,
    dashboard_id: &str,
  ) -> Result<Vec<ConversationSummary>> {
    self.registry.resolve(dashboard_id)?;
    self.sessions.list(&user.namespace()).await
  }

  pub async fn get_conversation(&self, user: &User, conversation_id: &str) -> Result<Conversation> {
    let id = Self::conversation_id(conversation_id)?;
    self.sessions.load(&user.namespace(), &id).await
  }

  pub async fn update_conversation_name(
    &self,
    user: &User,
    conversation_id: &str,
    new_name: &str,
  ) -> Result<RenameOutcome> {
    let id = Self::conversation_id(conversation_id)?;
    let (renamed, meta) = self.sessions.rename(&user.namespace(), &id, new_name, Utc::now()).await?;
    Ok(RenameOutcome {
      status:          match renamed {
        Renamed::Changed => Status::Success,
        Renamed::Unchanged => Status::Unchanged,
      },
      conversation_id: meta.conversation_id,
      name:            meta.name,
    })
  }

  /// Delete a conversation and every upload linked to it. Deleting an unknown
  /// or already deleted conversation succeeds.
  pub async fn delete_conversation(&self, user: &User, conversation_id: &str) -> Result<DeleteOutcome> {
    let owner = user.namespace();
    let id = Self::conversation_id(conversation_id)?;
    let removed_uploads = self.uploads.delete_all(&owner, &id).await?;
    let existed = self.sessions.delete(&owner, &id).await?;
    info!(conversation_id = %id, existed, removed_uploads, "conversation deleted");
    Ok(DeleteOutcome {
      status: Status::Success,
      conversation_id: id,
      existed,
      removed_uploads,
      state: ConversationState::Deleted,
    })
  }

  // ─── Uploads ───────────────────────────────────────────────────────────────

  pub async fn get_upload_url(&self, user: &User, request: UploadUrlRequest) -> Result<UploadGrant> {
    let now = Utc::now();
    let owner = user.namespace();
    let (filename, extension) = pipeline::validate_request(
      &request.filename,
      &request.extension,
      self.settings.max_filename_len,
    )?;
    let (id, _) = self.id_for_turn(&owner, request.conversation_id.as_deref(), now).await?;
    self.uploads.request_upload_url(&owner, id, filename, extension, now).await
  }

  pub async fn finalize_upload(
    &self,
    user: &User,
    conversation_id: &str,
    upload_key: &str,
  ) -> Result<Upload> {
    let id = Self::conversation_id(conversation_id)?;
    self.uploads.finalize(&user.namespace(), &id, upload_key, &*self.external).await
  }

  pub async fn delete_upload(
    &self,
    user: &User,
    conversation_id: &str,
    upload_key: &str,
  ) -> Result<DeleteUploadOutcome> {
    let id = Self::conversation_id(conversation_id)?;
    let existed = self.uploads.delete(&user.namespace(), &id, upload_key).await?;
    Ok(DeleteUploadOutcome {
      status: Status::Success,
      conversation_id: id,
      upload_key: upload_key.trim().to_string(),
      existed,
    })
  }

  pub async fn list_uploads(&self, user: &User, conversation_id: &str) -> Result<Vec<Upload>> {
    let id = Self::conversation_id(conversation_id)?;
    self.uploads.list(&user.namespace(), &id).await
  }

  /// Proxy oracles, for background refresh.
  pub fn proxies(&self) -> impl Iterator<Item = &Oracle> {
    self.registry.oracles().iter().filter(|o| !o.is_self_aggregating())
  }
}

/// Strip quotes and trailing punctuation from a generated title and bound it
/// to 2..=5 words and `max_len` characters.
fn clean_name(raw: &str, max_len: usize) -> Option<String> {
  let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
  let line = line.trim_matches(|c: char| c == '"' || c == '\'' || c == '*' || c == '`');
  let line = line.trim_end_matches(['.', '!', '?', ':', ';', ',']);
  let words: Vec<&str> = line.split_whitespace().take(5).collect();
  if words.len() < 2 {
    return None;
  }
  let name = crate::conversation::truncate_chars(&words.join(" "), max_len);
  Some(name.trim_end().to_string())
}
