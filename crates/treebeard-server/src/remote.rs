//! HTTP adapters for the external collaborators: the Anthropic messages API
//! for completions, per-dashboard refresh webhooks, and an optional
//! file-analysis hook.

use std::{collections::BTreeMap, time::Duration};

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};
use treebeard_core::{
  Error, Result,
  external::{Completion, CompletionRequest, FileAnalyzer, RefreshTrigger},
  message::{Message, Role},
  upload::Upload,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
  pub base_url:     String,
  /// Falls back to `ANTHROPIC_API_KEY` when empty.
  pub api_key:      String,
  pub model:        String,
  pub temperature:  f32,
  pub timeout_secs: u64,
}

impl Default for LlmConfig {
  fn default() -> Self {
    Self {
      base_url:     "https://api.anthropic.com".to_string(),
      api_key:      String::new(),
      model:        "claude-3-5-sonnet-20240620".to_string(),
      temperature:  0.0,
      timeout_secs: 60,
    }
  }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
  /// Seconds between scheduled refreshes of every proxy dashboard. `0`
  /// disables the scheduler.
  pub interval_secs: u64,
  /// How long to wait for a webhook to accept a trigger.
  pub timeout_secs:  u64,
  /// Dashboard id to webhook URL.
  pub webhooks:      BTreeMap<String, String>,
  /// Bearer token sent to webhooks. Empty sends none.
  pub webhook_token: String,
  /// Bearer token the refresh compute presents to `PUT /ingest/{id}`. Empty
  /// disables ingestion.
  pub ingest_token:  String,
}

impl Default for RefreshConfig {
  fn default() -> Self {
    Self {
      interval_secs: 15 * 60,
      timeout_secs:  5,
      webhooks:      BTreeMap::new(),
      webhook_token: String::new(),
      ingest_token:  String::new(),
    }
  }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
  /// Receives the upload record as JSON and answers with the analysis.
  pub hook_url:     Option<String>,
  pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
  fn default() -> Self { Self { hook_url: None, timeout_secs: 30 } }
}

// ─── Adapter ─────────────────────────────────────────────────────────────────

pub struct HttpCollaborators {
  client:   Client,
  llm:      LlmConfig,
  api_key:  String,
  refresh:  RefreshConfig,
  analysis: AnalysisConfig,
}

fn collaborator(msg: impl Into<String>) -> Error { Error::Collaborator(msg.into()) }

impl HttpCollaborators {
  pub fn new(
    llm: LlmConfig,
    refresh: RefreshConfig,
    analysis: AnalysisConfig,
  ) -> reqwest::Result<Self> {
    let client = Client::builder().user_agent("treebeard").build()?;
    let api_key = if llm.api_key.is_empty() {
      std::env::var("ANTHROPIC_API_KEY").unwrap_or_default()
    } else {
      llm.api_key.clone()
    };
    Ok(Self { client, llm, api_key, refresh, analysis })
  }
}

/// Shape a message list for the messages API: the conversation must open
/// with a user turn and alternate roles. System notes become user turns and
/// consecutive turns of one role are merged.
fn anthropic_messages(messages: &[Message]) -> Vec<Value> {
  let mut turns: Vec<(&'static str, String)> = Vec::new();
  for message in messages.iter().filter(|m| !m.is_blank()) {
    let (role, content) = match message.role {
      Role::User => ("user", message.content.clone()),
      Role::Assistant => ("assistant", message.content.clone()),
      Role::System => ("user", format!("[system note] {}", message.content)),
    };
    match turns.last_mut() {
      Some((last, text)) if *last == role => {
        text.push_str("\n\n");
        text.push_str(&content);
      }
      _ => turns.push((role, content)),
    }
  }
  if turns.first().is_some_and(|(role, _)| *role == "assistant") {
    turns.insert(0, ("user", "(continuing an earlier conversation)".to_string()));
  }
  turns
    .into_iter()
    .map(|(role, content)| json!({ "role": role, "content": content }))
    .collect()
}

impl Completion for HttpCollaborators {
  async fn complete(&self, request: &CompletionRequest) -> Result<String> {
    if self.api_key.is_empty() {
      return Err(collaborator("no LLM API key configured"));
    }
    let url = format!("{}/v1/messages", self.llm.base_url.trim_end_matches('/'));
    let body = json!({
      "model": self.llm.model,
      "max_tokens": request.max_tokens,
      "temperature": self.llm.temperature,
      "system": request.system,
      "messages": anthropic_messages(&request.messages),
    });

    let response = self
      .client
      .post(&url)
      .header("x-api-key", &self.api_key)
      .header("anthropic-version", ANTHROPIC_VERSION)
      .timeout(Duration::from_secs(self.llm.timeout_secs))
      .json(&body)
      .send()
      .await
      .map_err(|e| collaborator(format!("LLM request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
      let text = response.text().await.unwrap_or_default();
      return Err(collaborator(format!("LLM API error ({status}): {text}")));
    }

    let json: Value = response
      .json()
      .await
      .map_err(|e| collaborator(format!("failed to parse LLM response: {e}")))?;
    debug!(model = %self.llm.model, usage = %json["usage"], "completion received");
    response_text(&json).ok_or_else(|| collaborator("LLM response has no text content"))
  }
}

/// Concatenated text of every `text` content block, in order.
fn response_text(json: &Value) -> Option<String> {
  let texts: Vec<&str> = json["content"]
    .as_array()?
    .iter()
    .filter(|block| block["type"] == "text")
    .filter_map(|block| block["text"].as_str())
    .collect();
  if texts.is_empty() { None } else { Some(texts.concat()) }
}

impl RefreshTrigger for HttpCollaborators {
  /// POST to the dashboard's webhook. A timeout counts as accepted: the
  /// compute may still be starting, and the refresh marker bounds retries.
  async fn trigger(&self, dashboard_id: &str) -> Result<()> {
    let url = self
      .refresh
      .webhooks
      .get(dashboard_id)
      .ok_or_else(|| collaborator(format!("no refresh webhook for {dashboard_id}")))?;

    let mut request = self
      .client
      .post(url)
      .timeout(Duration::from_secs(self.refresh.timeout_secs))
      .json(&json!({ "dashboard_id": dashboard_id }));
    if !self.refresh.webhook_token.is_empty() {
      request = request.bearer_auth(&self.refresh.webhook_token);
    }

    match request.send().await {
      Ok(response) if response.status().is_success() => Ok(()),
      Ok(response) => Err(collaborator(format!(
        "refresh webhook for {dashboard_id} returned {}",
        response.status()
      ))),
      Err(e) if e.is_timeout() => {
        warn!(dashboard_id, "refresh webhook timed out; treating as accepted");
        Ok(())
      }
      Err(e) => Err(collaborator(format!("refresh webhook for {dashboard_id} failed: {e}"))),
    }
  }
}

impl FileAnalyzer for HttpCollaborators {
  async fn analyze(&self, owner: &str, upload: &Upload) -> Result<Option<Value>> {
    let Some(url) = &self.analysis.hook_url else {
      return Ok(None);
    };

    let response = self
      .client
      .post(url)
      .timeout(Duration::from_secs(self.analysis.timeout_secs))
      .json(&json!({ "owner": owner, "upload": upload }))
      .send()
      .await
      .map_err(|e| collaborator(format!("analysis hook failed: {e}")))?;

    match response.status() {
      StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Ok(None),
      status if status.is_success() => {
        let value: Value = response
          .json()
          .await
          .map_err(|e| collaborator(format!("analysis hook sent invalid JSON: {e}")))?;
        Ok(Some(value).filter(|v| !v.is_null()))
      }
      status => Err(collaborator(format!("analysis hook returned {status}"))),
    }
  }
}
