//! Context Composer: the ordered context handed to the LLM for one turn.
//!
//! [`compose`] is pure. The same snapshot, history, prompt and analysis
//! always produce the same [`ComposedContext`], byte for byte once rendered.
//! `serde_json` maps are ordered, so stats render deterministically.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{dataset::DashboardView, external::CompletionRequest, message::Message, user::User};

/// Who is asking, and what has been remembered about them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallerContext {
  pub name:   String,
  pub email:  String,
  pub groups: Vec<String>,
  pub facts:  Vec<String>,
}

impl CallerContext {
  pub fn new(user: &User, facts: &[String]) -> Self {
    Self {
      name:   user.display_name().to_string(),
      email:  user.email.clone(),
      groups: user.groups.clone(),
      facts:  facts.to_vec(),
    }
  }
}

/// The parts of a dashboard view that reach the LLM.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OracleSnapshot {
  pub dashboard_id: String,
  pub context:      String,
  pub stats:        Value,
  pub updated_at:   Option<DateTime<Utc>>,
  pub stale:        bool,
  pub caller:       CallerContext,
}

impl OracleSnapshot {
  pub fn new(context: &str, view: &DashboardView, caller: CallerContext) -> Self {
    Self {
      dashboard_id: view.dashboard_id.clone(),
      context: context.to_string(),
      stats: view.stats.clone(),
      updated_at: view.updated_at,
      stale: view.stale,
      caller,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "segment", rename_all = "snake_case")]
pub enum Segment {
  DashboardSummary { dashboard_id: String, text: String },
  PriorMessages { messages: Vec<Message> },
  FileAnalysis { text: String },
  LatestPrompt { message: Message },
}

/// Segments in fixed order: dashboard summary, prior messages, optional file
/// analysis, latest prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposedContext {
  pub segments: Vec<Segment>,
}

pub fn compose(
  snapshot: &OracleSnapshot,
  history: &[Message],
  latest: &Message,
  file_analysis: Option<&Value>,
) -> ComposedContext {
  let mut segments = vec![
    Segment::DashboardSummary {
      dashboard_id: snapshot.dashboard_id.clone(),
      text:         dashboard_summary(snapshot),
    },
    Segment::PriorMessages { messages: history.to_vec() },
  ];
  if let Some(analysis) = file_analysis {
    segments.push(Segment::FileAnalysis { text: analysis_summary(analysis) });
  }
  segments.push(Segment::LatestPrompt { message: latest.clone() });
  ComposedContext { segments }
}

fn pretty(value: &Value) -> String {
  serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn dashboard_summary(snapshot: &OracleSnapshot) -> String {
  let updated = match snapshot.updated_at {
    Some(at) => at.to_rfc3339(),
    None => "never".to_string(),
  };
  let mut text = String::new();
  let _ = writeln!(text, "{}", snapshot.context.trim());

  let caller = &snapshot.caller;
  let _ = write!(text, "\nUser: {} ({}", caller.name, caller.email);
  if !caller.groups.is_empty() {
    let _ = write!(text, ", groups: {}", caller.groups.join(", "));
  }
  text.push_str(")\n");
  if !caller.facts.is_empty() {
    text.push_str("Relevant user context:\n");
    for fact in &caller.facts {
      let _ = writeln!(text, "- {}", fact.trim());
    }
  }

  let _ = write!(text, "\nDashboard: {} (data as of {updated}", snapshot.dashboard_id);
  if snapshot.stale {
    text.push_str(", may be out of date");
  }
  let _ = write!(text, ")\nDashboard status:\n{}", pretty(&snapshot.stats));
  text
}

fn analysis_summary(analysis: &Value) -> String {
  format!(
    "A file has been uploaded and analysed. Analysis results:\n{}\n\nDiscuss \
     these results in your response.",
    pretty(analysis)
  )
}

impl ComposedContext {
  /// Canonical text form of the whole context.
  pub fn render(&self) -> String {
    let mut out = String::new();
    for segment in &self.segments {
      match segment {
        Segment::DashboardSummary { text, .. } => {
          let _ = writeln!(out, "[dashboard]\n{text}");
        }
        Segment::PriorMessages { messages } => {
          let _ = writeln!(out, "[history]");
          for m in messages {
            let _ = writeln!(out, "{:?}: {}", m.role, m.content);
          }
        }
        Segment::FileAnalysis { text } => {
          let _ = writeln!(out, "[file]\n{text}");
        }
        Segment::LatestPrompt { message } => {
          let _ = writeln!(out, "[prompt]\n{:?}: {}", message.role, message.content);
        }
      }
    }
    out
  }

  /// SHA-256 of [`render`](Self::render), for logging.
  pub fn fingerprint(&self) -> String { hex::encode(Sha256::digest(self.render())) }

  /// Map onto a completion request: dashboard and file context join the
  /// system prompt, messages keep their order.
  pub fn to_request(&self, system_prompt: &str, max_tokens: u32) -> CompletionRequest {
    let mut system = system_prompt.trim().to_string();
    let mut messages = Vec::new();
    for segment in &self.segments {
      match segment {
        Segment::DashboardSummary { text, .. } | Segment::FileAnalysis { text } => {
          system.push_str("\n\n");
          system.push_str(text);
        }
        Segment::PriorMessages { messages: prior } => messages.extend(prior.iter().cloned()),
        Segment::LatestPrompt { message } => messages.push(message.clone()),
      }
    }
    CompletionRequest { system, messages, max_tokens }
  }
}
