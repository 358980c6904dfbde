//! Conversation identity, persisted metadata, and read models.
//!
//! A conversation moves through `Active` (id assigned, client-held) →
//! `Saved` (persisted by an explicit save) → `Deleted`. Only saved
//! conversations are listed or counted against the owner's capacity.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, message::Message, upload::Upload};

// ─── Identity ────────────────────────────────────────────────────────────────

const MAX_ID_LEN: usize = 64;

/// Conversation identifier, unique within its owner's namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConversationId(String);

impl ConversationId {
  /// Validate a caller-supplied id. Ids become key segments, so only
  /// `[A-Za-z0-9_-]` is accepted.
  pub fn parse(raw: &str) -> Result<Self> {
    let ok = !raw.is_empty()
      && raw.len() <= MAX_ID_LEN
      && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
      Ok(Self(raw.to_string()))
    } else {
      Err(Error::Validation(format!("malformed conversation id {raw:?}")))
    }
  }

  /// A fresh candidate id: `conv-{yyyymmddHHMMSS}-{8 hex}`.
  pub fn generate(now: DateTime<Utc>) -> Self {
    let entropy = Uuid::new_v4().simple().to_string();
    Self(format!("conv-{}-{}", now.format("%Y%m%d%H%M%S"), &entropy[..8]))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ConversationId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl TryFrom<String> for ConversationId {
  type Error = Error;

  fn try_from(raw: String) -> Result<Self> { Self::parse(&raw) }
}

impl From<ConversationId> for String {
  fn from(id: ConversationId) -> Self { id.0 }
}

// ─── Lifecycle ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
  /// Id assigned, messages held by the client, nothing persisted.
  Active,
  Saved,
  Deleted,
}

// ─── Persisted metadata ──────────────────────────────────────────────────────

/// Contents of `conversations/{owner}/{id}/meta.json`. Its presence is what
/// makes a conversation "saved".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMeta {
  pub conversation_id: ConversationId,
  pub owner:           String,
  pub name:            String,
  /// `true` while the name was generated rather than chosen by the user.
  pub auto_named:      bool,
  pub created_at:      DateTime<Utc>,
  pub last_modified:   DateTime<Utc>,
  pub message_count:   usize,
  /// Digest of the persisted message list.
  pub etag:            String,
}

// ─── Read models ─────────────────────────────────────────────────────────────

/// One row of `list_conversations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
  pub conversation_id: ConversationId,
  pub name:            String,
  pub last_modified:   DateTime<Utc>,
  pub uploads:         Vec<Upload>,
}

/// A saved conversation loaded in full.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
  pub conversation_id: ConversationId,
  pub name:            String,
  pub last_modified:   DateTime<Utc>,
  pub messages:        Vec<Message>,
  pub uploads:         Vec<Upload>,
  pub file_analysis:   Option<serde_json::Value>,
  pub etag:            String,
}

/// Trim and check a user-chosen conversation name.
pub fn validate_name(name: &str, max_len: usize) -> Result<String> {
  let trimmed = name.trim();
  if trimmed.is_empty() {
    return Err(Error::Validation("name cannot be empty".into()));
  }
  if trimmed.chars().count() > max_len {
    return Err(Error::Validation(format!(
      "name must be at most {max_len} characters"
    )));
  }
  Ok(trimmed.to_string())
}

/// Cut `text` to at most `max_len` characters on a char boundary.
pub(crate) fn truncate_chars(text: &str, max_len: usize) -> String {
  text.chars().take(max_len).collect()
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn generated_ids_parse() {
    let now = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
    let id = ConversationId::generate(now);
    assert!(id.as_str().starts_with("conv-20250102030405-"));
    assert_eq!(ConversationId::parse(id.as_str()).unwrap(), id);
  }

  #[test]
  fn ids_with_path_characters_are_rejected() {
    for raw in ["", "../x", "a/b", "a b", &"x".repeat(65)] {
      assert!(matches!(ConversationId::parse(raw), Err(Error::Validation(_))));
    }
  }

  #[test]
  fn name_validation_trims_and_bounds() {
    assert_eq!(validate_name("  Weekly review ", 50).unwrap(), "Weekly review");
    assert!(validate_name("   ", 50).is_err());
    assert!(validate_name(&"n".repeat(51), 50).is_err());
    assert!(validate_name(&"n".repeat(50), 50).is_ok());
  }
}
