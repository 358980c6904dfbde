//! Tunables for the orchestration layer.

use chrono::TimeDelta;
use serde::Deserialize;

/// Core settings. Every field has a default so a server config may omit the
/// whole `[settings]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// Saved conversations allowed per owner.
  pub conversation_capacity: usize,
  /// Longest conversation name accepted by rename, in characters.
  pub max_name_len:          usize,
  /// Longest original filename accepted for an upload, in characters.
  pub max_filename_len:      usize,
  /// A dataset older than this is reported as stale.
  pub stale_after_secs:      i64,
  /// How long a triggered refresh counts as outstanding.
  pub refresh_pending_secs:  i64,
  /// Lifetime of an issued upload descriptor.
  pub upload_ttl_secs:       i64,
  /// Size ceiling written into every upload policy.
  pub max_upload_bytes:      u64,
  /// Public base URL of the store-side upload receiver.
  pub upload_base_url:       String,
  /// Key for signing upload policies. Empty means "generate at startup".
  pub signing_secret:        String,
  /// Leading system prompt for every chat completion.
  pub system_prompt:         String,
}

impl Settings {
  pub fn stale_after(&self) -> TimeDelta {
    TimeDelta::seconds(self.stale_after_secs)
  }

  pub fn refresh_pending(&self) -> TimeDelta {
    TimeDelta::seconds(self.refresh_pending_secs)
  }

  pub fn upload_ttl(&self) -> TimeDelta { TimeDelta::seconds(self.upload_ttl_secs) }
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      conversation_capacity: 10,
      max_name_len:          50,
      max_filename_len:      255,
      stale_after_secs:      15 * 60,
      refresh_pending_secs:  5 * 60,
      upload_ttl_secs:       15 * 60,
      max_upload_bytes:      10 * 1024 * 1024,
      upload_base_url:       "http://localhost:8080".to_string(),
      signing_secret:        String::new(),
      system_prompt:         DEFAULT_SYSTEM_PROMPT.to_string(),
    }
  }
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Treebeard, the assistant \
for an internal operations site. You have access to several dashboards, each \
backed by an oracle that provides near-real-time data about one part of the \
system, and you keep track of the user's conversations across them. When you \
are given dashboard data, user facts, or file analysis, work it into your \
answer naturally. Keep replies brief, direct and conversational.";
