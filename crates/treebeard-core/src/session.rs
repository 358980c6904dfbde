//! Chat Session Manager: conversation identity, save, list, load, rename,
//! and delete.
//!
//! A conversation is saved iff its `meta.json` exists. Saving writes
//! `messages.json` first and `meta.json` last, so a reader that sees the
//! meta also sees the messages it describes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  conversation::{
    Conversation, ConversationId, ConversationMeta, ConversationSummary, validate_name,
  },
  etag::compute_etag,
  keys,
  message::{self, Message},
  pipeline,
  settings::Settings,
  store::{self, BlobStore},
};

/// How many fresh ids to try before giving up.
const ID_ATTEMPTS: usize = 5;

/// A validated save, waiting for its name.
#[derive(Debug, Clone)]
pub struct SavePlan {
  pub owner:           String,
  pub conversation_id: ConversationId,
  /// Visible messages only.
  pub messages:        Vec<Message>,
  pub existing:        Option<ConversationMeta>,
}

impl SavePlan {
  /// A name is generated for new conversations and for ones whose name was
  /// never chosen by the user.
  pub fn needs_name(&self) -> bool { self.existing.as_ref().is_none_or(|m| m.auto_named) }
}

/// Result of a rename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renamed {
  Changed,
  Unchanged,
}

pub struct Sessions<S> {
  store:    Arc<S>,
  settings: Arc<Settings>,
}

impl<S: BlobStore> Sessions<S> {
  pub fn new(store: Arc<S>, settings: Arc<Settings>) -> Self { Self { store, settings } }

  /// Pick an id not used by any persisted conversation or upload.
  pub async fn allocate_id(&self, owner: &str, now: DateTime<Utc>) -> Result<ConversationId> {
    for _ in 0..ID_ATTEMPTS {
      let candidate = ConversationId::generate(now);
      if !self.is_known(owner, &candidate).await?
        && store::list(&*self.store, &keys::blob_prefix(candidate.as_str())).await?.is_empty()
      {
        debug!(conversation_id = %candidate, "allocated conversation id");
        return Ok(candidate);
      }
      warn!(conversation_id = %candidate, "conversation id collision; retrying");
    }
    Err(Error::store(IdExhausted))
  }

  /// Whether anything at all is persisted under this conversation.
  pub async fn is_known(&self, owner: &str, id: &ConversationId) -> Result<bool> {
    let prefix = keys::conversation_prefix(owner, id.as_str());
    Ok(!store::list(&*self.store, &prefix).await?.is_empty())
  }

  pub async fn meta(&self, owner: &str, id: &ConversationId) -> Result<Option<ConversationMeta>> {
    store::get_json(&*self.store, &keys::conversation_meta(owner, id.as_str())).await
  }

  /// The persisted visible messages, if the conversation was ever saved.
  pub async fn history(&self, owner: &str, id: &ConversationId) -> Result<Option<Vec<Message>>> {
    store::get_json(&*self.store, &keys::conversation_messages(owner, id.as_str())).await
  }

  pub async fn count(&self, owner: &str) -> Result<usize> {
    Ok(saved_ids(&*self.store, owner).await?.len())
  }

  pub async fn list(&self, owner: &str) -> Result<Vec<ConversationSummary>> {
    list_summaries(&*self.store, owner).await
  }

  /// Validate a save and enforce capacity. Writes nothing.
  pub async fn prepare_save(
    &self,
    owner: &str,
    id: ConversationId,
    messages: &[Message],
  ) -> Result<SavePlan> {
    let visible = message::visible(messages);
    if visible.iter().all(Message::is_blank) {
      return Err(Error::Validation("nothing to save: no visible messages".into()));
    }

    let existing = self.meta(owner, &id).await?;
    if existing.is_none() {
      let limit = self.settings.conversation_capacity;
      if self.count(owner).await? >= limit {
        return Err(Error::CapacityExceeded { limit });
      }
    }

    Ok(SavePlan {
      owner: owner.to_string(),
      conversation_id: id,
      messages: visible,
      existing,
    })
  }

  /// Persist a prepared save. `name` is `Some((name, auto_named))` when a new
  /// name should replace the current one.
  pub async fn commit_save(
    &self,
    plan: SavePlan,
    name: Option<(String, bool)>,
    now: DateTime<Utc>,
  ) -> Result<ConversationMeta> {
    let SavePlan { owner, conversation_id, messages, existing } = plan;
    let id = conversation_id.as_str();

    let (name, auto_named) = match (name, &existing) {
      (Some(named), _) => named,
      (None, Some(meta)) => (meta.name.clone(), meta.auto_named),
      (None, None) => (fallback_name(&messages, self.settings.max_name_len), true),
    };
    let created_at = existing.as_ref().map_or(now, |m| m.created_at);
    let last_modified = existing.as_ref().map_or(now, |m| m.last_modified.max(now));

    let meta = ConversationMeta {
      conversation_id: conversation_id.clone(),
      owner: owner.clone(),
      name,
      auto_named,
      created_at,
      last_modified,
      message_count: messages.len(),
      etag: compute_etag(&messages),
    };

    store::put_json(&*self.store, &keys::conversation_messages(&owner, id), &messages).await?;
    store::put_json(&*self.store, &keys::conversation_meta(&owner, id), &meta).await?;
    info!(
      conversation_id = %conversation_id,
      messages = meta.message_count,
      new = existing.is_none(),
      "conversation saved"
    );
    Ok(meta)
  }

  /// A saved conversation with its uploads and latest file analysis.
  pub async fn load(&self, owner: &str, id: &ConversationId) -> Result<Conversation> {
    let meta = self
      .meta(owner, id)
      .await?
      .ok_or_else(|| Error::ConversationNotFound(id.to_string()))?;
    let messages = self.history(owner, id).await?.unwrap_or_default();
    let uploads = pipeline::list_uploads(&*self.store, owner, id).await?;
    let file_analysis = pipeline::latest_analysis(&uploads);

    Ok(Conversation {
      conversation_id: meta.conversation_id,
      name: meta.name,
      last_modified: meta.last_modified,
      messages,
      uploads,
      file_analysis,
      etag: meta.etag,
    })
  }

  pub async fn rename(
    &self,
    owner: &str,
    id: &ConversationId,
    name: &str,
    now: DateTime<Utc>,
  ) -> Result<(Renamed, ConversationMeta)> {
    let name = validate_name(name, self.settings.max_name_len)?;
    let mut meta = self
      .meta(owner, id)
      .await?
      .ok_or_else(|| Error::ConversationNotFound(id.to_string()))?;
    if meta.name == name {
      return Ok((Renamed::Unchanged, meta));
    }

    meta.name = name;
    meta.auto_named = false;
    meta.last_modified = meta.last_modified.max(now);
    store::put_json(&*self.store, &keys::conversation_meta(owner, id.as_str()), &meta).await?;
    info!(conversation_id = %id, name = %meta.name, "conversation renamed");
    Ok((Renamed::Changed, meta))
  }

  /// Remove the conversation record. Uploads must already be gone. Returns
  /// whether a saved conversation existed.
  pub async fn delete(&self, owner: &str, id: &ConversationId) -> Result<bool> {
    let store = &*self.store;
    let existed = self.meta(owner, id).await?.is_some();
    store::delete(store, &keys::conversation_messages(owner, id.as_str())).await?;
    store::delete(store, &keys::conversation_meta(owner, id.as_str())).await?;
    for leftover in store::list(store, &keys::conversation_prefix(owner, id.as_str())).await? {
      store::delete(store, &leftover.key).await?;
    }
    Ok(existed)
  }
}

/// Ids of every saved conversation of `owner`, ordered by key.
async fn saved_ids<S: BlobStore>(store: &S, owner: &str) -> Result<Vec<ConversationId>> {
  let objects = store::list(store, &keys::conversations_root(owner)).await?;
  Ok(
    objects
      .iter()
      .filter_map(|o| keys::conversation_id_of_meta(owner, &o.key))
      .filter_map(|id| ConversationId::parse(id).ok())
      .collect(),
  )
}

/// Saved conversations of `owner`, most recently modified first.
pub(crate) async fn list_summaries<S: BlobStore>(
  store: &S,
  owner: &str,
) -> Result<Vec<ConversationSummary>> {
  let mut summaries = Vec::new();
  for id in saved_ids(store, owner).await? {
    let key = keys::conversation_meta(owner, id.as_str());
    // Deleted between list and read.
    let Some(meta) = store::get_json::<_, ConversationMeta>(store, &key).await? else {
      continue;
    };
    let uploads = pipeline::list_uploads(store, owner, &id).await?;
    summaries.push(ConversationSummary {
      conversation_id: meta.conversation_id,
      name: meta.name,
      last_modified: meta.last_modified,
      uploads,
    });
  }
  summaries.sort_by(|a, b| {
    b.last_modified
      .cmp(&a.last_modified)
      .then_with(|| a.conversation_id.cmp(&b.conversation_id))
  });
  Ok(summaries)
}

/// Name derived from the first user message, used when no generated name is
/// available.
pub fn fallback_name(messages: &[Message], max_len: usize) -> String {
  let first = messages
    .iter()
    .find(|m| m.role == message::Role::User && !m.is_blank())
    .map(|m| m.content.split_whitespace().collect::<Vec<_>>().join(" "));
  match first {
    Some(text) => crate::conversation::truncate_chars(&text, max_len),
    None => "Untitled conversation".to_string(),
  }
}

#[derive(Debug, thiserror::Error)]
#[error("could not allocate a unique conversation id after {ID_ATTEMPTS} attempts")]
struct IdExhausted;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fallback_name_uses_first_user_message() {
    let messages = vec![
      Message::assistant("Hello!"),
      Message::user("  how many   critical alerts are open in the monorepo right now? "),
    ];
    let name = fallback_name(&messages, 20);
    assert_eq!(name, "how many critical al");
  }

  #[test]
  fn fallback_name_without_user_messages() {
    assert_eq!(fallback_name(&[Message::assistant("hi")], 50), "Untitled conversation");
  }
}
