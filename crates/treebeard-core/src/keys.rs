//! Persisted key layout.
//!
//! | Key | Content |
//! |-----|---------|
//! | `{dashboard_id}/data.json` | [`OracleDataset`](crate::dataset::OracleDataset) |
//! | `{dashboard_id}/refresh.json` | [`RefreshMarker`](crate::dataset::RefreshMarker) |
//! | `conversations/{owner}/{id}/meta.json` | [`ConversationMeta`](crate::conversation::ConversationMeta) |
//! | `conversations/{owner}/{id}/messages.json` | visible messages |
//! | `conversations/{owner}/{id}/uploads/{key}.json` | [`Upload`](crate::upload::Upload) record |
//! | `blob_files/{id}/{key}` | uploaded bytes |
//! | `user_facts/{owner}.json` | [`UserFacts`](crate::oracle::home::UserFacts) |

pub fn dataset(dashboard_id: &str) -> String { format!("{dashboard_id}/data.json") }

pub fn refresh_marker(dashboard_id: &str) -> String {
  format!("{dashboard_id}/refresh.json")
}

pub fn conversations_root(owner: &str) -> String { format!("conversations/{owner}/") }

pub fn conversation_prefix(owner: &str, id: &str) -> String {
  format!("conversations/{owner}/{id}/")
}

pub fn conversation_meta(owner: &str, id: &str) -> String {
  format!("conversations/{owner}/{id}/meta.json")
}

pub fn conversation_messages(owner: &str, id: &str) -> String {
  format!("conversations/{owner}/{id}/messages.json")
}

pub fn upload_records(owner: &str, id: &str) -> String {
  format!("conversations/{owner}/{id}/uploads/")
}

pub fn upload_record(owner: &str, id: &str, upload_key: &str) -> String {
  format!("conversations/{owner}/{id}/uploads/{upload_key}.json")
}

pub fn blob_prefix(id: &str) -> String { format!("blob_files/{id}/") }

pub fn blob(id: &str, upload_key: &str) -> String {
  format!("blob_files/{id}/{upload_key}")
}

pub fn user_facts(owner: &str) -> String { format!("user_facts/{owner}.json") }

/// Extract the conversation id from a `.../{id}/meta.json` key under
/// `conversations_root(owner)`.
pub fn conversation_id_of_meta<'k>(owner: &str, key: &'k str) -> Option<&'k str> {
  let root = conversations_root(owner);
  key
    .strip_prefix(root.as_str())?
    .strip_suffix("/meta.json")
    .filter(|id| !id.contains('/'))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn meta_key_round_trips_to_id() {
    let key = conversation_meta("ada_40example_2ecom", "conv-1");
    assert_eq!(conversation_id_of_meta("ada_40example_2ecom", &key), Some("conv-1"));
  }

  #[test]
  fn nested_keys_are_not_meta() {
    let key = "conversations/ada/conv-1/uploads/meta.json";
    assert_eq!(conversation_id_of_meta("ada", key), None);
    assert_eq!(conversation_id_of_meta("bob", &conversation_meta("ada", "x")), None);
  }
}
