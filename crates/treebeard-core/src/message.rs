//! Chat messages.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  User,
  Assistant,
  System,
}

/// A single turn. Invisible messages reach the LLM but are never persisted
/// or shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
  pub role:      Role,
  pub content:   String,
  #[serde(default)]
  pub invisible: bool,
}

impl Message {
  pub fn user(content: impl Into<String>) -> Self {
    Self { role: Role::User, content: content.into(), invisible: false }
  }

  pub fn assistant(content: impl Into<String>) -> Self {
    Self { role: Role::Assistant, content: content.into(), invisible: false }
  }

  /// An invisible system note, e.g. "the user switched to lucius".
  pub fn system_note(content: impl Into<String>) -> Self {
    Self { role: Role::System, content: content.into(), invisible: true }
  }

  pub fn is_blank(&self) -> bool { self.content.trim().is_empty() }
}

/// The persistable subset of `messages`, in order.
pub fn visible(messages: &[Message]) -> Vec<Message> {
  messages.iter().filter(|m| !m.invisible).cloned().collect()
}

/// Normalise client-supplied history: drop blank messages and repeated
/// contents, keeping the first occurrence.
pub fn normalize_history(messages: Vec<Message>) -> Vec<Message> {
  let mut seen = HashSet::new();
  messages
    .into_iter()
    .filter(|m| !m.is_blank())
    .filter(|m| seen.insert(m.content.clone()))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn visible_drops_invisible_messages() {
    let messages = vec![Message::user("hi"), Message::system_note("switched")];
    assert_eq!(visible(&messages), vec![Message::user("hi")]);
  }

  #[test]
  fn normalize_drops_blank_and_duplicate_content() {
    let history = vec![
      Message::user("hi"),
      Message::assistant("  "),
      Message::assistant("hello"),
      Message::user("hi"),
    ];
    let cleaned = normalize_history(history);
    assert_eq!(cleaned, vec![Message::user("hi"), Message::assistant("hello")]);
  }

  #[test]
  fn invisible_defaults_to_false_on_the_wire() {
    let m: Message =
      serde_json::from_str(r#"{"role":"assistant","content":"x"}"#).unwrap();
    assert!(!m.invisible);
  }
}
