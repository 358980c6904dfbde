//! User — the authenticated caller and owner of conversations.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// Identity of the caller. Not created or destroyed by this crate; the
/// transport layer authenticates and hands one to every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub email:  String,
  #[serde(default)]
  pub name:   String,
  #[serde(default)]
  pub groups: Vec<String>,
}

impl User {
  pub fn new(email: impl Into<String>) -> Self {
    Self { email: email.into(), name: String::new(), groups: Vec::new() }
  }

  /// The identity used by background jobs (warm-up, scheduled refresh).
  pub fn system() -> Self {
    Self {
      email:  "system@treebeard.local".to_string(),
      name:   "System".to_string(),
      groups: Vec::new(),
    }
  }

  /// Owner namespace used in store keys: the lower-cased email with ASCII
  /// letters and digits kept and every other byte written as `_xx` hex.
  /// Distinct emails always map to distinct namespaces.
  pub fn namespace(&self) -> String {
    let email = self.email.trim().to_lowercase();
    let mut out = String::with_capacity(email.len() * 2);
    for byte in email.bytes() {
      if byte.is_ascii_alphanumeric() {
        out.push(char::from(byte));
      } else {
        let _ = write!(out, "_{byte:02x}");
      }
    }
    out
  }

  pub fn display_name(&self) -> &str {
    if self.name.trim().is_empty() { &self.email } else { &self.name }
  }
}
