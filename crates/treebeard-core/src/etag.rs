//! ETags for persisted message lists.
//!
//! An ETag is a SHA-256 over each message's role and content, length-prefixed
//! so that different splits of the same text never collide. It is reported on
//! save and load; saves are last-write-wins and do not check it.

use sha2::{Digest, Sha256};

use crate::message::{Message, Role};

/// Compute the ETag for `messages` in order.
pub fn compute_etag(messages: &[Message]) -> String {
  let mut hasher = Sha256::new();
  for message in messages {
    let role: u8 = match message.role {
      Role::User => 0,
      Role::Assistant => 1,
      Role::System => 2,
    };
    hasher.update([role]);
    hasher.update((message.content.len() as u64).to_le_bytes());
    hasher.update(message.content.as_bytes());
  }
  format!("\"{}\"", hex::encode(hasher.finalize()))
}
