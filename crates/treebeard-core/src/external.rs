//! Interfaces to the external collaborators: the refresh compute, the LLM,
//! and the file-analysis hook.
//!
//! Implementations live outside the core (HTTP adapters in the server, fakes
//! in tests) and report failures as [`Error::Collaborator`](crate::Error).

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Result, message::Message, upload::Upload};

/// Input to one text completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
  pub system:     String,
  pub messages:   Vec<Message>,
  pub max_tokens: u32,
}

/// Opaque text completion.
pub trait Completion: Send + Sync {
  fn complete<'a>(
    &'a self,
    request: &'a CompletionRequest,
  ) -> impl Future<Output = Result<String>> + Send + 'a;
}

/// Fire-and-forget trigger for a dashboard's out-of-process recomputation.
///
/// Must return once the compute has accepted the request; it must not wait
/// for the new dataset.
pub trait RefreshTrigger: Send + Sync {
  fn trigger<'a>(
    &'a self,
    dashboard_id: &'a str,
  ) -> impl Future<Output = Result<()>> + Send + 'a;
}

/// Structured analysis of an uploaded object. `Ok(None)` means no analysis
/// is available for this file.
pub trait FileAnalyzer: Send + Sync {
  fn analyze<'a>(
    &'a self,
    owner: &'a str,
    upload: &'a Upload,
  ) -> impl Future<Output = Result<Option<Value>>> + Send + 'a;
}

/// Everything the facade needs from the outside world besides storage.
pub trait Collaborators: RefreshTrigger + Completion + FileAnalyzer {}

impl<T> Collaborators for T where T: RefreshTrigger + Completion + FileAnalyzer {}
