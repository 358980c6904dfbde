//! Error types for `treebeard-core`.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Rejected before any write; nothing changed.
  #[error("invalid input: {0}")]
  Validation(String),

  #[error(
    "maximum of {limit} saved conversations reached; delete one before saving \
     another"
  )]
  CapacityExceeded { limit: usize },

  #[error("dashboard not found: {0}")]
  DashboardNotFound(String),

  #[error("conversation not found: {0}")]
  ConversationNotFound(String),

  #[error("upload not found: {0}")]
  UploadNotFound(String),

  #[error("forbidden: {0}")]
  Forbidden(String),

  /// A backend read or write failed. Every write is a single-key put, so the
  /// caller may retry the whole operation.
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// The LLM, the analysis hook, or the refresh trigger failed.
  #[error("collaborator error: {0}")]
  Collaborator(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Validation(_) => ErrorKind::Validation,
      Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
      Self::DashboardNotFound(_)
      | Self::ConversationNotFound(_)
      | Self::UploadNotFound(_) => ErrorKind::NotFound,
      Self::Forbidden(_) => ErrorKind::Forbidden,
      Self::Store(_) => ErrorKind::TransientStore,
      Self::Collaborator(_) => ErrorKind::Collaborator,
      Self::Serialization(_) => ErrorKind::Internal,
    }
  }
}

/// The wire-level classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  #[serde(rename = "validation_error")]
  Validation,
  CapacityExceeded,
  NotFound,
  Forbidden,
  #[serde(rename = "transient_store_error")]
  TransientStore,
  #[serde(rename = "collaborator_error")]
  Collaborator,
  #[serde(rename = "internal_error")]
  Internal,
}

impl ErrorKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Validation => "validation_error",
      Self::CapacityExceeded => "capacity_exceeded",
      Self::NotFound => "not_found",
      Self::Forbidden => "forbidden",
      Self::TransientStore => "transient_store_error",
      Self::Collaborator => "collaborator_error",
      Self::Internal => "internal_error",
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
