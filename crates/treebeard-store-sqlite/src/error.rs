//! Error type for `treebeard-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored size that does not fit the platform's integer types.
  #[error("corrupt size {size} for object {key}")]
  CorruptSize { key: String, size: i64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
