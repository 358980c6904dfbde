//! The `BlobStore` trait and JSON helpers on top of it.
//!
//! The trait is implemented by storage backends (e.g.
//! `treebeard-store-sqlite`). Everything above it depends on this
//! abstraction, not on a concrete backend.

use std::future::Future;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};

use crate::{Error, Result};

/// Metadata of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
  pub key:           String,
  pub size:          u64,
  pub last_modified: DateTime<Utc>,
}

/// Key-addressed blob storage.
///
/// Backends must give atomic single-key replace (a reader sees the old or the
/// complete new body, never a mix) and read-after-write consistency. No
/// multi-key transactions are required.
pub trait BlobStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Read an object's body. `None` if absent.
  fn get<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<Bytes>, Self::Error>> + Send + 'a;

  /// Read an object's metadata. `None` if absent.
  fn head<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<ObjectInfo>, Self::Error>> + Send + 'a;

  /// Create or atomically replace an object.
  fn put<'a>(
    &'a self,
    key: &'a str,
    body: Bytes,
  ) -> impl Future<Output = Result<ObjectInfo, Self::Error>> + Send + 'a;

  /// Remove an object. Returns whether it existed; removing a missing key is
  /// not an error.
  fn delete<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// All objects whose key starts with `prefix`, ordered by key.
  fn list<'a>(
    &'a self,
    prefix: &'a str,
  ) -> impl Future<Output = Result<Vec<ObjectInfo>, Self::Error>> + Send + 'a;
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

pub async fn get_json<S, T>(store: &S, key: &str) -> Result<Option<T>>
where
  S: BlobStore,
  T: DeserializeOwned,
{
  match store.get(key).await.map_err(Error::store)? {
    Some(body) => Ok(Some(serde_json::from_slice(&body)?)),
    None => Ok(None),
  }
}

pub async fn put_json<S, T>(store: &S, key: &str, value: &T) -> Result<ObjectInfo>
where
  S: BlobStore,
  T: Serialize + Sync,
{
  let body = Bytes::from(serde_json::to_vec(value)?);
  store.put(key, body).await.map_err(Error::store)
}

pub async fn head<S: BlobStore>(store: &S, key: &str) -> Result<Option<ObjectInfo>> {
  store.head(key).await.map_err(Error::store)
}

pub async fn delete<S: BlobStore>(store: &S, key: &str) -> Result<bool> {
  store.delete(key).await.map_err(Error::store)
}

pub async fn list<S: BlobStore>(store: &S, prefix: &str) -> Result<Vec<ObjectInfo>> {
  store.list(prefix).await.map_err(Error::store)
}
