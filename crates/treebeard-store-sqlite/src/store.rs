//! [`SqliteStore`]: the SQLite implementation of [`BlobStore`].

use std::path::Path;

use bytes::Bytes;
use chrono::Utc;
use rusqlite::OptionalExtension as _;
use treebeard_core::store::{BlobStore, ObjectInfo};

use crate::{
  Error, Result,
  encode::{RawObjectInfo, encode_dt},
  schema::SCHEMA,
};

/// A Treebeard blob store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

impl BlobStore for SqliteStore {
  type Error = Error;

  async fn get(&self, key: &str) -> Result<Option<Bytes>> {
    let key = key.to_owned();

    let body: Option<Vec<u8>> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT body FROM objects WHERE key = ?1",
              rusqlite::params![key],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    Ok(body.map(Bytes::from))
  }

  async fn head(&self, key: &str) -> Result<Option<ObjectInfo>> {
    let key = key.to_owned();

    let raw: Option<RawObjectInfo> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT key, size, last_modified FROM objects WHERE key = ?1",
              rusqlite::params![key],
              RawObjectInfo::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawObjectInfo::into_info).transpose()
  }

  async fn put(&self, key: &str, body: Bytes) -> Result<ObjectInfo> {
    let info = ObjectInfo {
      key:           key.to_owned(),
      size:          body.len() as u64,
      last_modified: Utc::now(),
    };

    let key_str = info.key.clone();
    let size = body.len() as i64;
    let at_str = encode_dt(info.last_modified);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO objects (key, body, size, last_modified)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(key) DO UPDATE SET
             body          = excluded.body,
             size          = excluded.size,
             last_modified = excluded.last_modified",
          rusqlite::params![key_str, body.as_ref(), size, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(info)
  }

  async fn delete(&self, key: &str) -> Result<bool> {
    let key = key.to_owned();

    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM objects WHERE key = ?1", rusqlite::params![key])?)
      })
      .await?;

    Ok(removed > 0)
  }

  async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
    let prefix = prefix.to_owned();

    let raws: Vec<RawObjectInfo> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT key, size, last_modified FROM objects
           WHERE substr(key, 1, length(?1)) = ?1
           ORDER BY key",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![prefix], RawObjectInfo::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawObjectInfo::into_info).collect()
  }
}
