//! Integration tests for `SqliteStore` against an in-memory database.

use bytes::Bytes;
use treebeard_core::{
  keys,
  message::Message,
  store::{self, BlobStore},
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

// ─── Objects ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn put_then_get_and_head() {
  let s = store().await;
  let info = s.put("lucius/data.json", Bytes::from_static(b"{}")).await.unwrap();
  assert_eq!(info.size, 2);

  let body = s.get("lucius/data.json").await.unwrap().unwrap();
  assert_eq!(&body[..], b"{}");

  let head = s.head("lucius/data.json").await.unwrap().unwrap();
  assert_eq!(head.key, "lucius/data.json");
  assert_eq!(head.size, 2);
  assert_eq!(head.last_modified.timestamp_micros(), info.last_modified.timestamp_micros());
}

#[tokio::test]
async fn missing_objects_are_none() {
  let s = store().await;
  assert!(s.get("nope").await.unwrap().is_none());
  assert!(s.head("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn put_replaces_the_whole_object() {
  let s = store().await;
  s.put("k", Bytes::from_static(b"a much longer first body")).await.unwrap();
  s.put("k", Bytes::from_static(b"short")).await.unwrap();

  assert_eq!(&s.get("k").await.unwrap().unwrap()[..], b"short");
  assert_eq!(s.head("k").await.unwrap().unwrap().size, 5);
  assert_eq!(s.list("").await.unwrap().len(), 1);
}

#[tokio::test]
async fn delete_reports_existence_and_is_idempotent() {
  let s = store().await;
  s.put("k", Bytes::from_static(b"x")).await.unwrap();
  assert!(s.delete("k").await.unwrap());
  assert!(!s.delete("k").await.unwrap());
  assert!(s.get("k").await.unwrap().is_none());
}

#[tokio::test]
async fn binary_bodies_survive() {
  let s = store().await;
  let body = Bytes::from((0u8..=255).collect::<Vec<_>>());
  s.put("blob_files/conv-1/a.pdf", body.clone()).await.unwrap();
  assert_eq!(s.get("blob_files/conv-1/a.pdf").await.unwrap().unwrap(), body);
}

// ─── Listing ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_is_prefix_scoped_and_ordered() {
  let s = store().await;
  for key in [
    "conversations/ada/conv-2/meta.json",
    "conversations/ada/conv-1/messages.json",
    "conversations/ada/conv-1/meta.json",
    "conversations/adam/conv-9/meta.json",
    "conversations/bob/conv-1/meta.json",
  ] {
    s.put(key, Bytes::from_static(b"{}")).await.unwrap();
  }

  let keys: Vec<String> = s
    .list("conversations/ada/")
    .await
    .unwrap()
    .into_iter()
    .map(|o| o.key)
    .collect();
  assert_eq!(keys, vec![
    "conversations/ada/conv-1/messages.json",
    "conversations/ada/conv-1/meta.json",
    "conversations/ada/conv-2/meta.json",
  ]);
}

#[tokio::test]
async fn list_treats_like_wildcards_literally() {
  let s = store().await;
  s.put("a_b/x", Bytes::from_static(b"1")).await.unwrap();
  s.put("axb/x", Bytes::from_static(b"1")).await.unwrap();
  s.put("a%/x", Bytes::from_static(b"1")).await.unwrap();

  assert_eq!(s.list("a_b/").await.unwrap().len(), 1);
  assert_eq!(s.list("a%").await.unwrap().len(), 1);
}

// ─── JSON helpers ────────────────────────────────────────────────────────────

#[tokio::test]
async fn json_helpers_work_against_sqlite() {
  let s = store().await;
  let key = keys::conversation_messages("ada_40example_2ecom", "conv-1");
  let messages = vec![Message::user("hi"), Message::assistant("hello")];
  store::put_json(&s, &key, &messages).await.unwrap();

  let loaded: Vec<Message> = store::get_json(&s, &key).await.unwrap().unwrap();
  assert_eq!(loaded, messages);
}

#[tokio::test]
async fn data_survives_reopening_a_file() {
  let dir = std::env::temp_dir().join(format!("treebeard-store-{}", std::process::id()));
  std::fs::create_dir_all(&dir).unwrap();
  let path = dir.join("store.db");
  let _ = std::fs::remove_file(&path);

  {
    let s = SqliteStore::open(&path).await.unwrap();
    s.put("k", Bytes::from_static(b"persisted")).await.unwrap();
  }
  let s = SqliteStore::open(&path).await.unwrap();
  assert_eq!(&s.get("k").await.unwrap().unwrap()[..], b"persisted");

  let _ = std::fs::remove_dir_all(&dir);
}
