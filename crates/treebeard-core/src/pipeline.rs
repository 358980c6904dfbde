//! Upload Pipeline: issue upload descriptors, record uploads against their
//! conversation, and run file analysis once the bytes have landed.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  conversation::ConversationId,
  external::FileAnalyzer,
  keys,
  settings::Settings,
  store::{self, BlobStore},
  upload::{
    Upload, UploadDescriptor, UploadExtension, UploadGrant, UploadPolicy, UploadSigner,
    is_upload_key, validate_filename,
  },
};

pub struct UploadPipeline<S> {
  store:    Arc<S>,
  settings: Arc<Settings>,
  signer:   UploadSigner,
}

/// Check a requested upload before anything is allocated.
pub fn validate_request(
  filename: &str,
  extension: &str,
  max_filename_len: usize,
) -> Result<(String, UploadExtension)> {
  let extension: UploadExtension = extension.parse()?;
  let filename = validate_filename(filename, max_filename_len)?;
  Ok((filename, extension))
}

impl<S: BlobStore> UploadPipeline<S> {
  pub fn new(store: Arc<S>, settings: Arc<Settings>, signer: UploadSigner) -> Self {
    Self { store, settings, signer }
  }

  pub fn signer(&self) -> &UploadSigner { &self.signer }

  /// Record a pending upload and return a signed descriptor for it.
  pub async fn request_upload_url(
    &self,
    owner: &str,
    conversation_id: ConversationId,
    filename: String,
    extension: UploadExtension,
    now: DateTime<Utc>,
  ) -> Result<UploadGrant> {
    let upload_key = format!("{}{}", Uuid::new_v4().simple(), extension.as_str());
    let object_key = keys::blob(conversation_id.as_str(), &upload_key);
    let expires_at = now + self.settings.upload_ttl();

    let record = Upload {
      key: upload_key.clone(),
      object_key: object_key.clone(),
      original_filename: filename.clone(),
      extension,
      size: None,
      requested_at: now,
      uploaded_at: None,
      analysis: None,
      analysis_error: None,
    };
    let record_key = keys::upload_record(owner, conversation_id.as_str(), &upload_key);
    store::put_json(&*self.store, &record_key, &record).await?;

    let policy = UploadPolicy {
      key: object_key.clone(),
      owner: owner.to_string(),
      conversation_id: conversation_id.clone(),
      max_bytes: self.settings.max_upload_bytes,
      expires_at,
      original_filename: filename,
      extension,
    };
    let (encoded, signature) = self.signer.sign(&policy)?;
    let base = self.settings.upload_base_url.trim_end_matches('/');

    info!(
      conversation_id = %conversation_id,
      upload_key = %upload_key,
      extension = %extension,
      "upload url issued"
    );
    Ok(UploadGrant {
      descriptor: UploadDescriptor {
        url: format!("{base}/blob/{object_key}"),
        method: "PUT".to_string(),
        fields: BTreeMap::from([
          ("policy".to_string(), encoded),
          ("signature".to_string(), signature),
        ]),
        expires_at,
      },
      file_name: object_key,
      upload_key,
      conversation_id,
    })
  }

  async fn record(&self, owner: &str, id: &ConversationId, upload_key: &str) -> Result<Upload> {
    let key = keys::upload_record(owner, id.as_str(), upload_key);
    store::get_json(&*self.store, &key)
      .await?
      .ok_or_else(|| Error::UploadNotFound(upload_key.to_string()))
  }

  /// Confirm the bytes are in the store, record their size, and attach the
  /// analysis. An analysis failure is recorded on the upload, not returned.
  pub async fn finalize<A: FileAnalyzer>(
    &self,
    owner: &str,
    id: &ConversationId,
    upload_key: &str,
    analyzer: &A,
  ) -> Result<Upload> {
    let upload_key = resolve_upload_key(id, upload_key)?;
    let mut record = self.record(owner, id, &upload_key).await?;
    let info = store::head(&*self.store, &record.object_key)
      .await?
      .ok_or_else(|| Error::UploadNotFound(format!("{upload_key} has not been uploaded")))?;

    record.size = Some(info.size);
    record.uploaded_at = Some(info.last_modified);
    match analyzer.analyze(owner, &record).await {
      Ok(analysis) => {
        record.analysis = analysis;
        record.analysis_error = None;
      }
      Err(e) => {
        warn!(upload_key = %upload_key, error = %e, "file analysis failed");
        record.analysis = None;
        record.analysis_error = Some(e.to_string());
      }
    }

    let key = keys::upload_record(owner, id.as_str(), &upload_key);
    store::put_json(&*self.store, &key, &record).await?;
    info!(
      conversation_id = %id,
      upload_key = %upload_key,
      size = info.size,
      analysed = record.analysis.is_some(),
      "upload finalized"
    );
    Ok(record)
  }

  /// Delete one of the owner's uploads, bytes first, then the record.
  /// Bytes are only touched through the owner's record, so a key that is not
  /// theirs deletes nothing. Returns whether the upload existed.
  pub async fn delete(&self, owner: &str, id: &ConversationId, upload_key: &str) -> Result<bool> {
    let upload_key = resolve_upload_key(id, upload_key)?;
    let store = &*self.store;
    let record_key = keys::upload_record(owner, id.as_str(), &upload_key);
    let Some(upload) = store::get_json::<_, Upload>(store, &record_key).await? else {
      return Ok(false);
    };
    store::delete(store, &upload.object_key).await?;
    store::delete(store, &record_key).await?;
    info!(conversation_id = %id, upload_key = %upload_key, "upload deleted");
    Ok(true)
  }

  /// Delete every upload the owner recorded against the conversation.
  /// Returns how many were removed.
  pub async fn delete_all(&self, owner: &str, id: &ConversationId) -> Result<usize> {
    let store = &*self.store;
    let mut removed = 0;
    for upload in list_uploads(store, owner, id).await? {
      store::delete(store, &upload.object_key).await?;
      store::delete(store, &keys::upload_record(owner, id.as_str(), &upload.key)).await?;
      removed += 1;
    }
    Ok(removed)
  }

  pub async fn list(&self, owner: &str, id: &ConversationId) -> Result<Vec<Upload>> {
    list_uploads(&*self.store, owner, id).await
  }

  /// Analysis of the named upload (bare key or full object key).
  pub async fn analysis_for(
    &self,
    owner: &str,
    id: &ConversationId,
    file_name: &str,
  ) -> Result<Option<Value>> {
    let upload_key = resolve_upload_key(id, file_name)?;
    Ok(self.record(owner, id, &upload_key).await?.analysis)
  }

  /// Analysis of the most recently uploaded file that has one.
  pub async fn latest_analysis(&self, owner: &str, id: &ConversationId) -> Result<Option<Value>> {
    Ok(latest_analysis(&self.list(owner, id).await?))
  }
}

/// Accept either a bare upload key or the full `blob_files/{id}/{key}` form.
/// A full key pointing into another conversation is forbidden.
fn resolve_upload_key(id: &ConversationId, raw: &str) -> Result<String> {
  let raw = raw.trim();
  let bare = if raw.contains('/') {
    raw
      .strip_prefix(keys::blob_prefix(id.as_str()).as_str())
      .ok_or_else(|| {
        Error::Forbidden(format!("{raw} does not belong to conversation {id}"))
      })?
  } else {
    raw
  };
  if !is_upload_key(bare) {
    return Err(Error::Validation(format!("malformed upload key {raw:?}")));
  }
  Ok(bare.to_string())
}

/// Upload records of a conversation, oldest request first.
pub(crate) async fn list_uploads<S: BlobStore>(
  store: &S,
  owner: &str,
  id: &ConversationId,
) -> Result<Vec<Upload>> {
  let mut uploads = Vec::new();
  for object in store::list(store, &keys::upload_records(owner, id.as_str())).await? {
    if let Some(upload) = store::get_json::<_, Upload>(store, &object.key).await? {
      uploads.push(upload);
    }
  }
  uploads.sort_by(|a, b| a.requested_at.cmp(&b.requested_at).then_with(|| a.key.cmp(&b.key)));
  Ok(uploads)
}

pub(crate) fn latest_analysis(uploads: &[Upload]) -> Option<Value> {
  uploads
    .iter()
    .filter(|u| u.is_finalized() && u.analysis.is_some())
    .max_by_key(|u| (u.uploaded_at, u.requested_at))
    .and_then(|u| u.analysis.clone())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn id() -> ConversationId { ConversationId::parse("conv-1").unwrap() }

  #[test]
  fn bare_and_full_keys_resolve() {
    assert_eq!(resolve_upload_key(&id(), "ab12.pdf").unwrap(), "ab12.pdf");
    assert_eq!(
      resolve_upload_key(&id(), "blob_files/conv-1/ab12.pdf").unwrap(),
      "ab12.pdf"
    );
  }

  #[test]
  fn foreign_full_keys_are_forbidden() {
    assert!(matches!(
      resolve_upload_key(&id(), "blob_files/conv-2/ab12.pdf"),
      Err(Error::Forbidden(_))
    ));
    assert!(matches!(
      resolve_upload_key(&id(), "blob_files/conv-1/../x.pdf"),
      Err(Error::Validation(_))
    ));
  }

  fn upload(key: &str, uploaded: Option<i64>, analysis: Option<Value>) -> Upload {
    let base = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    Upload {
      key: key.into(),
      object_key: keys::blob("conv-1", key),
      original_filename: key.into(),
      extension: UploadExtension::Json,
      size: uploaded.map(|_| 2),
      requested_at: base,
      uploaded_at: uploaded.map(|s| base + chrono::TimeDelta::seconds(s)),
      analysis,
      analysis_error: None,
    }
  }

  #[test]
  fn latest_analysis_only_considers_finalized_uploads() {
    let uploads = vec![
      upload("a.json", Some(10), Some(serde_json::json!({ "n": 1 }))),
      upload("b.json", Some(20), Some(serde_json::json!({ "n": 2 }))),
      upload("c.json", None, Some(serde_json::json!({ "n": 3 }))),
    ];
    assert_eq!(latest_analysis(&uploads), Some(serde_json::json!({ "n": 2 })));
    assert_eq!(latest_analysis(&uploads[2..]), None);
  }

  #[test]
  fn request_validation_rejects_before_allocation() {
    assert!(matches!(validate_request("a.exe", ".exe", 255), Err(Error::Validation(_))));
    assert!(matches!(validate_request("", ".pdf", 255), Err(Error::Validation(_))));
    let (name, ext) = validate_request(" q3.pdf ", "pdf", 255).unwrap();
    assert_eq!((name.as_str(), ext), ("q3.pdf", UploadExtension::Pdf));
  }
}
