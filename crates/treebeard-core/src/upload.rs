//! Upload records, the extension allow-list, and signed upload policies.
//!
//! The core never sees uploaded bytes. It hands out a descriptor carrying a
//! signed [`UploadPolicy`]; the store-side receiver verifies the policy with
//! the same [`UploadSigner`] and enforces its size ceiling while writing.

use std::{collections::BTreeMap, fmt, str::FromStr};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD as B64};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{Error, Result, conversation::ConversationId};

// ─── Extension allow-list ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum UploadExtension {
  Txt,
  Pdf,
  Doc,
  Docx,
  Csv,
  Json,
  Js,
  Py,
  Xml,
}

impl UploadExtension {
  pub const ALL: [UploadExtension; 9] = [
    Self::Txt,
    Self::Pdf,
    Self::Doc,
    Self::Docx,
    Self::Csv,
    Self::Json,
    Self::Js,
    Self::Py,
    Self::Xml,
  ];

  /// The extension with its leading dot, e.g. `".pdf"`.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Txt => ".txt",
      Self::Pdf => ".pdf",
      Self::Doc => ".doc",
      Self::Docx => ".docx",
      Self::Csv => ".csv",
      Self::Json => ".json",
      Self::Js => ".js",
      Self::Py => ".py",
      Self::Xml => ".xml",
    }
  }
}

impl FromStr for UploadExtension {
  type Err = Error;

  /// Accepts `pdf`, `.pdf` or `.PDF`.
  fn from_str(raw: &str) -> Result<Self> {
    let normalized = raw.trim().to_ascii_lowercase();
    let dotted = if normalized.starts_with('.') {
      normalized
    } else {
      format!(".{normalized}")
    };
    Self::ALL
      .into_iter()
      .find(|ext| ext.as_str() == dotted)
      .ok_or_else(|| Error::Validation(format!("unsupported file type: {raw:?}")))
  }
}

impl fmt::Display for UploadExtension {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl TryFrom<String> for UploadExtension {
  type Error = Error;

  fn try_from(raw: String) -> Result<Self> { raw.parse() }
}

impl From<UploadExtension> for String {
  fn from(ext: UploadExtension) -> Self { ext.as_str().to_string() }
}

/// Trim and check an uploaded file's original name.
pub fn validate_filename(name: &str, max_len: usize) -> Result<String> {
  let trimmed = name.trim();
  if trimmed.is_empty() {
    return Err(Error::Validation("filename cannot be empty".into()));
  }
  if trimmed.chars().count() > max_len {
    return Err(Error::Validation(format!(
      "filename must be at most {max_len} characters"
    )));
  }
  Ok(trimmed.to_string())
}

/// Whether `upload_key` is a bare key produced by the pipeline
/// (`{hex}{extension}`), i.e. safe to use as a key segment.
pub fn is_upload_key(upload_key: &str) -> bool {
  !upload_key.is_empty()
    && upload_key.len() <= 64
    && upload_key.chars().all(|c| c.is_ascii_alphanumeric() || c == '.')
    && !upload_key.starts_with('.')
}

// ─── Upload record ───────────────────────────────────────────────────────────

/// A file linked to exactly one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upload {
  /// Key segment under the conversation's blob prefix, e.g. `"3fa9….pdf"`.
  pub key:               String,
  /// Full store key of the uploaded object.
  pub object_key:        String,
  pub original_filename: String,
  pub extension:         UploadExtension,
  /// Known once the upload is finalized.
  pub size:              Option<u64>,
  pub requested_at:      DateTime<Utc>,
  pub uploaded_at:       Option<DateTime<Utc>>,
  pub analysis:          Option<serde_json::Value>,
  /// Why analysis is missing, if the analysis collaborator failed.
  pub analysis_error:    Option<String>,
}

impl Upload {
  pub fn is_finalized(&self) -> bool { self.uploaded_at.is_some() }
}

// ─── Descriptor & policy ─────────────────────────────────────────────────────

/// What the receiver is allowed to accept for one direct upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPolicy {
  pub key:               String,
  pub owner:             String,
  pub conversation_id:   ConversationId,
  pub max_bytes:         u64,
  pub expires_at:        DateTime<Utc>,
  pub original_filename: String,
  pub extension:         UploadExtension,
}

impl UploadPolicy {
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool { now >= self.expires_at }
}

/// A time-limited credential for a direct client-to-store write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadDescriptor {
  pub url:        String,
  pub method:     String,
  /// Must accompany the upload (as query parameters) verbatim.
  pub fields:     BTreeMap<String, String>,
  pub expires_at: DateTime<Utc>,
}

/// Result of `request_upload_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadGrant {
  pub descriptor:      UploadDescriptor,
  /// Full store key the client is writing to.
  pub file_name:       String,
  pub upload_key:      String,
  pub conversation_id: ConversationId,
}

// ─── Signing ─────────────────────────────────────────────────────────────────

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 signer for upload policies.
#[derive(Clone)]
pub struct UploadSigner {
  key: Vec<u8>,
}

impl fmt::Debug for UploadSigner {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("UploadSigner").finish_non_exhaustive()
  }
}

impl UploadSigner {
  pub fn new(secret: impl AsRef<[u8]>) -> Self { Self { key: secret.as_ref().to_vec() } }

  fn mac(&self, message: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(&self.key)
      .map_err(|e| Error::Validation(format!("unusable upload signing key: {e}")))?;
    mac.update(message);
    Ok(mac)
  }

  /// Encode and sign `policy`. Returns `(policy, signature)` as they appear in
  /// the descriptor fields.
  pub fn sign(&self, policy: &UploadPolicy) -> Result<(String, String)> {
    let encoded = B64.encode(serde_json::to_vec(policy)?);
    let signature = hex::encode(self.mac(encoded.as_bytes())?.finalize().into_bytes());
    Ok((encoded, signature))
  }

  /// Check `signature` in constant time and decode the policy. Expiry is the
  /// caller's check.
  pub fn verify(&self, encoded: &str, signature: &str) -> Result<UploadPolicy> {
    let signature = hex::decode(signature.trim())
      .map_err(|_| Error::Forbidden("upload signature is not valid hex".into()))?;
    self
      .mac(encoded.as_bytes())?
      .verify_slice(&signature)
      .map_err(|_| Error::Forbidden("upload signature mismatch".into()))?;
    let raw = B64
      .decode(encoded)
      .map_err(|_| Error::Forbidden("upload policy is not valid base64".into()))?;
    Ok(serde_json::from_slice(&raw)?)
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeDelta;

  use super::*;

  fn policy() -> UploadPolicy {
    UploadPolicy {
      key:               "blob_files/conv-1/abc.pdf".into(),
      owner:             "ada_40example_2ecom".into(),
      conversation_id:   ConversationId::parse("conv-1").unwrap(),
      max_bytes:         10 * 1024 * 1024,
      expires_at:        Utc::now() + TimeDelta::minutes(15),
      original_filename: "report.pdf".into(),
      extension:         UploadExtension::Pdf,
    }
  }

  #[test]
  fn extension_parsing_is_lenient_about_dots_and_case() {
    assert_eq!("pdf".parse::<UploadExtension>().unwrap(), UploadExtension::Pdf);
    assert_eq!(".DOCX".parse::<UploadExtension>().unwrap(), UploadExtension::Docx);
    assert!(matches!(".exe".parse::<UploadExtension>(), Err(Error::Validation(_))));
    assert!(".html".parse::<UploadExtension>().is_err());
  }

  #[test]
  fn signed_policy_verifies() {
    let signer = UploadSigner::new("secret");
    let policy = policy();
    let (encoded, signature) = signer.sign(&policy).unwrap();
    assert_eq!(signer.verify(&encoded, &signature).unwrap(), policy);
  }

  #[test]
  fn tampered_policy_or_wrong_key_is_forbidden() {
    let signer = UploadSigner::new("secret");
    let (encoded, signature) = signer.sign(&policy()).unwrap();

    let mut bigger = policy();
    bigger.max_bytes = u64::MAX;
    let (tampered, _) = signer.sign(&bigger).unwrap();
    assert!(matches!(signer.verify(&tampered, &signature), Err(Error::Forbidden(_))));

    let other = UploadSigner::new("other secret");
    assert!(matches!(other.verify(&encoded, &signature), Err(Error::Forbidden(_))));
  }

  #[test]
  fn long_secrets_are_accepted() {
    let signer = UploadSigner::new([7u8; 200]);
    let (encoded, signature) = signer.sign(&policy()).unwrap();
    assert!(signer.verify(&encoded, &signature).is_ok());
  }

  #[test]
  fn signatures_match_rfc_4231() {
    // Test case 2: key "Jefe".
    let signer = UploadSigner::new("Jefe");
    let mac = signer.mac(b"what do ya want for nothing?").unwrap().finalize().into_bytes();
    assert_eq!(
      hex::encode(mac),
      "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
    );
  }

  #[test]
  fn malformed_or_truncated_signatures_are_forbidden() {
    let signer = UploadSigner::new("secret");
    let (encoded, signature) = signer.sign(&policy()).unwrap();
    assert!(matches!(signer.verify(&encoded, "not hex"), Err(Error::Forbidden(_))));
    assert!(matches!(signer.verify(&encoded, &signature[..32]), Err(Error::Forbidden(_))));
    assert!(matches!(signer.verify(&encoded, ""), Err(Error::Forbidden(_))));
    assert!(signer.verify(&encoded, &signature.to_uppercase()).is_ok());
  }

  #[test]
  fn upload_keys_are_single_segments() {
    assert!(is_upload_key("0123abcd.pdf"));
    assert!(!is_upload_key("a/b.pdf"));
    assert!(!is_upload_key("..pdf"));
    assert!(!is_upload_key(""));
  }

  #[test]
  fn filename_validation() {
    assert_eq!(validate_filename(" notes.txt ", 255).unwrap(), "notes.txt");
    assert!(validate_filename("  ", 255).is_err());
    assert!(validate_filename(&"f".repeat(256), 255).is_err());
  }
}
