//! Request authentication.
//!
//! Tried in order: an identity header set by a trusted access proxy, HTTP
//! Basic against configured users, then the development user when running
//! in development. Anything else is `401`.

use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  extract::{Request, State},
  http::HeaderMap,
  middleware::Next,
  response::Response,
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use serde::Deserialize;
use tracing::debug;
use treebeard_core::user::User;

use crate::error::Error;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
  /// Header carrying the caller's email, e.g. `x-auth-request-email`. Only
  /// set this when every request passes through a proxy that strips it from
  /// client input.
  pub identity_header: Option<String>,
  pub name_header:     Option<String>,
  /// Comma-separated group list.
  pub groups_header:   Option<String>,
  pub users:           Vec<BasicUser>,
  /// Email used for unauthenticated requests in development.
  pub dev_user:        Option<String>,
}

/// A Basic-auth account.
#[derive(Clone, Debug, Deserialize)]
pub struct BasicUser {
  pub username:      String,
  pub email:         String,
  #[serde(default)]
  pub name:          String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
}

pub struct Authenticator {
  config:      AuthConfig,
  development: bool,
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
  headers
    .get(name)
    .and_then(|v| v.to_str().ok())
    .map(str::trim)
    .filter(|v| !v.is_empty())
}

impl Authenticator {
  pub fn new(config: AuthConfig, development: bool) -> Self { Self { config, development } }

  pub fn authenticate(&self, headers: &HeaderMap) -> Result<User, Error> {
    if let Some(user) = self.from_identity_header(headers) {
      return Ok(user);
    }
    if headers.contains_key(axum::http::header::AUTHORIZATION) {
      return self.verify_basic(headers);
    }
    if self.development
      && let Some(email) = &self.config.dev_user
    {
      return Ok(User { name: "Developer".to_string(), ..User::new(email) });
    }
    Err(Error::Unauthorized)
  }

  fn from_identity_header(&self, headers: &HeaderMap) -> Option<User> {
    let email = header_str(headers, self.config.identity_header.as_deref()?)?;
    let name = self
      .config
      .name_header
      .as_deref()
      .and_then(|h| header_str(headers, h))
      .unwrap_or_default();
    let groups = self
      .config
      .groups_header
      .as_deref()
      .and_then(|h| header_str(headers, h))
      .map(|g| {
        g.split(',')
          .map(str::trim)
          .filter(|g| !g.is_empty())
          .map(String::from)
          .collect()
      })
      .unwrap_or_default();
    Some(User { email: email.to_string(), name: name.to_string(), groups })
  }

  fn verify_basic(&self, headers: &HeaderMap) -> Result<User, Error> {
    let encoded = header_str(headers, "authorization")
      .and_then(|v| v.strip_prefix("Basic "))
      .ok_or(Error::Unauthorized)?;

    let decoded = B64.decode(encoded).map_err(|_| Error::Unauthorized)?;
    let creds = std::str::from_utf8(&decoded).map_err(|_| Error::Unauthorized)?;
    let (username, password) = creds.split_once(':').ok_or(Error::Unauthorized)?;

    let account = self
      .config
      .users
      .iter()
      .find(|u| u.username == username)
      .ok_or(Error::Unauthorized)?;

    let parsed_hash =
      PasswordHash::new(&account.password_hash).map_err(|_| Error::Unauthorized)?;
    Argon2::default()
      .verify_password(password.as_bytes(), &parsed_hash)
      .map_err(|_| Error::Unauthorized)?;

    Ok(User { name: account.name.clone(), ..User::new(&account.email) })
  }
}

/// Middleware: authenticate and attach the [`User`] to the request.
pub async fn require_user(
  State(auth): State<Arc<Authenticator>>,
  mut req: Request,
  next: Next,
) -> Result<Response, Error> {
  let user = auth.authenticate(req.headers())?;
  debug!(user = %user.email, "authenticated");
  req.extensions_mut().insert(user);
  Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
  use argon2::{PasswordHasher, password_hash::SaltString};
  use axum::http::{HeaderValue, header};
  use rand_core::OsRng;

  use super::*;

  fn hash(password: &str) -> String {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default().hash_password(password.as_bytes(), &salt).unwrap().to_string()
  }

  fn config() -> AuthConfig {
    AuthConfig {
      identity_header: Some("x-auth-request-email".into()),
      groups_header: Some("x-auth-request-groups".into()),
      users: vec![BasicUser {
        username:      "ops".into(),
        email:         "ops@example.com".into(),
        name:          "Ops".into(),
        password_hash: hash("secret"),
      }],
      dev_user: Some("dev@example.com".into()),
      ..AuthConfig::default()
    }
  }

  fn basic(user: &str, pass: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let value = format!("Basic {}", B64.encode(format!("{user}:{pass}")));
    headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
    headers
  }

  #[test]
  fn identity_header_wins() {
    let auth = Authenticator::new(config(), false);
    let mut headers = HeaderMap::new();
    headers.insert("x-auth-request-email", HeaderValue::from_static("ada@example.com"));
    headers.insert("x-auth-request-groups", HeaderValue::from_static("eng, sec"));
    let user = auth.authenticate(&headers).unwrap();
    assert_eq!(user.email, "ada@example.com");
    assert_eq!(user.groups, vec!["eng", "sec"]);
  }

  #[test]
  fn correct_basic_credentials() {
    let auth = Authenticator::new(config(), false);
    let user = auth.authenticate(&basic("ops", "secret")).unwrap();
    assert_eq!(user.email, "ops@example.com");
    assert_eq!(user.display_name(), "Ops");
  }

  #[test]
  fn wrong_password_or_user() {
    let auth = Authenticator::new(config(), true);
    assert!(matches!(auth.authenticate(&basic("ops", "wrong")), Err(Error::Unauthorized)));
    assert!(matches!(auth.authenticate(&basic("nobody", "secret")), Err(Error::Unauthorized)));
  }

  #[test]
  fn dev_user_only_in_development() {
    let headers = HeaderMap::new();
    assert!(matches!(
      Authenticator::new(config(), false).authenticate(&headers),
      Err(Error::Unauthorized)
    ));
    let user = Authenticator::new(config(), true).authenticate(&headers).unwrap();
    assert_eq!(user.email, "dev@example.com");
  }

  #[test]
  fn invalid_base64() {
    let auth = Authenticator::new(config(), true);
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic !!!not-base64!!!"));
    assert!(matches!(auth.authenticate(&headers), Err(Error::Unauthorized)));
  }
}
