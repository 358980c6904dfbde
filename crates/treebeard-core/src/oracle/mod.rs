//! Oracles: one data provider per dashboard.
//!
//! A proxy oracle fronts a dataset computed out of process; a home oracle
//! aggregates the caller's own conversations and facts. Both answer reads
//! from whatever was last committed and never wait on recomputation.

pub mod digest;
pub mod home;
pub mod proxy;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

pub use self::{digest::DigestKind, home::HomeOracle, proxy::ProxyOracle};
use crate::{
  Error, Result,
  dataset::{DashboardView, RefreshAccepted},
  external::RefreshTrigger,
  settings::Settings,
  store::BlobStore,
  user::User,
};

/// Everything an oracle operation may touch, borrowed for one call.
pub struct OracleEnv<'a, S, T> {
  pub store:    &'a S,
  pub trigger:  &'a T,
  pub user:     &'a User,
  pub settings: &'a Settings,
  pub now:      DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum Oracle {
  Home(HomeOracle),
  Proxy(ProxyOracle),
}

impl Oracle {
  pub fn id(&self) -> &str {
    match self {
      Self::Home(o) => o.id(),
      Self::Proxy(o) => o.id(),
    }
  }

  /// Domain description placed at the top of every composed context.
  pub fn context(&self) -> &str {
    match self {
      Self::Home(o) => o.context(),
      Self::Proxy(o) => o.context(),
    }
  }

  pub fn is_self_aggregating(&self) -> bool { matches!(self, Self::Home(_)) }

  pub async fn get_dashboard<S, T>(&self, env: &OracleEnv<'_, S, T>) -> Result<DashboardView>
  where
    S: BlobStore,
    T: RefreshTrigger,
  {
    match self {
      Self::Home(o) => o.get_dashboard(env).await,
      Self::Proxy(o) => o.get_dashboard(env).await,
    }
  }

  pub async fn refresh<S, T>(&self, env: &OracleEnv<'_, S, T>) -> Result<RefreshAccepted>
  where
    S: BlobStore,
    T: RefreshTrigger,
  {
    match self {
      Self::Home(o) => Ok(o.refresh()),
      Self::Proxy(o) => o.refresh(env).await,
    }
  }

  pub async fn initialize_data<S, T>(&self, env: &OracleEnv<'_, S, T>) -> Result<()>
  where
    S: BlobStore,
    T: RefreshTrigger,
  {
    match self {
      Self::Home(o) => o.initialize_data(env).await,
      Self::Proxy(o) => o.initialize_data(env).await,
    }
  }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Configuration of one proxy dashboard.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
  pub id:      String,
  pub context: String,
  pub digest:  DigestKind,
}

/// Maps dashboard ids to oracles. Built once at startup and immutable.
#[derive(Debug, Clone)]
pub struct OracleRegistry {
  oracles: Vec<Oracle>,
  aliases: BTreeMap<String, String>,
}

/// Id that resolves to the home oracle when a client sends no dashboard.
pub const NULL_ALIAS: &str = "null";

impl OracleRegistry {
  /// A registry with the home oracle plus `proxies`, in order.
  pub fn new(proxies: Vec<ProxyConfig>) -> Self {
    let proxies: Vec<ProxyOracle> = proxies
      .into_iter()
      .filter(|p| p.id != home::HOME_ID && p.id != NULL_ALIAS)
      .map(|p| ProxyOracle::new(p.id, p.context, p.digest))
      .collect();
    let mut oracles = vec![Oracle::Home(HomeOracle::new(proxies.clone()))];
    oracles.extend(proxies.into_iter().map(Oracle::Proxy));

    let aliases = BTreeMap::from([(NULL_ALIAS.to_string(), home::HOME_ID.to_string())]);
    Self { oracles, aliases }
  }

  /// The stock dashboards: home, security alerts, devices, environments.
  pub fn standard() -> Self { Self::new(standard_proxies()) }

  pub fn resolve(&self, dashboard_id: &str) -> Result<&Oracle> {
    let id = dashboard_id.trim();
    let id = if id.is_empty() { home::HOME_ID } else { id };
    let id = self.aliases.get(id).map(String::as_str).unwrap_or(id);
    self
      .oracles
      .iter()
      .find(|o| o.id() == id)
      .ok_or_else(|| Error::DashboardNotFound(dashboard_id.to_string()))
  }

  pub fn oracles(&self) -> &[Oracle] { &self.oracles }

  pub fn dashboard_ids(&self) -> Vec<&str> { self.oracles.iter().map(Oracle::id).collect() }
}

pub fn standard_proxies() -> Vec<ProxyConfig> {
  vec![
    ProxyConfig {
      id:      "lucius".into(),
      context: "You are monitoring GitHub security alerts across the \
                organisation's repositories: code scanning, secret scanning \
                and dependency alerts, with their rules, severities and the \
                applications they affect."
        .into(),
      digest:  DigestKind::SecurityAlerts,
    },
    ProxyConfig {
      id:      "devision".into(),
      context: "You are monitoring the fleet of managed company devices: OS \
                versions, hardware models, blueprints, MDM enrolment, agent \
                installation and how recently each device checked in."
        .into(),
      digest:  DigestKind::Devices,
    },
    ProxyConfig {
      id:      "env_config".into(),
      context: "You are monitoring deployed environments: their health, \
                type, level, customer and cluster."
        .into(),
      digest:  DigestKind::Environments,
    },
  ]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn null_and_empty_resolve_to_home() {
    let registry = OracleRegistry::standard();
    assert_eq!(registry.resolve("null").unwrap().id(), "treebeard");
    assert_eq!(registry.resolve("").unwrap().id(), "treebeard");
    assert!(registry.resolve("treebeard").unwrap().is_self_aggregating());
  }

  #[test]
  fn standard_registry_knows_its_proxies() {
    let registry = OracleRegistry::standard();
    assert_eq!(registry.dashboard_ids(), vec![
      "treebeard",
      "lucius",
      "devision",
      "env_config"
    ]);
    assert!(!registry.resolve("lucius").unwrap().is_self_aggregating());
  }

  #[test]
  fn unknown_dashboard_is_not_found() {
    let registry = OracleRegistry::standard();
    assert!(matches!(
      registry.resolve("nope"),
      Err(Error::DashboardNotFound(id)) if id == "nope"
    ));
  }

  #[test]
  fn proxies_cannot_shadow_home() {
    let registry = OracleRegistry::new(vec![ProxyConfig {
      id:      "treebeard".into(),
      context: "impostor".into(),
      digest:  DigestKind::Generic,
    }]);
    assert_eq!(registry.dashboard_ids(), vec!["treebeard"]);
  }
}
