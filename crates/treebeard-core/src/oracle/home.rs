//! Home oracle: the caller's own conversations and remembered facts, plus a
//! status line for every other dashboard.
//!
//! It has no external compute, so its view is never stale and refresh is a
//! no-op. Other dashboards are summarised from their cached datasets only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, json};

use super::{OracleEnv, ProxyOracle};
use crate::{
  Result,
  dataset::{DashboardView, RefreshAccepted},
  keys,
  session,
  store::{self, BlobStore},
};

pub const HOME_ID: &str = "treebeard";

/// Contents of `user_facts/{owner}.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFacts {
  #[serde(default)]
  pub facts:      Vec<String>,
  #[serde(default)]
  pub updated_at: Option<DateTime<Utc>>,
}

/// The owner's fact sheet, empty if none has been written.
pub async fn load_facts<S: BlobStore>(store: &S, owner: &str) -> Result<UserFacts> {
  Ok(store::get_json(store, &keys::user_facts(owner)).await?.unwrap_or_default())
}

#[derive(Debug, Clone)]
pub struct HomeOracle {
  context:    String,
  proxies:    Vec<ProxyOracle>,
  /// Every dashboard id in the registry, home included.
  dashboards: Vec<String>,
}

impl HomeOracle {
  pub fn new(proxies: Vec<ProxyOracle>) -> Self {
    let mut dashboards = vec![HOME_ID.to_string()];
    dashboards.extend(proxies.iter().map(|p| p.id().to_string()));
    Self {
      context: "You are on the home dashboard. You can see the user's saved \
                conversations across every dashboard, the facts you have \
                remembered about them, and the current status of every other \
                dashboard. Help them pick up where they left off or point \
                them to the right dashboard."
        .to_string(),
      proxies,
      dashboards,
    }
  }

  pub fn id(&self) -> &str { HOME_ID }

  pub fn context(&self) -> &str { &self.context }

  pub async fn get_dashboard<S, T>(&self, env: &OracleEnv<'_, S, T>) -> Result<DashboardView>
  where
    S: BlobStore,
  {
    let owner = env.user.namespace();
    let facts: UserFacts = match store::get_json(env.store, &keys::user_facts(&owner)).await? {
      Some(facts) => facts,
      None => {
        self.initialize_data(env).await?;
        UserFacts::default()
      }
    };
    let conversations = session::list_summaries(env.store, &owner).await?;

    let mut status = Map::new();
    for proxy in &self.proxies {
      let view = proxy.get_dashboard(env).await?;
      status.insert(
        view.dashboard_id,
        json!({ "updated_at": view.updated_at, "stale": view.stale, "stats": view.stats }),
      );
    }

    let updated_at = conversations
      .iter()
      .map(|c| c.last_modified)
      .chain(facts.updated_at)
      .max();
    let capacity = env.settings.conversation_capacity;
    let stats = json!({
      "conversation_count": conversations.len(),
      "capacity": capacity,
      "remaining": capacity.saturating_sub(conversations.len()),
      "fact_count": facts.facts.len(),
      "dashboards": self.dashboards,
      "dashboard_status": status,
    });
    let payload = json!({
      "user": { "name": env.user.display_name(), "email": env.user.email },
      "conversations": conversations,
      "facts": facts.facts,
      "dashboards": self.dashboards,
    });

    Ok(DashboardView {
      dashboard_id: HOME_ID.to_string(),
      payload,
      stats,
      updated_at,
      stale: false,
      refresh_pending: false,
    })
  }

  pub fn refresh(&self) -> RefreshAccepted {
    RefreshAccepted {
      dashboard_id:    HOME_ID.to_string(),
      already_pending: false,
      requested_at:    None,
    }
  }

  /// Create an empty fact sheet for the caller if none exists.
  pub async fn initialize_data<S, T>(&self, env: &OracleEnv<'_, S, T>) -> Result<()>
  where
    S: BlobStore,
  {
    let key = keys::user_facts(&env.user.namespace());
    if store::head(env.store, &key).await?.is_none() {
      store::put_json(env.store, &key, &UserFacts::default()).await?;
    }
    Ok(())
  }
}
