//! Proxy oracle: serves a dataset computed out of process.
//!
//! A refresh is claimed by writing the refresh marker before the trigger is
//! sent, so a second request arriving while the first trigger is still in
//! flight sees it as pending. A failed trigger withdraws the marker.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::{DigestKind, OracleEnv};
use crate::{
  Result,
  dataset::{DashboardView, OracleDataset, RefreshAccepted, RefreshMarker},
  external::RefreshTrigger,
  keys,
  store::{self, BlobStore},
};

#[derive(Debug, Clone)]
pub struct ProxyOracle {
  id:      String,
  context: String,
  digest:  DigestKind,
}

/// Outcome of trying to record a refresh request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
  /// An earlier request is still outstanding; nothing should be sent.
  AlreadyPending(DateTime<Utc>),
  /// The marker is ours; the caller must send the trigger.
  Claimed(DateTime<Utc>),
}

impl ProxyOracle {
  pub fn new(id: impl Into<String>, context: impl Into<String>, digest: DigestKind) -> Self {
    Self { id: id.into(), context: context.into(), digest }
  }

  pub fn id(&self) -> &str { &self.id }

  pub fn context(&self) -> &str { &self.context }

  async fn dataset<S: BlobStore>(&self, store: &S) -> Result<Option<OracleDataset>> {
    store::get_json(store, &keys::dataset(&self.id)).await
  }

  async fn marker<S: BlobStore>(&self, store: &S) -> Result<Option<RefreshMarker>> {
    store::get_json(store, &keys::refresh_marker(&self.id)).await
  }

  /// The last committed dataset with staleness flags. Only reads the store;
  /// with no dataset the view is empty and stale.
  pub async fn get_dashboard<S, T>(&self, env: &OracleEnv<'_, S, T>) -> Result<DashboardView>
  where
    S: BlobStore,
  {
    let dataset = self.dataset(env.store).await?;
    let updated_at = dataset.as_ref().map(|d| d.updated_at);
    let refresh_pending = self
      .marker(env.store)
      .await?
      .is_some_and(|m| m.is_pending(updated_at, env.settings.refresh_pending(), env.now));
    let stale = updated_at.is_none_or(|at| env.now - at > env.settings.stale_after());

    let payload = dataset.map(|d| d.payload).unwrap_or_default();
    let stats = self.digest.summarize(&payload, env.now);
    Ok(DashboardView {
      dashboard_id: self.id.clone(),
      payload,
      stats,
      updated_at,
      stale,
      refresh_pending,
    })
  }

  /// Record a refresh request unless one is outstanding.
  pub async fn claim<S, T>(&self, env: &OracleEnv<'_, S, T>) -> Result<Claim>
  where
    S: BlobStore,
  {
    let updated_at = self.dataset(env.store).await?.map(|d| d.updated_at);
    if let Some(marker) = self.marker(env.store).await?
      && marker.is_pending(updated_at, env.settings.refresh_pending(), env.now)
    {
      return Ok(Claim::AlreadyPending(marker.requested_at));
    }
    let marker = RefreshMarker { requested_at: env.now };
    store::put_json(env.store, &keys::refresh_marker(&self.id), &marker).await?;
    Ok(Claim::Claimed(env.now))
  }

  /// Send the trigger for a claimed refresh. On failure the marker is
  /// withdrawn so the next request tries again.
  pub async fn send_trigger<S, T>(&self, env: &OracleEnv<'_, S, T>) -> Result<()>
  where
    S: BlobStore,
    T: RefreshTrigger,
  {
    if let Err(e) = env.trigger.trigger(&self.id).await {
      if let Err(undo) = store::delete(env.store, &keys::refresh_marker(&self.id)).await {
        warn!(dashboard = %self.id, error = %undo, "could not withdraw refresh marker");
      }
      return Err(e);
    }
    info!(dashboard = %self.id, "refresh triggered");
    Ok(())
  }

  /// Ask the external compute to recompute, unless a request is already
  /// outstanding. Returns once the trigger is accepted.
  pub async fn refresh<S, T>(&self, env: &OracleEnv<'_, S, T>) -> Result<RefreshAccepted>
  where
    S: BlobStore,
    T: RefreshTrigger,
  {
    let (already_pending, requested_at) = match self.claim(env).await? {
      Claim::AlreadyPending(at) => {
        info!(dashboard = %self.id, requested_at = %at, "refresh already pending");
        (true, at)
      }
      Claim::Claimed(at) => {
        self.send_trigger(env).await?;
        (false, at)
      }
    };
    Ok(RefreshAccepted {
      dashboard_id: self.id.clone(),
      already_pending,
      requested_at: Some(requested_at),
    })
  }

  /// Claim the first refresh of a dashboard that has never had a dataset.
  /// Returns whether the caller must send the trigger.
  pub async fn claim_bootstrap<S, T>(&self, env: &OracleEnv<'_, S, T>) -> Result<bool>
  where
    S: BlobStore,
  {
    if self.dataset(env.store).await?.is_some() {
      return Ok(false);
    }
    Ok(matches!(self.claim(env).await?, Claim::Claimed(_)))
  }

  /// Make sure a first dataset is on its way, waiting for the trigger to be
  /// accepted.
  pub async fn initialize_data<S, T>(&self, env: &OracleEnv<'_, S, T>) -> Result<()>
  where
    S: BlobStore,
    T: RefreshTrigger,
  {
    if self.claim_bootstrap(env).await? {
      self.send_trigger(env).await?;
    }
    Ok(())
  }
}
