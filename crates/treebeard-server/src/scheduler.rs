//! Background refresh of proxy dashboards.
//!
//! At startup every proxy is read once so that dashboards with no data get a
//! bootstrap trigger. After that, each proxy is refreshed on a fixed interval.
//! Refreshes go through the facade, so an outstanding trigger is never sent
//! twice.

use std::time::Duration;

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{info, warn};
use treebeard_api::Service;
use treebeard_core::{Treebeard, external::Collaborators, store::BlobStore, user::User};

fn proxy_ids<S, X>(service: &Treebeard<S, X>) -> Vec<String>
where
  S: BlobStore + 'static,
  X: Collaborators + 'static,
{
  service.proxies().map(|o| o.id().to_string()).collect()
}

/// Read every proxy dashboard once.
pub async fn warm_up<S, X>(service: &Treebeard<S, X>)
where
  S: BlobStore + 'static,
  X: Collaborators + 'static,
{
  let user = User::system();
  for id in proxy_ids(service) {
    match service.get_dashboard(&user, &id).await {
      Ok(view) => info!(
        dashboard_id = %id,
        stale = view.stale,
        refresh_pending = view.refresh_pending,
        "dashboard warmed"
      ),
      Err(e) => warn!(dashboard_id = %id, error = %e, "dashboard warm-up failed"),
    }
  }
}

/// Trigger a refresh of every proxy dashboard. Returns how many triggers were
/// actually sent.
pub async fn refresh_all<S, X>(service: &Treebeard<S, X>) -> usize
where
  S: BlobStore + 'static,
  X: Collaborators + 'static,
{
  let user = User::system();
  let mut sent = 0;
  for id in proxy_ids(service) {
    match service.refresh_dashboard(&user, &id).await {
      Ok(accepted) if !accepted.already_pending => sent += 1,
      Ok(_) => {}
      Err(e) => warn!(dashboard_id = %id, error = %e, "scheduled refresh failed"),
    }
  }
  sent
}

/// Spawn the periodic refresh loop. A zero interval disables it.
pub fn spawn<S, X>(service: Service<S, X>, interval: Duration) -> Option<JoinHandle<()>>
where
  S: BlobStore + 'static,
  X: Collaborators + 'static,
{
  if interval.is_zero() {
    info!("scheduled refresh disabled");
    return None;
  }
  Some(tokio::spawn(async move {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; warm-up already covered it.
    ticker.tick().await;
    loop {
      ticker.tick().await;
      let sent = refresh_all(&service).await;
      info!(sent, "scheduled refresh pass complete");
    }
  }))
}
