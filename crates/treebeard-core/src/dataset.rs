//! Oracle datasets, refresh markers, and the dashboard read model.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Contents of `{dashboard_id}/data.json`, written only by the external
/// refresh compute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleDataset {
  pub dashboard_id: String,
  pub payload:      Value,
  pub updated_at:   DateTime<Utc>,
}

impl OracleDataset {
  /// The dataset that replaces `previous` with `payload`. `updated_at` never
  /// moves backwards, even if the writer's clock does.
  pub fn successor(
    dashboard_id: &str,
    previous: Option<&OracleDataset>,
    payload: Value,
    now: DateTime<Utc>,
  ) -> Self {
    let updated_at = match previous {
      Some(prev) if prev.updated_at > now => prev.updated_at,
      _ => now,
    };
    Self { dashboard_id: dashboard_id.to_string(), payload, updated_at }
  }
}

/// Contents of `{dashboard_id}/refresh.json`: when the last accepted trigger
/// was sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshMarker {
  pub requested_at: DateTime<Utc>,
}

impl RefreshMarker {
  /// A trigger is outstanding if no dataset has landed since it was sent and
  /// it is younger than `window`.
  pub fn is_pending(
    &self,
    dataset_updated_at: Option<DateTime<Utc>>,
    window: TimeDelta,
    now: DateTime<Utc>,
  ) -> bool {
    let superseded = dataset_updated_at.is_some_and(|at| at >= self.requested_at);
    !superseded && now - self.requested_at < window
  }
}

/// What `get_dashboard` returns: the best available data plus staleness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardView {
  pub dashboard_id:    String,
  pub payload:         Value,
  pub stats:           Value,
  pub updated_at:      Option<DateTime<Utc>>,
  pub stale:           bool,
  pub refresh_pending: bool,
}

/// Outcome of an accepted `refresh_dashboard`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshAccepted {
  pub dashboard_id:    String,
  /// `true` if an earlier trigger was still outstanding and nothing was sent.
  pub already_pending: bool,
  pub requested_at:    Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use serde_json::json;

  use super::*;

  fn at(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

  #[test]
  fn successor_never_goes_backwards() {
    let prev = OracleDataset::successor("lucius", None, json!({}), at(1_000));
    let next = OracleDataset::successor("lucius", Some(&prev), json!({"a": 1}), at(500));
    assert_eq!(next.updated_at, at(1_000));
    let later = OracleDataset::successor("lucius", Some(&next), json!({}), at(2_000));
    assert_eq!(later.updated_at, at(2_000));
  }

  #[test]
  fn marker_pending_until_dataset_lands_or_window_passes() {
    let marker = RefreshMarker { requested_at: at(1_000) };
    let window = TimeDelta::seconds(300);
    assert!(marker.is_pending(None, window, at(1_100)));
    assert!(marker.is_pending(Some(at(900)), window, at(1_100)));
    assert!(!marker.is_pending(Some(at(1_050)), window, at(1_100)));
    assert!(!marker.is_pending(None, window, at(1_300)));
  }
}
