//! Per-dashboard summarisers turning an opaque proxy payload into `stats`.
//!
//! Payloads are produced by external compute and are not trusted to be
//! complete: every missing or mistyped field degrades to a zero count.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Which summariser a proxy oracle uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestKind {
  /// Code-scanning, secret-scanning and dependency alerts.
  SecurityAlerts,
  /// Managed devices from the MDM.
  Devices,
  /// Deployed environments and their health.
  Environments,
  /// Unknown shape; reports only its size.
  Generic,
}

impl DigestKind {
  pub fn summarize(self, payload: &Value, now: DateTime<Utc>) -> Value {
    match self {
      Self::SecurityAlerts => security_alerts(payload),
      Self::Devices => devices(payload, now),
      Self::Environments => environments(payload),
      Self::Generic => generic(payload),
    }
  }
}

type Counts = BTreeMap<String, u64>;

fn bump(counts: &mut Counts, key: &str) { *counts.entry(key.to_string()).or_default() += 1; }

fn str_field<'v>(item: &'v Value, field: &str) -> Option<&'v str> {
  item.get(field).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Items of a collection that may arrive as an array, an object keyed by id,
/// or nested under `field`.
fn items<'v>(payload: &'v Value, field: &str) -> Vec<&'v Value> {
  let collection = payload.get(field).unwrap_or(payload);
  match collection {
    Value::Array(values) => values.iter().collect(),
    Value::Object(map) => map.values().filter(|v| v.is_object()).collect(),
    _ => Vec::new(),
  }
}

// ─── Security alerts ─────────────────────────────────────────────────────────

/// `apps/<name>` or `libs/<name>` for monorepo paths, else the first segment.
fn app_name(path: &str) -> String {
  let mut parts = path.split('/').filter(|p| !p.is_empty());
  match (parts.next(), parts.next()) {
    (Some(root @ ("apps" | "libs")), Some(name)) => format!("{root}/{name}"),
    (Some(first), _) => first.to_string(),
    (None, _) => "unknown".to_string(),
  }
}

fn rule_of(alert: &Value) -> String {
  match str_field(alert, "type") {
    Some("secret_scanning") => "secret_scanning_alerts".to_string(),
    Some("dependabot") => "dependency_alerts".to_string(),
    _ => str_field(alert, "rule").unwrap_or("unknown_rule").to_string(),
  }
}

fn security_alerts(payload: &Value) -> Value {
  let alerts = items(payload, "alerts");
  let mut types = Counts::new();
  let mut rules = Counts::new();
  let mut severities = Counts::new();
  let mut states = Counts::new();
  let mut apps = BTreeMap::<String, ()>::new();

  for alert in &alerts {
    bump(&mut types, str_field(alert, "type").unwrap_or("unknown"));
    bump(&mut rules, &rule_of(alert));
    let severity = str_field(alert, "severity").unwrap_or("unknown").to_lowercase();
    bump(&mut severities, &severity);
    let state = str_field(alert, "state").unwrap_or("unknown").to_lowercase();
    bump(&mut states, &state);
    apps.insert(app_name(str_field(alert, "path").unwrap_or("")), ());
  }

  let mut top_rules: Vec<(&String, &u64)> = rules.iter().collect();
  top_rules.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
  top_rules.truncate(5);

  json!({
    "total_alerts": alerts.len(),
    "type_counts": types,
    "rules_summary": {
      "total_rules": rules.len(),
      "top_rules": top_rules,
    },
    "total_apps": apps.len(),
    "severity_distribution": severities,
    "state_distribution": states,
  })
}

// ─── Devices ─────────────────────────────────────────────────────────────────

fn devices(payload: &Value, now: DateTime<Utc>) -> Value {
  let devices = items(payload, "devices");
  let mut os_versions = Counts::new();
  let mut models = Counts::new();
  let mut blueprints = Counts::new();
  let (mut mdm_enabled, mut agent_installed) = (0u64, 0u64);
  let mut last_seen: Counts =
    ["today", "week", "month", "older"].iter().map(|k| (k.to_string(), 0)).collect();

  for device in &devices {
    if let Some(os) = str_field(device, "os_version") {
      bump(&mut os_versions, os);
    }
    if let Some(model) = str_field(device, "model_kandji").or_else(|| str_field(device, "model")) {
      bump(&mut models, model);
    }
    if let Some(blueprint) = str_field(device, "blueprint") {
      bump(&mut blueprints, blueprint);
    }
    if str_field(device, "mdm_status") == Some("enabled") {
      mdm_enabled += 1;
    }
    if str_field(device, "agent_status") == Some("installed") {
      agent_installed += 1;
    }
    // Devices that never checked in are not bucketed; unparseable dates are.
    let Some(seen) = str_field(device, "last_seen_kandji").or_else(|| str_field(device, "last_seen"))
    else {
      continue;
    };
    let days = DateTime::parse_from_rfc3339(seen)
      .ok()
      .map(|dt| (now - dt.with_timezone(&Utc)).num_days());
    let bucket = match days {
      Some(days) if days <= 0 => "today",
      Some(days) if days <= 7 => "week",
      Some(days) if days <= 30 => "month",
      _ => "older",
    };
    bump(&mut last_seen, bucket);
  }

  let total = devices.len() as u64;
  json!({
    "total_devices": total,
    "os_versions": os_versions,
    "models": models,
    "blueprints": blueprints,
    "mdm_status": { "enabled": mdm_enabled, "disabled": total - mdm_enabled },
    "agent_status": { "installed": agent_installed, "missing": total - agent_installed },
    "last_seen": last_seen,
  })
}

// ─── Environments ────────────────────────────────────────────────────────────

fn is_healthy(status: &str) -> bool {
  matches!(status.to_lowercase().as_str(), "ok" | "healthy" | "up" | "pass")
}

fn environments(payload: &Value) -> Value {
  let envs = items(payload, "environments");
  let mut types = Counts::new();
  let mut levels = Counts::new();
  let mut customers = Counts::new();
  let mut clusters = Counts::new();
  let mut healthy = 0u64;

  for env in &envs {
    let health = str_field(env, "healthz").or_else(|| str_field(env, "health"));
    if health.is_some_and(is_healthy) {
      healthy += 1;
    }
    if let Some(kind) = str_field(env, "type") {
      bump(&mut types, kind);
    }
    if let Some(level) = str_field(env, "env_level").or_else(|| str_field(env, "level")) {
      bump(&mut levels, level);
    }
    if let Some(customer) = str_field(env, "customer") {
      bump(&mut customers, customer);
    }
    let cluster = str_field(env, "cluster")
      .or_else(|| env.get("cluster").and_then(|c| str_field(c, "name")));
    if let Some(cluster) = cluster {
      bump(&mut clusters, cluster);
    }
  }

  let total = envs.len() as u64;
  json!({
    "total_environments": total,
    "health_status": { "healthy": healthy, "unhealthy": total - healthy, "total": total },
    "environment_types": types,
    "environment_levels": levels,
    "customers": customers,
    "clusters": clusters,
  })
}

// ─── Generic ─────────────────────────────────────────────────────────────────

fn generic(payload: &Value) -> Value {
  let entries = match payload {
    Value::Array(values) => values.len(),
    Value::Object(map) => map.len(),
    Value::Null => 0,
    _ => 1,
  };
  json!({ "entries": entries })
}
