//! Conversions between column values and core types.
//!
//! Timestamps are stored as RFC 3339 strings with microsecond precision.

use chrono::{DateTime, SecondsFormat, Utc};
use treebeard_core::store::ObjectInfo;

use crate::{Error, Result};

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

/// An `objects` row without its body, as read from SQLite.
pub struct RawObjectInfo {
  pub key:           String,
  pub size:          i64,
  pub last_modified: String,
}

impl RawObjectInfo {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self { key: row.get(0)?, size: row.get(1)?, last_modified: row.get(2)? })
  }

  pub fn into_info(self) -> Result<ObjectInfo> {
    let size = u64::try_from(self.size)
      .map_err(|_| Error::CorruptSize { key: self.key.clone(), size: self.size })?;
    Ok(ObjectInfo {
      last_modified: decode_dt(&self.last_modified)?,
      key: self.key,
      size,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn timestamps_round_trip_at_microsecond_precision() {
    let now = Utc::now();
    let decoded = decode_dt(&encode_dt(now)).unwrap();
    assert_eq!(decoded.timestamp_micros(), now.timestamp_micros());
  }

  #[test]
  fn garbage_timestamps_are_errors() {
    assert!(matches!(decode_dt("yesterday"), Err(Error::DateParse(_))));
  }
}
