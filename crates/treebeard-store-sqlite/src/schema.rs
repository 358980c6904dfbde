//! SQL schema for the Treebeard SQLite store.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per object. Keys are '/'-separated paths; the primary key index
-- also serves prefix listing in key order.
CREATE TABLE IF NOT EXISTS objects (
    key           TEXT PRIMARY KEY,
    body          BLOB NOT NULL,
    size          INTEGER NOT NULL,
    last_modified TEXT NOT NULL   -- RFC 3339 UTC
);

PRAGMA user_version = 1;
";
