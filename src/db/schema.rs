//! Database schema and row types

use chrono::{DateTime, Utc};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS plan_slots (
    key TEXT PRIMARY KEY,
    document TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS session_snapshots (
    session_id TEXT PRIMARY KEY,
    snapshot TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_session_snapshots_updated ON session_snapshots(updated_at DESC);
";

/// A stored plan document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSlot {
    pub key: String,
    /// Serialized `PlanDocument`
    pub document: String,
    pub updated_at: DateTime<Utc>,
}

/// A stored session snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRow {
    pub session_id: String,
    /// Opaque snapshot blob
    pub snapshot: String,
    pub updated_at: DateTime<Utc>,
}
