//! Database module for the study planner
//!
//! Durable plan slots and session snapshots in SQLite.

mod schema;

pub use schema::*;

use crate::plan::PlanDocument;
use crate::runtime::SnapshotStore;
use crate::tools::PlanStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Plan not found: {0}")]
    PlanNotFound(String),
    #[error("Stored plan is corrupt: {0}")]
    CorruptPlan(String),
    #[error("Database lock poisoned")]
    Poisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    fn run_migrations(&self) -> DbResult<()> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Plan Slots ====================

    /// Insert or replace the document under `key`
    pub fn put_plan(&self, key: &str, document: &str) -> DbResult<()> {
        self.conn()?.execute(
            "INSERT INTO plan_slots (key, document, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET document = excluded.document, updated_at = excluded.updated_at",
            params![key, document, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_plan(&self, key: &str) -> DbResult<PlanSlot> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT key, document, updated_at FROM plan_slots WHERE key = ?1",
            params![key],
            |row| {
                Ok(PlanSlot {
                    key: row.get(0)?,
                    document: row.get(1)?,
                    updated_at: parse_datetime(&row.get::<_, String>(2)?),
                })
            },
        )
        .optional()?
        .ok_or_else(|| DbError::PlanNotFound(key.to_string()))
    }

    pub fn delete_plan(&self, key: &str) -> DbResult<bool> {
        let deleted = self
            .conn()?
            .execute("DELETE FROM plan_slots WHERE key = ?1", params![key])?;
        Ok(deleted > 0)
    }

    // ==================== Session Snapshots ====================

    pub fn put_snapshot(&self, session_id: &str, snapshot: &str) -> DbResult<()> {
        self.conn()?.execute(
            "INSERT INTO session_snapshots (session_id, snapshot, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(session_id) DO UPDATE SET snapshot = excluded.snapshot, updated_at = excluded.updated_at",
            params![session_id, snapshot, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_snapshot(&self, session_id: &str) -> DbResult<Option<SnapshotRow>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT session_id, snapshot, updated_at FROM session_snapshots WHERE session_id = ?1",
                params![session_id],
                |row| {
                    Ok(SnapshotRow {
                        session_id: row.get(0)?,
                        snapshot: row.get(1)?,
                        updated_at: parse_datetime(&row.get::<_, String>(2)?),
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Snapshot session ids, most recently written first
    pub fn list_snapshots(&self) -> DbResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT session_id FROM session_snapshots ORDER BY updated_at DESC")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

// ============================================================================
// Store adapters
// ============================================================================

#[async_trait]
impl PlanStore for Database {
    async fn write(&self, key: &str, plan: &PlanDocument) -> Result<(), String> {
        let document = serde_json::to_string(plan).map_err(|e| e.to_string())?;
        self.put_plan(key, &document).map_err(|e| e.to_string())
    }

    async fn read(&self, key: &str) -> Result<Option<PlanDocument>, String> {
        match self.get_plan(key) {
            Ok(slot) => serde_json::from_str(&slot.document)
                .map(Some)
                .map_err(|e| DbError::CorruptPlan(e.to_string()).to_string()),
            Err(DbError::PlanNotFound(_)) => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }
}

#[async_trait]
impl SnapshotStore for Database {
    async fn save_snapshot(&self, session_id: &str, blob: &str) -> Result<(), String> {
        self.put_snapshot(session_id, blob).map_err(|e| e.to_string())
    }

    async fn load_snapshot(&self, session_id: &str) -> Result<Option<String>, String> {
        self.get_snapshot(session_id)
            .map(|row| row.map(|r| r.snapshot))
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{DocumentEvent, EventTime};

    fn document(summary: &str) -> PlanDocument {
        let at = |t: &str| EventTime {
            date_time: format!("2026-10-19T{t}"),
            time_zone: "Asia/Ho_Chi_Minh".to_string(),
        };
        PlanDocument {
            events: vec![DocumentEvent {
                summary: summary.to_string(),
                start: at("08:00:00"),
                end: at("09:00:00"),
                description: None,
            }],
        }
    }

    #[tokio::test]
    async fn test_plan_slot_last_write_wins() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.read("s1").await.unwrap(), None);

        db.write("s1", &document("Math")).await.unwrap();
        db.write("s1", &document("Physics")).await.unwrap();
        db.write("s2", &document("Chemistry")).await.unwrap();

        let plan = db.read("s1").await.unwrap().unwrap();
        assert_eq!(plan.events.len(), 1);
        assert_eq!(plan.events[0].summary, "Physics");
        assert!(db.delete_plan("s2").unwrap());
        assert_eq!(db.read("s2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_plan_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        db.put_plan("s1", "not json").unwrap();
        assert!(db.read("s1").await.unwrap_err().contains("corrupt"));
    }

    #[tokio::test]
    async fn test_snapshots_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("planner.db");

        {
            let db = Database::open(&path).unwrap();
            db.save_snapshot("s1", "{\"version\":1}").await.unwrap();
            db.save_snapshot("s1", "{\"version\":1,\"x\":2}").await.unwrap();
            db.write("s1", &document("Math")).await.unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(
            db.load_snapshot("s1").await.unwrap().as_deref(),
            Some("{\"version\":1,\"x\":2}")
        );
        assert_eq!(db.load_snapshot("missing").await.unwrap(), None);
        assert_eq!(db.list_snapshots().unwrap(), vec!["s1".to_string()]);
        assert!(db.read("s1").await.unwrap().is_some());
    }
}
