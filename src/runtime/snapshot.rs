//! Session snapshot format
//!
//! A snapshot is an opaque JSON blob to callers. Decoding validates it fully
//! before anything is applied, so a bad blob never touches a live session.

use crate::state_machine::{Message, SessionPhase, ToolStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SNAPSHOT_VERSION: u32 = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("Snapshot is not valid JSON: {0}")]
    Decode(String),
    #[error("Unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
    #[error("Snapshot is inconsistent: {0}")]
    Inconsistent(String),
}

/// Serializable session state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub session_id: String,
    pub max_turns: u32,
    pub termination_sentinel: String,
    pub plan_key: String,
    /// Completed turns, also after termination
    pub turns: u32,
    pub phase: SessionPhase,
    pub tool_status: ToolStatus,
    pub history: Vec<Message>,
}

impl SessionSnapshot {
    pub fn to_blob(&self) -> Result<String, SnapshotError> {
        serde_json::to_string(self).map_err(|e| SnapshotError::Decode(e.to_string()))
    }

    /// Decode and validate. A snapshot taken while a participant was
    /// replying comes back waiting for the selector, without that turn.
    pub fn from_blob(blob: &str) -> Result<Self, SnapshotError> {
        let version = serde_json::from_str::<serde_json::Value>(blob)
            .map_err(|e| SnapshotError::Decode(e.to_string()))?
            .get("version")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| SnapshotError::Inconsistent("missing version".to_string()))?;
        if version != u64::from(SNAPSHOT_VERSION) {
            return Err(SnapshotError::UnsupportedVersion(
                u32::try_from(version).unwrap_or(u32::MAX),
            ));
        }

        let mut snapshot: Self =
            serde_json::from_str(blob).map_err(|e| SnapshotError::Decode(e.to_string()))?;
        snapshot.normalize();
        snapshot.validate()?;
        Ok(snapshot)
    }

    fn normalize(&mut self) {
        if let SessionPhase::AwaitingParticipantReply { turn, .. } = self.phase {
            self.turns = turn.saturating_sub(1);
            self.phase = SessionPhase::AwaitingSelector {
                turns_taken: self.turns,
            };
        }
    }

    fn validate(&self) -> Result<(), SnapshotError> {
        if self.session_id.is_empty() {
            return Err(SnapshotError::Inconsistent("empty session id".to_string()));
        }
        if self.turns > self.max_turns {
            return Err(SnapshotError::Inconsistent(format!(
                "{} turns taken of {} allowed",
                self.turns, self.max_turns
            )));
        }
        match &self.phase {
            SessionPhase::Idle if !self.history.is_empty() => Err(SnapshotError::Inconsistent(
                "idle session with history".to_string(),
            )),
            SessionPhase::AwaitingSelector { turns_taken } => {
                if self.history.is_empty() {
                    return Err(SnapshotError::Inconsistent(
                        "started session without history".to_string(),
                    ));
                }
                if *turns_taken >= self.max_turns {
                    return Err(SnapshotError::Inconsistent(format!(
                        "{turns_taken} turns taken of {} allowed",
                        self.max_turns
                    )));
                }
                if *turns_taken != self.turns {
                    return Err(SnapshotError::Inconsistent(format!(
                        "phase says {turns_taken} turns, counter says {}",
                        self.turns
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
