//! Session state types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Participants
// ============================================================================

/// The three fixed roles of a planning session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantId {
    Human,
    Planner,
    Syncer,
}

impl ParticipantId {
    /// Roster order
    pub const ALL: [ParticipantId; 3] = [
        ParticipantId::Human,
        ParticipantId::Planner,
        ParticipantId::Syncer,
    ];

    /// Name shown to the other participants
    pub fn display_name(self) -> &'static str {
        match self {
            ParticipantId::Human => "User",
            ParticipantId::Planner => "PlannerAgent",
            ParticipantId::Syncer => "CalendarAgent",
        }
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Side-effecting tools a participant can invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    PersistPlan,
    SyncPlan,
}

/// What a history entry represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageKind {
    Dialogue,
    ToolResult { tool: ToolKind, success: bool },
    System,
}

impl MessageKind {
    pub fn is_system(self) -> bool {
        matches!(self, MessageKind::System)
    }

    /// True for a persist call that actually stored a plan
    pub fn is_successful_persist(self) -> bool {
        matches!(
            self,
            MessageKind::ToolResult {
                tool: ToolKind::PersistPlan,
                success: true
            }
        )
    }
}

/// One entry in the append-only conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub speaker: ParticipantId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
}

impl Message {
    pub fn new(speaker: ParticipantId, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            speaker,
            content: content.into(),
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn dialogue(speaker: ParticipantId, content: impl Into<String>) -> Self {
        Self::new(speaker, MessageKind::Dialogue, content)
    }

    pub fn tool_result(
        speaker: ParticipantId,
        tool: ToolKind,
        success: bool,
        content: impl Into<String>,
    ) -> Self {
        Self::new(speaker, MessageKind::ToolResult { tool, success }, content)
    }

    pub fn system(speaker: ParticipantId, content: impl Into<String>) -> Self {
        Self::new(speaker, MessageKind::System, content)
    }
}

// ============================================================================
// Tool status
// ============================================================================

/// Outcome of the most recent status-changing tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    #[default]
    None,
    PlanSaved,
    PlanSyncSucceeded,
    PlanSyncFailed,
}

impl ToolStatus {
    pub fn sync_completed(self) -> bool {
        matches!(self, ToolStatus::PlanSyncSucceeded | ToolStatus::PlanSyncFailed)
    }
}

// ============================================================================
// Session phase
// ============================================================================

/// Why a session stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TerminationReason {
    /// A reply contained the termination sentinel
    Sentinel,
    /// The turn budget ran out
    TurnBudget,
    /// Cooperative cancellation between turns
    Cancelled,
    /// Inference or dispatch failed; history up to the failure is kept
    ParticipantFailed {
        participant: ParticipantId,
        message: String,
    },
}

impl TerminationReason {
    /// Only dispatch failures count as errors when reporting
    pub fn is_error(&self) -> bool {
        matches!(self, TerminationReason::ParticipantFailed { .. })
    }
}

/// Session phase
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionPhase {
    /// Not started; the opening message has not been seeded
    #[default]
    Idle,

    /// Waiting for the turn selector
    AwaitingSelector { turns_taken: u32 },

    /// A participant has been dispatched for turn `turn` (1-based)
    AwaitingParticipantReply { speaker: ParticipantId, turn: u32 },

    Terminated { reason: TerminationReason },
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Terminated { .. })
    }

    /// Completed turns
    pub fn turns_taken(&self) -> u32 {
        match self {
            SessionPhase::Idle | SessionPhase::Terminated { .. } => 0,
            SessionPhase::AwaitingSelector { turns_taken } => *turns_taken,
            SessionPhase::AwaitingParticipantReply { turn, .. } => turn.saturating_sub(1),
        }
    }
}

/// Immutable per-session settings consulted by `transition()`
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    /// Hard upper bound on participant turns
    pub max_turns: u32,
    /// A reply containing this text ends the session
    pub termination_sentinel: String,
}

/// Sentinel used by the planning team
pub const DEFAULT_TERMINATION_SENTINEL: &str = "EXIT";

impl SessionContext {
    pub fn new(session_id: impl Into<String>, max_turns: u32) -> Self {
        Self {
            session_id: session_id.into(),
            max_turns,
            termination_sentinel: DEFAULT_TERMINATION_SENTINEL.to_string(),
        }
    }

    #[must_use]
    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.termination_sentinel = sentinel.into();
        self
    }

    pub fn is_termination(&self, content: &str) -> bool {
        !self.termination_sentinel.is_empty() && content.contains(&self.termination_sentinel)
    }
}
