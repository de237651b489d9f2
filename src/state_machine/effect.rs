//! Effects produced by state transitions

use crate::state_machine::state::{Message, ParticipantId, TerminationReason, ToolStatus};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Kinds of progress pushed to an external listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Stream,
    Complete,
    Error,
}

/// Effects to be executed after a state transition
#[derive(Debug, Clone)]
pub enum Effect {
    /// Update the last-tool-call status. Always emitted before the
    /// `AppendMessage` of the same reply.
    UpdateToolStatus(ToolStatus),

    /// Append to the history
    AppendMessage(Message),

    /// Ask the turn selector for the next speaker (cancellation is checked here)
    SelectSpeaker,

    /// Hand the turn to a participant
    Dispatch { speaker: ParticipantId },

    /// Notify the optional listener
    Notify {
        kind: NotificationKind,
        payload: Value,
    },
}

impl Effect {
    pub fn notify_message(message: &Message) -> Self {
        Effect::Notify {
            kind: NotificationKind::Stream,
            payload: serde_json::to_value(message).unwrap_or(Value::Null),
        }
    }

    pub fn notify_terminated(reason: &TerminationReason, turns: u32) -> Self {
        let kind = if reason.is_error() {
            NotificationKind::Error
        } else {
            NotificationKind::Complete
        };
        Effect::Notify {
            kind,
            payload: json!({
                "reason": reason,
                "turns": turns,
            }),
        }
    }
}
