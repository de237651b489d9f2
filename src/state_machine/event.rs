//! Events that drive a session

use crate::state_machine::state::{Message, ParticipantId, ToolStatus};

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    /// Seed the human's opening message
    Start { opening: Message },

    /// The selector picked the next speaker
    SpeakerSelected { speaker: ParticipantId },

    /// A participant finished its turn. `tool_status` is set when the turn
    /// ran a tool that changes the session's tool status.
    ReplyReceived {
        message: Message,
        tool_status: Option<ToolStatus>,
    },

    /// Inference or dispatch failed for the current speaker
    ParticipantFailed {
        speaker: ParticipantId,
        message: String,
    },

    /// Cooperative cancellation observed between turns
    Cancel,
}
