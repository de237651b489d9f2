//! Session participants
//!
//! Every speaker, human or agent, sits behind `Participant`: given the
//! history so far it produces exactly one reply per turn.

mod agent;
mod human;

pub use agent::{AgentParticipant, MAX_INFERENCE_ATTEMPTS};
pub use human::{ConsoleHuman, LineHuman};

use crate::state_machine::{MessageKind, ParticipantId, ToolKind, ToolStatus};
use crate::state_machine::Message;
use crate::tools::ToolOutput;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// One turn's output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantReply {
    pub kind: MessageKind,
    pub content: String,
    /// Set when the turn ran a tool that changes the session's tool status
    pub tool_status: Option<ToolStatus>,
}

impl ParticipantReply {
    pub fn dialogue(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Dialogue,
            content: content.into(),
            tool_status: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::System,
            content: content.into(),
            tool_status: None,
        }
    }

    pub fn tool_result(tool: ToolKind, output: ToolOutput) -> Self {
        Self {
            kind: MessageKind::ToolResult {
                tool,
                success: output.success,
            },
            content: output.output,
            tool_status: output.status,
        }
    }

    /// Turn the reply into a history entry attributed to `speaker`
    pub fn into_message(self, speaker: ParticipantId) -> Message {
        Message::new(speaker, self.kind, self.content)
    }
}

/// Why a participant could not produce a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantErrorKind {
    /// Inference failed (after retries, if any)
    Inference,
    /// Reading human input failed
    Input,
    /// The turn exceeded its time limit
    Timeout,
}

impl fmt::Display for ParticipantErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParticipantErrorKind::Inference => "inference",
            ParticipantErrorKind::Input => "input",
            ParticipantErrorKind::Timeout => "timeout",
        })
    }
}

/// Dispatch-level failure; fatal to the session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{participant} {kind} error: {message}")]
pub struct ParticipantError {
    pub participant: ParticipantId,
    pub kind: ParticipantErrorKind,
    pub message: String,
}

impl ParticipantError {
    pub fn new(
        participant: ParticipantId,
        kind: ParticipantErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            participant,
            kind,
            message: message.into(),
        }
    }
}

/// A session speaker
#[async_trait]
pub trait Participant: Send + Sync {
    fn id(&self) -> ParticipantId;

    /// Produce this turn's reply
    async fn reply(&self, history: &[Message]) -> Result<ParticipantReply, ParticipantError>;
}

#[async_trait]
impl<T: Participant + ?Sized> Participant for Arc<T> {
    fn id(&self) -> ParticipantId {
        (**self).id()
    }

    async fn reply(&self, history: &[Message]) -> Result<ParticipantReply, ParticipantError> {
        (**self).reply(history).await
    }
}

/// The fixed three-member roster of a session
#[derive(Clone)]
pub struct Roster {
    human: Arc<dyn Participant>,
    planner: Arc<dyn Participant>,
    syncer: Arc<dyn Participant>,
}

impl Roster {
    pub fn new(
        human: Arc<dyn Participant>,
        planner: Arc<dyn Participant>,
        syncer: Arc<dyn Participant>,
    ) -> Self {
        debug_assert_eq!(human.id(), ParticipantId::Human);
        debug_assert_eq!(planner.id(), ParticipantId::Planner);
        debug_assert_eq!(syncer.id(), ParticipantId::Syncer);
        Self {
            human,
            planner,
            syncer,
        }
    }

    pub fn get(&self, id: ParticipantId) -> &Arc<dyn Participant> {
        match id {
            ParticipantId::Human => &self.human,
            ParticipantId::Planner => &self.planner,
            ParticipantId::Syncer => &self.syncer,
        }
    }
}

impl fmt::Debug for Roster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(ParticipantId::ALL).finish()
    }
}
