//! Conversation session executor
//!
//! Feeds events through the pure `transition()` and executes the resulting
//! effects. Chained effects are processed with an explicit work stack, never
//! by recursion.

use super::snapshot::{SessionSnapshot, SnapshotError, SNAPSHOT_VERSION};
use super::traits::NotificationSink;
use crate::agents::{ParticipantError, ParticipantErrorKind, Roster};
use crate::state_machine::{
    transition, Effect, Event, Message, ParticipantId, SessionContext, SessionPhase,
    TerminationReason, ToolStatus, TransitionError, TurnSelector,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What a finished session produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionOutcome {
    pub session_id: String,
    pub history: Vec<Message>,
    pub reason: TerminationReason,
    /// Set only when a participant failure ended the session
    pub error: Option<String>,
    pub last_tool_status: ToolStatus,
    pub turns: u32,
}

impl SessionOutcome {
    pub fn final_message(&self) -> Option<&Message> {
        self.history.last()
    }

    pub fn total_messages(&self) -> usize {
        self.history.len()
    }
}

/// One orchestrated conversation
pub struct ConversationSession {
    context: SessionContext,
    phase: SessionPhase,
    history: Vec<Message>,
    tool_status: ToolStatus,
    /// Completed turns, kept across termination for reporting
    turns: u32,
    roster: Roster,
    selector: TurnSelector,
    sink: Arc<dyn NotificationSink>,
    turn_timeout: Option<Duration>,
}

impl ConversationSession {
    pub fn new(
        context: SessionContext,
        roster: Roster,
        selector: TurnSelector,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            context,
            phase: SessionPhase::Idle,
            history: Vec::new(),
            tool_status: ToolStatus::None,
            turns: 0,
            roster,
            selector,
            sink,
            turn_timeout: None,
        }
    }

    #[must_use]
    pub fn with_turn_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.turn_timeout = timeout;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.context.session_id
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn tool_status(&self) -> ToolStatus {
        self.tool_status
    }

    /// Seed the opening human message and run until the session terminates.
    /// The opening message does not count as a turn.
    pub async fn run(
        &mut self,
        opening: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome, TransitionError> {
        tracing::info!(session_id = %self.context.session_id, "Starting session");
        let opening = Message::dialogue(ParticipantId::Human, opening);
        self.process_event(Event::Start { opening }, cancel).await?;
        self.outcome()
    }

    /// Continue a restored session from where its snapshot left off
    pub async fn resume(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome, TransitionError> {
        match self.phase.clone() {
            SessionPhase::Terminated { .. } => self.outcome(),
            SessionPhase::Idle => Err(TransitionError::InvalidTransition(
                "cannot resume a session that never started".to_string(),
            )),
            SessionPhase::AwaitingSelector { .. } => {
                tracing::info!(
                    session_id = %self.context.session_id,
                    turns_taken = self.phase.turns_taken(),
                    "Resuming session"
                );
                let selected = self.execute_effect(Effect::SelectSpeaker, cancel).await;
                if let Some(event) = selected {
                    self.process_event(event, cancel).await?;
                }
                self.outcome()
            }
            SessionPhase::AwaitingParticipantReply { speaker, .. } => {
                let dispatched = self
                    .execute_effect(Effect::Dispatch { speaker }, cancel)
                    .await;
                if let Some(event) = dispatched {
                    self.process_event(event, cancel).await?;
                }
                self.outcome()
            }
        }
    }

    async fn process_event(
        &mut self,
        event: Event,
        cancel: &CancellationToken,
    ) -> Result<(), TransitionError> {
        let mut events_to_process = vec![event];

        while let Some(current_event) = events_to_process.pop() {
            // Pure state transition
            let result = transition(&self.phase, &self.context, current_event).map_err(|e| {
                tracing::warn!(session_id = %self.context.session_id, error = %e, "Rejected event");
                e
            })?;

            let old_phase = std::mem::replace(&mut self.phase, result.new_phase);
            if old_phase != self.phase {
                tracing::debug!(
                    session_id = %self.context.session_id,
                    from = ?old_phase,
                    to = ?self.phase,
                    "Phase changed"
                );
            }
            self.turns = match (&old_phase, &self.phase) {
                (_, SessionPhase::AwaitingSelector { turns_taken }) => *turns_taken,
                // A reply that ended the session still counts as a turn
                (
                    SessionPhase::AwaitingParticipantReply { turn, .. },
                    SessionPhase::Terminated {
                        reason: TerminationReason::Sentinel | TerminationReason::TurnBudget,
                    },
                ) => *turn,
                (_, SessionPhase::Terminated { .. }) => self.turns.max(old_phase.turns_taken()),
                _ => self.turns,
            };

            // Execute effects and collect generated events
            for effect in result.effects {
                if let Some(generated_event) = self.execute_effect(effect, cancel).await {
                    events_to_process.push(generated_event);
                }
            }
        }

        Ok(())
    }

    /// Execute an effect and optionally return a generated event
    async fn execute_effect(&mut self, effect: Effect, cancel: &CancellationToken) -> Option<Event> {
        match effect {
            Effect::UpdateToolStatus(status) => {
                tracing::info!(
                    session_id = %self.context.session_id,
                    from = ?self.tool_status,
                    to = ?status,
                    "Tool status updated"
                );
                self.tool_status = status;
                None
            }

            Effect::AppendMessage(message) => {
                self.history.push(message);
                None
            }

            Effect::SelectSpeaker => {
                if cancel.is_cancelled() {
                    tracing::info!(session_id = %self.context.session_id, "Cancellation observed");
                    return Some(Event::Cancel);
                }
                let selection = self.selector.select(&self.history, self.tool_status);
                tracing::info!(
                    session_id = %self.context.session_id,
                    speaker = %selection.speaker,
                    rule = ?selection.rule,
                    status = ?self.tool_status,
                    "Speaker selected"
                );
                Some(Event::SpeakerSelected {
                    speaker: selection.speaker,
                })
            }

            Effect::Dispatch { speaker } => Some(self.dispatch(speaker).await),

            Effect::Notify { kind, payload } => {
                self.sink
                    .emit(&self.context.session_id, kind, &payload)
                    .await;
                None
            }
        }
    }

    /// Run one participant turn to completion (or its timeout)
    async fn dispatch(&self, speaker: ParticipantId) -> Event {
        let participant = self.roster.get(speaker).clone();
        let turn = participant.reply(&self.history);

        let result = match self.turn_timeout {
            Some(limit) => match tokio::time::timeout(limit, turn).await {
                Ok(result) => result,
                Err(_) => Err(ParticipantError::new(
                    speaker,
                    ParticipantErrorKind::Timeout,
                    format!("no reply within {}s", limit.as_secs_f64()),
                )),
            },
            None => turn.await,
        };

        match result {
            Ok(reply) => {
                let tool_status = reply.tool_status;
                Event::ReplyReceived {
                    message: reply.into_message(speaker),
                    tool_status,
                }
            }
            Err(e) => {
                tracing::error!(
                    session_id = %self.context.session_id,
                    speaker = %speaker,
                    error = %e,
                    "Participant failed"
                );
                Event::ParticipantFailed {
                    speaker,
                    message: e.to_string(),
                }
            }
        }
    }

    fn outcome(&self) -> Result<SessionOutcome, TransitionError> {
        let SessionPhase::Terminated { reason } = &self.phase else {
            return Err(TransitionError::InvalidTransition(format!(
                "session stopped in {:?}",
                self.phase
            )));
        };

        let error = match reason {
            TerminationReason::ParticipantFailed { message, .. } => Some(message.clone()),
            _ => None,
        };

        tracing::info!(
            session_id = %self.context.session_id,
            reason = ?reason,
            turns = self.turns,
            messages = self.history.len(),
            "Session terminated"
        );

        Ok(SessionOutcome {
            session_id: self.context.session_id.clone(),
            history: self.history.clone(),
            reason: reason.clone(),
            error,
            last_tool_status: self.tool_status,
            turns: self.turns,
        })
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    pub fn snapshot(&self, plan_key: &str) -> SessionSnapshot {
        SessionSnapshot {
            version: SNAPSHOT_VERSION,
            session_id: self.context.session_id.clone(),
            max_turns: self.context.max_turns,
            termination_sentinel: self.context.termination_sentinel.clone(),
            plan_key: plan_key.to_string(),
            turns: self.turns,
            phase: self.phase.clone(),
            tool_status: self.tool_status,
            history: self.history.clone(),
        }
    }

    /// Replace this session's state with a validated snapshot
    pub fn restore(&mut self, snapshot: SessionSnapshot) -> Result<(), SnapshotError> {
        if snapshot.session_id != self.context.session_id {
            return Err(SnapshotError::Inconsistent(format!(
                "snapshot belongs to session {}",
                snapshot.session_id
            )));
        }

        self.context.max_turns = snapshot.max_turns;
        self.context.termination_sentinel = snapshot.termination_sentinel;
        self.turns = snapshot.turns;
        self.phase = snapshot.phase;
        self.tool_status = snapshot.tool_status;
        self.history = snapshot.history;

        tracing::info!(
            session_id = %self.context.session_id,
            phase = ?self.phase,
            messages = self.history.len(),
            "Session restored"
        );
        Ok(())
    }
}
