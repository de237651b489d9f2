//! Pure state transition function
//!
//! Given the same phase, context and event this always yields the same new
//! phase and effects; all I/O happens in the runtime that executes them.

use super::{Effect, Event, SessionContext, SessionPhase, TerminationReason};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_phase: SessionPhase,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(phase: SessionPhase) -> Self {
        Self {
            new_phase: phase,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    #[must_use]
    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Session already started")]
    AlreadyStarted,
    #[error("Session already terminated")]
    AlreadyTerminated,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
pub fn transition(
    phase: &SessionPhase,
    context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (phase, event) {
        // Terminated absorbs nothing
        (SessionPhase::Terminated { .. }, _) => Err(TransitionError::AlreadyTerminated),

        // Idle + Start -> AwaitingSelector (or straight to Terminated with no budget)
        (SessionPhase::Idle, Event::Start { opening }) => {
            let seeded = TransitionResult::new(SessionPhase::Idle)
                .with_effect(Effect::notify_message(&opening))
                .with_effect(Effect::AppendMessage(opening));

            if context.max_turns == 0 {
                return Ok(terminate(seeded, TerminationReason::TurnBudget, 0));
            }

            let mut result = seeded;
            result.new_phase = SessionPhase::AwaitingSelector { turns_taken: 0 };
            Ok(result.with_effect(Effect::SelectSpeaker))
        }

        (_, Event::Start { .. }) => Err(TransitionError::AlreadyStarted),

        // AwaitingSelector + SpeakerSelected -> AwaitingParticipantReply
        (SessionPhase::AwaitingSelector { turns_taken }, Event::SpeakerSelected { speaker }) => {
            Ok(TransitionResult::new(SessionPhase::AwaitingParticipantReply {
                speaker,
                turn: turns_taken + 1,
            })
            .with_effect(Effect::Dispatch { speaker }))
        }

        // AwaitingParticipantReply + ReplyReceived -> AwaitingSelector | Terminated
        (
            SessionPhase::AwaitingParticipantReply { speaker, turn },
            Event::ReplyReceived {
                message,
                tool_status,
            },
        ) => {
            if message.speaker != *speaker {
                return Err(TransitionError::InvalidTransition(format!(
                    "reply from {} while waiting on {speaker}",
                    message.speaker
                )));
            }

            let sentinel = context.is_termination(&message.content);

            // Status lands before the reply so the next selection sees both
            let result = TransitionResult::new(SessionPhase::AwaitingSelector { turns_taken: *turn })
                .with_effects(tool_status.map(Effect::UpdateToolStatus))
                .with_effect(Effect::notify_message(&message))
                .with_effect(Effect::AppendMessage(message));

            if sentinel {
                Ok(terminate(result, TerminationReason::Sentinel, *turn))
            } else if *turn >= context.max_turns {
                Ok(terminate(result, TerminationReason::TurnBudget, *turn))
            } else {
                Ok(result.with_effect(Effect::SelectSpeaker))
            }
        }

        // Dispatch failure is fatal; history is kept as is
        (
            SessionPhase::AwaitingParticipantReply { speaker, turn },
            Event::ParticipantFailed {
                speaker: failed,
                message,
            },
        ) if failed == *speaker => Ok(terminate(
            TransitionResult::new(SessionPhase::Idle),
            TerminationReason::ParticipantFailed {
                participant: failed,
                message,
            },
            turn.saturating_sub(1),
        )),

        // Cancellation from any live phase
        (SessionPhase::AwaitingSelector { .. } | SessionPhase::AwaitingParticipantReply { .. }, Event::Cancel) => {
            Ok(terminate(
                TransitionResult::new(SessionPhase::Idle),
                TerminationReason::Cancelled,
                phase.turns_taken(),
            ))
        }

        (phase, event) => Err(TransitionError::InvalidTransition(format!(
            "No transition from {phase:?} with event {event:?}"
        ))),
    }
}

fn terminate(result: TransitionResult, reason: TerminationReason, turns: u32) -> TransitionResult {
    let mut result = result.with_effect(Effect::notify_terminated(&reason, turns));
    result.new_phase = SessionPhase::Terminated { reason };
    result
}
