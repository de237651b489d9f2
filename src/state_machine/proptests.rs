//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::selector::{is_plan_request, next_speaker};
use super::*;
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context(max_turns: u32) -> SessionContext {
    SessionContext::new("test-session", max_turns)
}

struct AlwaysSyncer;

impl FallbackStrategy for AlwaysSyncer {
    fn choose(&self, _history: &[Message], _status: ToolStatus) -> Option<ParticipantId> {
        Some(ParticipantId::Syncer)
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_participant() -> impl Strategy<Value = ParticipantId> {
    prop_oneof![
        Just(ParticipantId::Human),
        Just(ParticipantId::Planner),
        Just(ParticipantId::Syncer),
    ]
}

fn arb_status() -> impl Strategy<Value = ToolStatus> {
    prop_oneof![
        Just(ToolStatus::None),
        Just(ToolStatus::PlanSaved),
        Just(ToolStatus::PlanSyncSucceeded),
        Just(ToolStatus::PlanSyncFailed),
    ]
}

fn arb_content() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("plan my week".to_string()),
        Just("move math to Friday".to_string()),
        Just("thanks".to_string()),
        Just("looks good".to_string()),
        "[a-z ]{0,20}",
    ]
}

fn arb_message() -> impl Strategy<Value = Message> {
    (arb_participant(), arb_content(), 0u8..4, any::<bool>()).prop_map(
        |(speaker, content, kind, success)| match kind {
            0 => Message::tool_result(speaker, ToolKind::PersistPlan, success, content),
            1 => Message::tool_result(speaker, ToolKind::SyncPlan, success, content),
            2 => Message::system(speaker, content),
            _ => Message::dialogue(speaker, content),
        },
    )
}

fn arb_history() -> impl Strategy<Value = Vec<Message>> {
    proptest::collection::vec(arb_message(), 0..12)
}

/// Drive a session to termination without I/O, cycling speakers and replies
fn drive(
    context: &SessionContext,
    speakers: &[ParticipantId],
    replies: &[String],
) -> (SessionPhase, u32) {
    let mut phase = SessionPhase::Idle;
    let mut dispatched = 0u32;
    let opening = Message::dialogue(ParticipantId::Human, "plan my week");
    let mut pending = vec![Event::Start { opening }];
    let mut step = 0usize;

    while let Some(event) = pending.pop() {
        let Ok(result) = transition(&phase, context, event) else {
            break;
        };
        phase = result.new_phase;
        for effect in result.effects {
            match effect {
                Effect::SelectSpeaker => {
                    let speaker = speakers[step % speakers.len()];
                    pending.push(Event::SpeakerSelected { speaker });
                }
                Effect::Dispatch { speaker } => {
                    dispatched += 1;
                    let content = replies[step % replies.len()].clone();
                    step += 1;
                    pending.push(Event::ReplyReceived {
                        message: Message::dialogue(speaker, content),
                        tool_status: None,
                    });
                }
                _ => {}
            }
        }
    }
    (phase, dispatched)
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// A human plan request as the latest message always goes to the planner
    #[test]
    fn prop_latest_plan_request_selects_planner(
        history in arb_history(),
        status in arb_status(),
        request in prop_oneof![Just("plan my week"), Just("please reschedule physics")],
    ) {
        let mut history = history;
        history.push(Message::dialogue(ParticipantId::Human, request));
        prop_assert_eq!(next_speaker(&history, status), ParticipantId::Planner);
    }

    /// The syncer is never chosen unless the plan was just saved
    #[test]
    fn prop_syncer_requires_saved_plan(history in arb_history(), status in arb_status()) {
        let selector = TurnSelector::new().with_fallback(Arc::new(AlwaysSyncer));
        let selection = selector.select(&history, status);
        if status != ToolStatus::PlanSaved {
            prop_assert_ne!(selection.speaker, ParticipantId::Syncer);
        }
    }

    /// Selection is a pure function of its inputs
    #[test]
    fn prop_selection_deterministic(history in arb_history(), status in arb_status()) {
        let selector = TurnSelector::new();
        prop_assert_eq!(selector.select(&history, status), selector.select(&history, status));
    }

    /// Non-requests never trip the plan detector
    #[test]
    fn prop_digits_are_not_requests(text in "[0-9 ]{0,30}") {
        prop_assert!(!is_plan_request(&text));
    }

    /// Without a sentinel, a session dispatches exactly its budget
    #[test]
    fn prop_turn_budget_is_exact(
        max_turns in 0u32..15,
        speakers in proptest::collection::vec(arb_participant(), 1..5),
        replies in proptest::collection::vec("[a-z ]{0,10}", 1..5),
    ) {
        let context = test_context(max_turns);
        let (phase, dispatched) = drive(&context, &speakers, &replies);
        prop_assert_eq!(dispatched, max_turns);
        prop_assert_eq!(
            phase,
            SessionPhase::Terminated { reason: TerminationReason::TurnBudget }
        );
    }

    /// A sentinel reply ends the session on that turn
    #[test]
    fn prop_sentinel_stops_on_its_turn(
        max_turns in 1u32..15,
        at in 0usize..15,
        speakers in proptest::collection::vec(arb_participant(), 1..5),
    ) {
        let at = at % max_turns as usize;
        let replies: Vec<String> = (0..=max_turns as usize)
            .map(|i| if i == at { "ok EXIT".to_string() } else { "noted".to_string() })
            .collect();
        let context = test_context(max_turns);
        let (phase, dispatched) = drive(&context, &speakers, &replies);
        prop_assert_eq!(dispatched as usize, at + 1);
        prop_assert_eq!(
            phase,
            SessionPhase::Terminated { reason: TerminationReason::Sentinel }
        );
    }

    /// Once terminated, every event is rejected
    #[test]
    fn prop_terminated_is_absorbing(speaker in arb_participant(), content in arb_content()) {
        let context = test_context(5);
        let phase = SessionPhase::Terminated { reason: TerminationReason::Cancelled };
        let events = vec![
            Event::Start { opening: Message::dialogue(ParticipantId::Human, content.clone()) },
            Event::SpeakerSelected { speaker },
            Event::ReplyReceived { message: Message::dialogue(speaker, content), tool_status: None },
            Event::Cancel,
        ];
        for event in events {
            prop_assert_eq!(
                transition(&phase, &context, event).err(),
                Some(TransitionError::AlreadyTerminated)
            );
        }
    }
}
