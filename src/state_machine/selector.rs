//! Turn selection
//!
//! Deterministic precedence over the conversation history and the last
//! tool status, evaluated top-down, first match wins:
//!
//! 1. The latest message is a human request to create or edit a plan -> Planner
//! 2. A plan negotiation is open and nothing has been persisted for it -> Planner
//! 3. The persist tool just succeeded (`PlanSaved`) -> Syncer
//! 4. The sync tool just completed (either way) -> Human
//! 5. Otherwise -> optional fallback strategy, else Human
//!
//! The Syncer is only ever selected when the status is `PlanSaved`; a
//! fallback cannot override that.

use super::state::{Message, MessageKind, ParticipantId, ToolStatus};
use regex::Regex;
use std::sync::{Arc, LazyLock};

static PLAN_REQUEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(plan|plans|planning|planner|schedule|schedules|scheduling|reschedule|timetable|study|studying|revise|revision|create|edit|change|modify|update|move|add|remove|adjust|swap)\b",
    )
    .expect("plan request pattern is valid")
});

/// Whether a human message asks for a plan to be created or edited
pub fn is_plan_request(text: &str) -> bool {
    PLAN_REQUEST.is_match(text)
}

/// Which precedence rule produced a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionRule {
    HumanPlanRequest,
    NegotiationOpen,
    PlanSaved,
    SyncCompleted,
    Fallback,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub speaker: ParticipantId,
    pub rule: SelectionRule,
}

impl Selection {
    fn new(speaker: ParticipantId, rule: SelectionRule) -> Self {
        Self { speaker, rule }
    }
}

/// Pluggable strategy for the ambiguous case (rule 5)
pub trait FallbackStrategy: Send + Sync {
    /// Return `None` to defer to the human
    fn choose(&self, history: &[Message], status: ToolStatus) -> Option<ParticipantId>;
}

/// Picks the next speaker
#[derive(Clone, Default)]
pub struct TurnSelector {
    fallback: Option<Arc<dyn FallbackStrategy>>,
}

impl TurnSelector {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackStrategy>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn select(&self, history: &[Message], status: ToolStatus) -> Selection {
        if latest_is_plan_request(history) {
            return Selection::new(ParticipantId::Planner, SelectionRule::HumanPlanRequest);
        }

        if negotiation_open(history) {
            return Selection::new(ParticipantId::Planner, SelectionRule::NegotiationOpen);
        }

        if status == ToolStatus::PlanSaved {
            return Selection::new(ParticipantId::Syncer, SelectionRule::PlanSaved);
        }
        if status.sync_completed() {
            return Selection::new(ParticipantId::Human, SelectionRule::SyncCompleted);
        }

        let fallback = self
            .fallback
            .as_ref()
            .and_then(|strategy| strategy.choose(history, status))
            .filter(|speaker| *speaker != ParticipantId::Syncer);

        match fallback {
            Some(speaker) => Selection::new(speaker, SelectionRule::Fallback),
            None => Selection::new(ParticipantId::Human, SelectionRule::Default),
        }
    }
}

impl std::fmt::Debug for TurnSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnSelector")
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

/// Rule precedence without a fallback
pub fn next_speaker(history: &[Message], status: ToolStatus) -> ParticipantId {
    TurnSelector::default().select(history, status).speaker
}

fn is_human_plan_request(message: &Message) -> bool {
    message.speaker == ParticipantId::Human
        && message.kind == MessageKind::Dialogue
        && is_plan_request(&message.content)
}

fn latest_is_plan_request(history: &[Message]) -> bool {
    history
        .iter()
        .rev()
        .find(|m| !m.kind.is_system())
        .is_some_and(is_human_plan_request)
}

/// A negotiation opens with the latest human plan request and closes with
/// the first successful persist after it.
fn negotiation_open(history: &[Message]) -> bool {
    let Some(opened_at) = history.iter().rposition(is_human_plan_request) else {
        return false;
    };
    !history
        .iter()
        .skip(opened_at + 1)
        .any(|m| m.kind.is_successful_persist())
}
