//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use crate::agents::{AgentParticipant, Participant, Roster};
use crate::calendar::CalendarClient;
use crate::config::{SessionConfig, ToolSettings};
use crate::llm::LlmService;
use crate::state_machine::{NotificationKind, ParticipantId};
use crate::system_prompt::{build_system_prompt, PromptContext};
use crate::tools::{PlanStore, SlotLocks, ToolInvoker, ToolRegistry};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Optional listener for per-turn progress. Delivery is best effort and never
/// affects the session.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn emit(&self, session_id: &str, kind: NotificationKind, payload: &Value);
}

/// Builds the participants for a new session
pub trait ParticipantFactory: Send + Sync {
    fn roster(&self, session_id: &str, config: &SessionConfig) -> Roster;
}

/// Durable storage for session snapshots
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save_snapshot(&self, session_id: &str, blob: &str) -> Result<(), String>;

    async fn load_snapshot(&self, session_id: &str) -> Result<Option<String>, String>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: NotificationSink + ?Sized> NotificationSink for Arc<T> {
    async fn emit(&self, session_id: &str, kind: NotificationKind, payload: &Value) {
        (**self).emit(session_id, kind, payload).await;
    }
}

impl<T: ParticipantFactory + ?Sized> ParticipantFactory for Arc<T> {
    fn roster(&self, session_id: &str, config: &SessionConfig) -> Roster {
        (**self).roster(session_id, config)
    }
}

#[async_trait]
impl<T: SnapshotStore + ?Sized> SnapshotStore for Arc<T> {
    async fn save_snapshot(&self, session_id: &str, blob: &str) -> Result<(), String> {
        (**self).save_snapshot(session_id, blob).await
    }

    async fn load_snapshot(&self, session_id: &str) -> Result<Option<String>, String> {
        (**self).load_snapshot(session_id).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl NotificationSink for NoopSink {
    async fn emit(&self, _session_id: &str, _kind: NotificationKind, _payload: &Value) {}
}

/// Progress event published on the broadcast channel
#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    pub session_id: String,
    pub kind: NotificationKind,
    pub payload: Value,
}

/// Fan-out sink over a `tokio::sync::broadcast` channel
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<SessionEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl NotificationSink for BroadcastSink {
    async fn emit(&self, session_id: &str, kind: NotificationKind, payload: &Value) {
        // No subscribers is fine
        let _ = self.tx.send(SessionEvent {
            session_id: session_id.to_string(),
            kind,
            payload: payload.clone(),
        });
    }
}

/// LLM-backed planner and syncer around a shared human
pub struct StandardParticipantFactory {
    llm: Arc<dyn LlmService>,
    human: Arc<dyn Participant>,
    store: Arc<dyn PlanStore>,
    calendar: Arc<dyn CalendarClient>,
    locks: Arc<SlotLocks>,
    settings: ToolSettings,
}

impl StandardParticipantFactory {
    pub fn new(
        llm: Arc<dyn LlmService>,
        human: Arc<dyn Participant>,
        store: Arc<dyn PlanStore>,
        calendar: Arc<dyn CalendarClient>,
        settings: ToolSettings,
    ) -> Self {
        Self {
            llm,
            human,
            store,
            calendar,
            locks: Arc::new(SlotLocks::new()),
            settings,
        }
    }

    fn agent(
        &self,
        role: ParticipantId,
        invoker: &Arc<ToolInvoker>,
        context: &PromptContext,
    ) -> Arc<dyn Participant> {
        Arc::new(AgentParticipant::new(
            role,
            self.llm.clone(),
            ToolRegistry::for_role(role, invoker.clone()),
            build_system_prompt(role, context),
        ))
    }
}

impl ParticipantFactory for StandardParticipantFactory {
    fn roster(&self, session_id: &str, config: &SessionConfig) -> Roster {
        let invoker = Arc::new(ToolInvoker::new(
            self.store.clone(),
            self.calendar.clone(),
            self.locks.clone(),
            self.settings.clone(),
            config.plan_key_for(session_id),
        ));
        let context = PromptContext {
            today: chrono::Local::now().date_naive(),
            time_zone: self.settings.default_time_zone.clone(),
            termination_sentinel: config.termination_sentinel.clone(),
        };

        Roster::new(
            self.human.clone(),
            self.agent(ParticipantId::Planner, &invoker, &context),
            self.agent(ParticipantId::Syncer, &invoker, &context),
        )
    }
}
