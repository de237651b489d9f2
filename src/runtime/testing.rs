//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::{NotificationSink, ParticipantFactory, SnapshotStore};
use crate::agents::{
    Participant, ParticipantError, ParticipantErrorKind, ParticipantReply, Roster,
};
use crate::calendar::{CalendarClient, CalendarError, CalendarEventBody, CreatedEvent};
use crate::config::SessionConfig;
use crate::llm::{ContentBlock, LlmError, LlmRequest, LlmResponse, LlmService, Usage};
use crate::state_machine::{Message, NotificationKind, ParticipantId};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Mock LLM Client
// ============================================================================

/// Mock LLM client that returns queued responses
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    model_id: String,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmClient {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful response
    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn text_response(text: &str) -> LlmResponse {
        LlmResponse {
            content: vec![ContentBlock::text(text)],
            end_turn: true,
            usage: Usage::default(),
        }
    }

    pub fn tool_response(name: &str, input: Value) -> LlmResponse {
        LlmResponse {
            content: vec![ContentBlock::tool_use("toolu_mock", name, input)],
            end_turn: false,
            usage: Usage::default(),
        }
    }
}

#[async_trait]
impl LlmService for MockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Mock Calendar
// ============================================================================

/// Calendar that records inserts and fails on chosen summaries
#[derive(Default)]
pub struct MockCalendar {
    inserted: Mutex<Vec<(String, CalendarEventBody)>>,
    failures: Mutex<HashMap<String, CalendarError>>,
    delay: Mutex<Option<Duration>>,
}

impl MockCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every insert of an event with this summary
    pub fn fail_summary(&self, summary: impl Into<String>, error: CalendarError) {
        self.failures.lock().unwrap().insert(summary.into(), error);
    }

    /// Sleep this long before every insert
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Successful inserts as (calendar id, body)
    pub fn inserted(&self) -> Vec<(String, CalendarEventBody)> {
        self.inserted.lock().unwrap().clone()
    }
}

#[async_trait]
impl CalendarClient for MockCalendar {
    async fn insert_event(
        &self,
        calendar_id: &str,
        event: &CalendarEventBody,
    ) -> Result<CreatedEvent, CalendarError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.failures.lock().unwrap().get(&event.summary) {
            return Err(error.clone());
        }

        let mut inserted = self.inserted.lock().unwrap();
        inserted.push((calendar_id.to_string(), event.clone()));
        let n = inserted.len();
        Ok(CreatedEvent {
            id: format!("evt-{n}"),
            link: Some(format!("https://calendar.test/event/{n}")),
        })
    }
}

// ============================================================================
// Scripted Participant
// ============================================================================

/// Participant that plays back queued replies, then a default one
pub struct ScriptedParticipant {
    id: ParticipantId,
    replies: Mutex<VecDeque<Result<ParticipantReply, ParticipantError>>>,
    default_reply: String,
    delay: Mutex<Option<Duration>>,
    cancel_on_reply: Mutex<Option<CancellationToken>>,
    /// History length seen on each call
    calls: Mutex<Vec<usize>>,
}

impl ScriptedParticipant {
    pub fn new(id: ParticipantId) -> Self {
        Self {
            id,
            replies: Mutex::new(VecDeque::new()),
            default_reply: "ok".to_string(),
            delay: Mutex::new(None),
            cancel_on_reply: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_reply(&self, reply: ParticipantReply) {
        self.replies.lock().unwrap().push_back(Ok(reply));
    }

    pub fn queue_error(&self, message: &str) {
        self.replies.lock().unwrap().push_back(Err(ParticipantError::new(
            self.id,
            ParticipantErrorKind::Inference,
            message,
        )));
    }

    /// Sleep this long before every reply
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Trigger `token` while producing each reply
    pub fn cancel_on_reply(&self, token: CancellationToken) {
        *self.cancel_on_reply.lock().unwrap() = Some(token);
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Participant for ScriptedParticipant {
    fn id(&self) -> ParticipantId {
        self.id
    }

    async fn reply(&self, history: &[Message]) -> Result<ParticipantReply, ParticipantError> {
        self.calls.lock().unwrap().push(history.len());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(token) = self.cancel_on_reply.lock().unwrap().as_ref() {
            token.cancel();
        }

        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ParticipantReply::dialogue(self.default_reply.clone())))
    }
}

/// Factory handing every session the same scripted roster
pub struct MockParticipantFactory {
    pub human: Arc<ScriptedParticipant>,
    pub planner: Arc<ScriptedParticipant>,
    pub syncer: Arc<ScriptedParticipant>,
    /// Session ids a roster was built for
    pub built: Mutex<Vec<String>>,
}

impl MockParticipantFactory {
    pub fn new() -> Self {
        Self {
            human: Arc::new(ScriptedParticipant::new(ParticipantId::Human)),
            planner: Arc::new(ScriptedParticipant::new(ParticipantId::Planner)),
            syncer: Arc::new(ScriptedParticipant::new(ParticipantId::Syncer)),
            built: Mutex::new(Vec::new()),
        }
    }
}

impl Default for MockParticipantFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ParticipantFactory for MockParticipantFactory {
    fn roster(&self, session_id: &str, _config: &SessionConfig) -> Roster {
        self.built.lock().unwrap().push(session_id.to_string());
        Roster::new(
            self.human.clone(),
            self.planner.clone(),
            self.syncer.clone(),
        )
    }
}

// ============================================================================
// Recording Sink
// ============================================================================

/// Sink that keeps every notification
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, NotificationKind, Value)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, NotificationKind, Value)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn emit(&self, session_id: &str, kind: NotificationKind, payload: &Value) {
        self.events
            .lock()
            .unwrap()
            .push((session_id.to_string(), kind, payload.clone()));
    }
}

// ============================================================================
// In-Memory Snapshot Store
// ============================================================================

#[derive(Default)]
pub struct InMemorySnapshotStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a stored blob directly
    pub fn put(&self, session_id: &str, blob: &str) {
        self.blobs
            .lock()
            .unwrap()
            .insert(session_id.to_string(), blob.to_string());
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save_snapshot(&self, session_id: &str, blob: &str) -> Result<(), String> {
        self.put(session_id, blob);
        Ok(())
    }

    async fn load_snapshot(&self, session_id: &str) -> Result<Option<String>, String> {
        Ok(self.blobs.lock().unwrap().get(session_id).cloned())
    }
}
