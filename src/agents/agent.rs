//! LLM-backed participant (Planner and Syncer)

use super::{Participant, ParticipantError, ParticipantErrorKind, ParticipantReply};
use crate::llm::{
    ContentBlock, LlmError, LlmMessage, LlmRequest, LlmResponse, LlmService, MessageRole,
    SystemContent,
};
use crate::state_machine::{Message, MessageKind, ParticipantId};
use crate::tools::ToolRegistry;
use async_trait::async_trait;

/// Inference attempts per turn before the turn fails
pub const MAX_INFERENCE_ATTEMPTS: u32 = 3;

const CONTINUE_PROMPT: &str = "[no new messages] Continue with your task.";

pub struct AgentParticipant {
    role: ParticipantId,
    llm: std::sync::Arc<dyn LlmService>,
    tools: ToolRegistry,
    system_prompt: String,
    max_attempts: u32,
}

impl AgentParticipant {
    pub fn new(
        role: ParticipantId,
        llm: std::sync::Arc<dyn LlmService>,
        tools: ToolRegistry,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            role,
            llm,
            tools,
            system_prompt: system_prompt.into(),
            max_attempts: MAX_INFERENCE_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    fn build_request(&self, history: &[Message]) -> LlmRequest {
        LlmRequest {
            system: vec![SystemContent::cached(&self.system_prompt)],
            messages: render_history(self.role, history),
            tools: self.tools.definitions(),
            max_tokens: None,
        }
    }

    async fn complete_with_retry(
        &self,
        request: &LlmRequest,
    ) -> Result<LlmResponse, ParticipantError> {
        let mut attempt = 1;
        loop {
            match self.llm.complete(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.kind.is_retryable() && attempt < self.max_attempts => {
                    let delay = e.backoff(attempt);
                    tracing::warn!(
                        speaker = %self.role,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Retrying inference"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(self.inference_error(&e, attempt)),
            }
        }
    }

    fn inference_error(&self, e: &LlmError, attempt: u32) -> ParticipantError {
        let message = if e.kind.is_retryable() {
            format!("Failed after {attempt} attempts: {e}")
        } else {
            e.to_string()
        };
        ParticipantError::new(self.role, ParticipantErrorKind::Inference, message)
    }
}

#[async_trait]
impl Participant for AgentParticipant {
    fn id(&self) -> ParticipantId {
        self.role
    }

    async fn reply(&self, history: &[Message]) -> Result<ParticipantReply, ParticipantError> {
        let request = self.build_request(history);
        let response = self.complete_with_retry(&request).await?;

        // One tool call per turn; the first one wins
        let tool_call = response
            .tool_uses()
            .first()
            .map(|(_, name, input)| ((*name).to_string(), (*input).clone()));

        let Some((name, input)) = tool_call else {
            return Ok(ParticipantReply::dialogue(response.text()));
        };

        // Narration that came with the call stays in front of its result
        let narration = response.text();
        let narrated = |text: String| {
            if narration.trim().is_empty() {
                text
            } else {
                format!("{}\n\n{text}", narration.trim())
            }
        };

        match self.tools.execute(&name, input).await {
            Some((tool, mut output)) => {
                tracing::info!(
                    speaker = %self.role,
                    tool = %name,
                    success = output.success,
                    status = ?output.status,
                    "Tool executed"
                );
                output.output = narrated(output.output);
                Ok(ParticipantReply::tool_result(tool, output))
            }
            None => {
                tracing::warn!(speaker = %self.role, tool = %name, "Unknown tool requested");
                Ok(ParticipantReply::system(narrated(format!(
                    "Tool {name} is not available to {}.",
                    self.role
                ))))
            }
        }
    }
}

/// Map the shared history onto alternating user/assistant messages from
/// `role`'s point of view. Its own dialogue is the assistant side; everything
/// else is user-side text prefixed with the speaker's name.
fn render_history(role: ParticipantId, history: &[Message]) -> Vec<LlmMessage> {
    let mut messages: Vec<LlmMessage> = Vec::new();

    for message in history {
        let (side, text) = match message.kind {
            MessageKind::Dialogue if message.speaker == role => {
                (MessageRole::Assistant, message.content.clone())
            }
            MessageKind::Dialogue => (
                MessageRole::User,
                format!("{}: {}", message.speaker, message.content),
            ),
            MessageKind::ToolResult { .. } => (
                MessageRole::User,
                format!("{} (tool result): {}", message.speaker, message.content),
            ),
            MessageKind::System => (MessageRole::User, format!("[system] {}", message.content)),
        };

        match messages.last_mut() {
            Some(last) if last.role == side => {
                last.content.push(ContentBlock::text(text));
            }
            _ => messages.push(LlmMessage {
                role: side,
                content: vec![ContentBlock::text(text)],
            }),
        }
    }

    // Conversations must open and close on the user side
    if messages.first().is_some_and(|m| m.role == MessageRole::Assistant) {
        messages.insert(0, LlmMessage::user(vec![ContentBlock::text(CONTINUE_PROMPT)]));
    }
    if messages.last().is_none_or(|m| m.role == MessageRole::Assistant) {
        messages.push(LlmMessage::user(vec![ContentBlock::text(CONTINUE_PROMPT)]));
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolSettings;
    use crate::llm::LlmErrorKind;
    use crate::runtime::testing::{MockCalendar, MockLlmClient};
    use crate::state_machine::{ToolKind, ToolStatus};
    use crate::tools::{InMemoryPlanStore, SlotLocks, ToolInvoker};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn planner(llm: Arc<MockLlmClient>) -> AgentParticipant {
        let invoker = Arc::new(ToolInvoker::new(
            Arc::new(InMemoryPlanStore::new()),
            Arc::new(MockCalendar::new()),
            Arc::new(SlotLocks::new()),
            ToolSettings::default(),
            "test",
        ));
        AgentParticipant::new(
            ParticipantId::Planner,
            llm,
            ToolRegistry::for_role(ParticipantId::Planner, invoker),
            "You are PlannerAgent.",
        )
    }

    fn retryable(message: &str) -> LlmError {
        LlmError::network(message).with_retry_after(Duration::from_millis(1))
    }

    #[test]
    fn test_render_history_alternates() {
        let history = vec![
            Message::dialogue(ParticipantId::Human, "plan my week"),
            Message::dialogue(ParticipantId::Planner, "Draft: math Monday"),
            Message::dialogue(ParticipantId::Human, "ok"),
            Message::tool_result(ParticipantId::Planner, ToolKind::PersistPlan, true, "✅ JSON SAVED"),
        ];
        let rendered = render_history(ParticipantId::Planner, &history);
        let roles: Vec<_> = rendered.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![MessageRole::User, MessageRole::Assistant, MessageRole::User]
        );
        assert_eq!(rendered[2].content.len(), 2);
        assert_eq!(rendered[0].content[0], ContentBlock::text("User: plan my week"));
    }

    #[test]
    fn test_render_history_ends_on_user_side() {
        let history = vec![
            Message::dialogue(ParticipantId::Human, "plan my week"),
            Message::dialogue(ParticipantId::Planner, "What subjects?"),
        ];
        let rendered = render_history(ParticipantId::Planner, &history);
        assert_eq!(rendered.len(), 3);
        assert_eq!(rendered[2].content[0], ContentBlock::text(CONTINUE_PROMPT));

        // Someone else's view of the same history is all user-side
        let rendered = render_history(ParticipantId::Syncer, &history);
        assert_eq!(rendered.len(), 1);
    }

    #[tokio::test]
    async fn test_text_response_is_dialogue() {
        let llm = Arc::new(MockLlmClient::new("mock"));
        llm.queue_response(MockLlmClient::text_response("What subjects?"));
        let agent = planner(llm.clone());

        let reply = agent
            .reply(&[Message::dialogue(ParticipantId::Human, "plan my week")])
            .await
            .unwrap();
        assert_eq!(reply, ParticipantReply::dialogue("What subjects?"));

        let requests = llm.recorded_requests();
        assert_eq!(requests[0].tools[0].name, "save_schedule_json");
    }

    #[tokio::test]
    async fn test_tool_call_becomes_tool_result() {
        let llm = Arc::new(MockLlmClient::new("mock"));
        llm.queue_response(MockLlmClient::tool_response(
            "save_schedule_json",
            json!({"events": [
                {"summary": "Math", "start": "2026-10-19T08:00:00", "end": "2026-10-19T09:00:00"}
            ]}),
        ));
        let reply = planner(llm)
            .reply(&[Message::dialogue(ParticipantId::Human, "yes, save it")])
            .await
            .unwrap();

        assert!(reply.kind.is_successful_persist());
        assert_eq!(reply.tool_status, Some(ToolStatus::PlanSaved));
    }

    #[tokio::test]
    async fn test_text_before_tool_call_is_kept() {
        let llm = Arc::new(MockLlmClient::new("mock"));
        llm.queue_response(LlmResponse {
            content: vec![
                ContentBlock::text("Saving your plan now."),
                ContentBlock::tool_use(
                    "toolu_1",
                    "save_schedule_json",
                    json!({"events": [
                        {"summary": "Math", "start": "2026-10-19T08:00:00", "end": "2026-10-19T09:00:00"}
                    ]}),
                ),
            ],
            end_turn: false,
            usage: crate::llm::Usage::default(),
        });
        let reply = planner(llm)
            .reply(&[Message::dialogue(ParticipantId::Human, "yes, save it")])
            .await
            .unwrap();

        assert!(reply.kind.is_successful_persist());
        assert!(reply.content.starts_with("Saving your plan now.\n\n"));
        assert!(reply.content.contains("JSON SAVED"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_system_message() {
        let llm = Arc::new(MockLlmClient::new("mock"));
        llm.queue_response(MockLlmClient::tool_response("load_schedule_json", json!({})));
        let reply = planner(llm)
            .reply(&[Message::dialogue(ParticipantId::Human, "sync it")])
            .await
            .unwrap();
        assert_eq!(reply.kind, MessageKind::System);
        assert_eq!(reply.tool_status, None);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let llm = Arc::new(MockLlmClient::new("mock"));
        llm.queue_error(retryable("reset"));
        llm.queue_error(retryable("reset"));
        llm.queue_response(MockLlmClient::text_response("Hello"));

        let reply = planner(llm.clone())
            .reply(&[Message::dialogue(ParticipantId::Human, "hi")])
            .await
            .unwrap();
        assert_eq!(reply.content, "Hello");
        assert_eq!(llm.recorded_requests().len(), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let llm = Arc::new(MockLlmClient::new("mock"));
        for _ in 0..3 {
            llm.queue_error(retryable("reset"));
        }
        let err = planner(llm.clone())
            .reply(&[Message::dialogue(ParticipantId::Human, "hi")])
            .await
            .unwrap_err();
        assert_eq!(err.kind, ParticipantErrorKind::Inference);
        assert!(err.message.starts_with("Failed after 3 attempts"));
        assert_eq!(llm.recorded_requests().len(), 3);
    }

    #[tokio::test]
    async fn test_auth_error_not_retried() {
        let llm = Arc::new(MockLlmClient::new("mock"));
        llm.queue_error(LlmError::new(LlmErrorKind::Auth, "bad key"));
        let err = planner(llm.clone())
            .reply(&[Message::dialogue(ParticipantId::Human, "hi")])
            .await
            .unwrap_err();
        assert_eq!(err.message, "bad key");
        assert_eq!(llm.recorded_requests().len(), 1);
    }
}
