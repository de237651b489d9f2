//! Side-effecting tools available to the agent participants
//!
//! `ToolInvoker` holds the persist/sync semantics. The `Tool` wrappers expose
//! them to a model under the names it is prompted with and translate every
//! outcome into user-visible text plus a tool-status update.

mod invoker;
mod load_schedule;
mod plan_store;
mod save_schedule;

pub use invoker::{
    FailedEvent, PersistError, PersistReport, SyncError, SyncPolicy, SyncReport, ToolInvoker,
};
pub use load_schedule::LoadScheduleTool;
pub use plan_store::{InMemoryPlanStore, PlanStore, SlotLocks};
pub use save_schedule::SaveScheduleTool;

use crate::llm::ToolDefinition;
use crate::state_machine::{ParticipantId, ToolKind, ToolStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Result from tool execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
    /// New session tool status, when the call changes it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ToolStatus>,
}

impl ToolOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            status: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
            status: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: ToolStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// A tool an agent can call
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name
    fn name(&self) -> &str;

    /// Tool description for LLM
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    /// Which side effect this tool performs
    fn kind(&self) -> ToolKind;

    /// Execute the tool. Failures are reported in the output, never raised.
    async fn run(&self, input: Value) -> ToolOutput;
}

/// The tools one participant may call
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Planner persists, Syncer syncs, the human calls nothing
    pub fn for_role(role: ParticipantId, invoker: Arc<ToolInvoker>) -> Self {
        let tools: Vec<Arc<dyn Tool>> = match role {
            ParticipantId::Planner => vec![Arc::new(SaveScheduleTool::new(invoker))],
            ParticipantId::Syncer => vec![Arc::new(LoadScheduleTool::new(invoker))],
            ParticipantId::Human => vec![],
        };
        Self { tools }
    }

    /// Get all tool definitions for LLM
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Execute a tool by name, `None` if this role has no such tool
    pub async fn execute(&self, name: &str, input: Value) -> Option<(ToolKind, ToolOutput)> {
        let tool = self.get(name)?;
        Some((tool.kind(), tool.run(input).await))
    }
}
