//! `load_schedule_json` - the syncer's tool: load the saved plan and push it
//! to the calendar

use super::{SyncError, Tool, ToolInvoker, ToolOutput};
use crate::state_machine::{ToolKind, ToolStatus};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub const SYNCED_TEXT: &str = "✅ Study plan synced to Google Calendar.";
pub const SYNC_FAILED_PREFIX: &str = "❌ Failed to sync study plan to Google Calendar:";

pub struct LoadScheduleTool {
    invoker: Arc<ToolInvoker>,
}

impl LoadScheduleTool {
    pub fn new(invoker: Arc<ToolInvoker>) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl Tool for LoadScheduleTool {
    fn name(&self) -> &'static str {
        "load_schedule_json"
    }

    fn description(&self) -> String {
        "Load the saved study schedule and create each event in the user's calendar. \
         Takes no arguments."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::SyncPlan
    }

    async fn run(&self, _input: Value) -> ToolOutput {
        match self.invoker.sync().await {
            Ok(report) => {
                let text = match report.link() {
                    Some(link) => format!(
                        "{SYNCED_TEXT} {} events created. {link}",
                        report.created.len()
                    ),
                    None => format!("{SYNCED_TEXT} {} events created.", report.created.len()),
                };
                ToolOutput::success(text).with_status(ToolStatus::PlanSyncSucceeded)
            }
            Err(e) => {
                let mut text = format!("{SYNC_FAILED_PREFIX} {e}");
                if let SyncError::PartialSync { failed, .. } = &e {
                    for event in failed {
                        text.push_str("\n- ");
                        text.push_str(&event.to_string());
                    }
                }
                if !e.created().is_empty() {
                    text.push_str(&format!(
                        "\n{} events were already created and remain in the calendar.",
                        e.created().len()
                    ));
                }
                ToolOutput::error(text).with_status(ToolStatus::PlanSyncFailed)
            }
        }
    }
}
