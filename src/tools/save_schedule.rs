//! `save_schedule_json` - the planner's persist tool

use super::{PersistError, Tool, ToolInvoker, ToolOutput};
use crate::plan::{PlanCandidate, RejectedRecord};
use crate::state_machine::{ToolKind, ToolStatus};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::sync::Arc;

pub const SAVED_TEXT: &str = "✅ JSON SAVED";
pub const NO_VALID_EVENTS_TEXT: &str = "❌ No valid events to save.";

pub struct SaveScheduleTool {
    invoker: Arc<ToolInvoker>,
}

impl SaveScheduleTool {
    pub fn new(invoker: Arc<ToolInvoker>) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl Tool for SaveScheduleTool {
    fn name(&self) -> &'static str {
        "save_schedule_json"
    }

    fn description(&self) -> String {
        "Save the agreed study schedule. Call this once the user has confirmed the plan. \
         Each event needs a summary, a start and an end (YYYY-MM-DDTHH:MM:SS); timeZone and \
         description are optional. Saving replaces any previously saved schedule."
            .to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["events"],
            "properties": {
                "events": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["summary", "start", "end"],
                        "properties": {
                            "summary": {"type": "string", "description": "Subject or activity"},
                            "start": {"type": "string", "description": "Local start time, YYYY-MM-DDTHH:MM:SS"},
                            "end": {"type": "string", "description": "Local end time, YYYY-MM-DDTHH:MM:SS"},
                            "timeZone": {"type": "string", "description": "IANA timezone"},
                            "description": {"type": "string"}
                        }
                    }
                }
            }
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::PersistPlan
    }

    async fn run(&self, input: Value) -> ToolOutput {
        let Some(candidate) = PlanCandidate::from_value(input) else {
            return ToolOutput::error(format!(
                "{NO_VALID_EVENTS_TEXT} Expected an object with an \"events\" array."
            ));
        };

        match self.invoker.persist(&candidate).await {
            Ok(report) => {
                let mut text = SAVED_TEXT.to_string();
                if !report.rejected.is_empty() {
                    let _ = write!(
                        text,
                        " ({} saved, {} dropped)",
                        report.events_written,
                        report.rejected.len()
                    );
                    push_rejections(&mut text, &report.rejected);
                }
                ToolOutput::success(text).with_status(ToolStatus::PlanSaved)
            }
            Err(PersistError::NoValidEvents { rejected }) => {
                let mut text = NO_VALID_EVENTS_TEXT.to_string();
                push_rejections(&mut text, &rejected);
                ToolOutput::error(text)
            }
            Err(e @ PersistError::Storage(_)) => ToolOutput::error(format!("❌ {e}")),
        }
    }
}

fn push_rejections(text: &mut String, rejected: &[RejectedRecord]) {
    for record in rejected {
        let _ = write!(text, "\n- event {}: {}", record.index + 1, record.reason);
    }
}
