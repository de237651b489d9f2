//! Role instructions for the agent participants
//!
//! Each agent gets a fixed role prompt plus a short context block with the
//! current date and timezone, which the planner needs to produce concrete
//! timestamps.

use crate::state_machine::ParticipantId;
use chrono::NaiveDate;
use std::fmt::Write;

const PLANNER_PROMPT: &str = r#"You are PlannerAgent, an assistant specialized in creating study plans.

1. Ask the user about their learning goals, subjects, and available time.
2. Generate a study schedule and present it in natural language. Do not show JSON to the user.
3. When the user agrees to the schedule, immediately call the `save_schedule_json` tool with:

{
  "events": [
    {
      "summary": "Learn Math",
      "start": "2025-07-25T08:00:00",
      "end": "2025-07-25T09:30:00",
      "timeZone": "Asia/Ho_Chi_Minh",
      "description": "Review integrals"
    }
  ]
}

If the tool reports rejected events, fix them and call it again.
After a successful save, do not say anything further and do not print the JSON. CalendarAgent handles syncing."#;

const SYNCER_PROMPT: &str = r"You are CalendarAgent, a background agent that never converses with the user.

Your only responsibility: when a study plan has just been saved, call `load_schedule_json` to sync it to Google Calendar.

Do not explain or chat. Sync, then finish.
If syncing succeeds, reply: Study plan synced to Google Calendar. followed by the calendar link.
If syncing fails, reply: Failed to sync study plan to Google Calendar. followed by the reason.";

/// Per-session facts appended to the role prompt
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub today: NaiveDate,
    pub time_zone: String,
    pub termination_sentinel: String,
}

/// Role prompt for an agent; the human has none
pub fn role_prompt(role: ParticipantId) -> Option<&'static str> {
    match role {
        ParticipantId::Planner => Some(PLANNER_PROMPT),
        ParticipantId::Syncer => Some(SYNCER_PROMPT),
        ParticipantId::Human => None,
    }
}

/// Build the complete system prompt for an agent role.
pub fn build_system_prompt(role: ParticipantId, context: &PromptContext) -> String {
    let mut prompt = String::from(role_prompt(role).unwrap_or_default());

    prompt.push_str("\n\n<session_context>\n");
    let _ = writeln!(prompt, "Today is {}.", context.today.format("%A, %Y-%m-%d"));
    let _ = writeln!(
        prompt,
        "Unless the user says otherwise, times are in {}.",
        context.time_zone
    );
    let _ = writeln!(
        prompt,
        "The conversation ends when the user says {}.",
        context.termination_sentinel
    );
    prompt.push_str("Messages from other participants are prefixed with their name.\n");
    prompt.push_str("</session_context>");

    prompt
}
