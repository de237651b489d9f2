//! External calendar collaborator
//!
//! The orchestration core only needs `insert_event`; credential acquisition
//! and refresh happen outside this crate and arrive as a bearer token.

mod error;
mod google;

pub use error::{CalendarError, CalendarErrorKind};
pub use google::GoogleCalendarClient;

use crate::plan::{DocumentEvent, EventTime};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default target calendar
pub const DEFAULT_CALENDAR_ID: &str = "primary";

/// Request body for one calendar event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEventBody {
    pub summary: String,
    pub description: String,
    pub start: EventTime,
    pub end: EventTime,
}

impl From<&DocumentEvent> for CalendarEventBody {
    fn from(event: &DocumentEvent) -> Self {
        Self {
            summary: event.summary.clone(),
            description: event.description.clone().unwrap_or_default(),
            start: event.start.clone(),
            end: event.end.clone(),
        }
    }
}

/// A created calendar event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedEvent {
    pub id: String,
    /// Browser link to the event, when the service returns one
    pub link: Option<String>,
}

/// Calendar capability
#[async_trait]
pub trait CalendarClient: Send + Sync {
    async fn insert_event(
        &self,
        calendar_id: &str,
        event: &CalendarEventBody,
    ) -> Result<CreatedEvent, CalendarError>;
}

#[async_trait]
impl<T: CalendarClient + ?Sized> CalendarClient for Arc<T> {
    async fn insert_event(
        &self,
        calendar_id: &str,
        event: &CalendarEventBody,
    ) -> Result<CreatedEvent, CalendarError> {
        (**self).insert_event(calendar_id, event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_defaults_description_to_empty() {
        let event = DocumentEvent {
            summary: "Math".to_string(),
            start: EventTime {
                date_time: "2026-10-19T08:00:00".to_string(),
                time_zone: "Asia/Ho_Chi_Minh".to_string(),
            },
            end: EventTime {
                date_time: "2026-10-19T09:00:00".to_string(),
                time_zone: "Asia/Ho_Chi_Minh".to_string(),
            },
            description: None,
        };
        let body = CalendarEventBody::from(&event);
        assert_eq!(body.description, "");

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["start"]["dateTime"], "2026-10-19T08:00:00");
        assert_eq!(json["end"]["timeZone"], "Asia/Ho_Chi_Minh");
    }
}
