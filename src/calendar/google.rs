//! Google Calendar REST client

use super::{CalendarClient, CalendarError, CalendarEventBody, CreatedEvent};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Inserts events with an already-authorized bearer token
pub struct GoogleCalendarClient {
    client: Client,
    access_token: String,
    base_url: String,
}

impl GoogleCalendarClient {
    pub fn new(access_token: impl Into<String>) -> Result<Self, CalendarError> {
        Self::with_base_url(access_token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        access_token: impl Into<String>,
        base_url: &str,
    ) -> Result<Self, CalendarError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CalendarError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            access_token: access_token.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id)
        )
    }
}

#[async_trait]
impl CalendarClient for GoogleCalendarClient {
    async fn insert_event(
        &self,
        calendar_id: &str,
        event: &CalendarEventBody,
    ) -> Result<CreatedEvent, CalendarError> {
        let response = self
            .client
            .post(self.events_url(calendar_id))
            .bearer_auth(&self.access_token)
            .json(event)
            .send()
            .await
            .map_err(|e| CalendarError::from_reqwest(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CalendarError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(CalendarError::from_status(status, &body));
        }

        let created: InsertResponse = serde_json::from_str(&body).map_err(|e| {
            CalendarError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        tracing::debug!(event_id = %created.id, calendar_id, "Calendar event created");

        Ok(CreatedEvent {
            id: created.id,
            link: created.html_link,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertResponse {
    id: String,
    html_link: Option<String>,
}
