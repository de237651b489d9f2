//! Persist and sync operations
//!
//! Both operations report their outcome as values; none of these errors is
//! fatal to a session. Access to a storage key is serialized through
//! `SlotLocks` for the whole operation, so a sync never reads a plan that
//! another session is still writing.

use super::plan_store::{PlanStore, SlotLocks};
use crate::calendar::{CalendarClient, CalendarError, CalendarEventBody, CreatedEvent};
use crate::config::ToolSettings;
use crate::plan::{PlanCandidate, RejectedRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// What to do when the calendar rejects an event mid-batch.
/// Neither policy rolls back events that were already created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// Stop at the first rejection
    #[default]
    FailFast,
    /// Attempt every event and report failures together
    ContinueOnError,
}

impl FromStr for SyncPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail_fast" | "fail-fast" => Ok(SyncPolicy::FailFast),
            "continue_on_error" | "continue-on-error" => Ok(SyncPolicy::ContinueOnError),
            other => Err(format!("unknown sync policy: {other}")),
        }
    }
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistReport {
    pub events_written: usize,
    pub rejected: Vec<RejectedRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistError {
    #[error("no valid events to save ({} rejected)", rejected.len())]
    NoValidEvents { rejected: Vec<RejectedRecord> },
    #[error("plan storage failed: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub created: Vec<CreatedEvent>,
}

impl SyncReport {
    /// First link returned by the calendar
    pub fn link(&self) -> Option<&str> {
        self.created.iter().find_map(|e| e.link.as_deref())
    }
}

/// An event the calendar refused
#[derive(Debug, Clone)]
pub struct FailedEvent {
    pub index: usize,
    pub summary: String,
    pub cause: CalendarError,
}

impl fmt::Display for FailedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event {} ({}): {}", self.index, self.summary, self.cause)
    }
}

#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("no saved study plan found")]
    PlanNotFound,
    #[error("{cause}")]
    SyncFailure {
        cause: CalendarError,
        created: Vec<CreatedEvent>,
    },
    #[error("{} of {} events failed", failed.len(), failed.len() + created.len())]
    PartialSync {
        created: Vec<CreatedEvent>,
        failed: Vec<FailedEvent>,
    },
    #[error("plan storage failed: {0}")]
    Storage(String),
}

impl SyncError {
    /// Events created before the failure; they stay in the calendar
    pub fn created(&self) -> &[CreatedEvent] {
        match self {
            SyncError::SyncFailure { created, .. } | SyncError::PartialSync { created, .. } => {
                created
            }
            SyncError::PlanNotFound | SyncError::Storage(_) => &[],
        }
    }
}

// ============================================================================
// Invoker
// ============================================================================

/// Runs the persist/sync side effects for one plan key
#[derive(Clone)]
pub struct ToolInvoker {
    store: Arc<dyn PlanStore>,
    calendar: Arc<dyn CalendarClient>,
    locks: Arc<SlotLocks>,
    settings: ToolSettings,
    plan_key: String,
}

impl ToolInvoker {
    pub fn new(
        store: Arc<dyn PlanStore>,
        calendar: Arc<dyn CalendarClient>,
        locks: Arc<SlotLocks>,
        settings: ToolSettings,
        plan_key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            calendar,
            locks,
            settings,
            plan_key: plan_key.into(),
        }
    }

    pub fn plan_key(&self) -> &str {
        &self.plan_key
    }

    /// Validate each record, drop the bad ones and overwrite the slot with
    /// what survives.
    pub async fn persist(&self, candidate: &PlanCandidate) -> Result<PersistReport, PersistError> {
        let _guard = self.locks.acquire(&self.plan_key).await;

        let validated = candidate.validate(&self.settings.default_time_zone);
        if validated.plan.is_empty() {
            tracing::warn!(
                key = %self.plan_key,
                received = candidate.len(),
                rejected = validated.rejected.len(),
                "No valid events to persist"
            );
            return Err(PersistError::NoValidEvents {
                rejected: validated.rejected,
            });
        }

        self.store
            .write(&self.plan_key, &validated.plan.to_document())
            .await
            .map_err(PersistError::Storage)?;

        tracing::info!(
            key = %self.plan_key,
            received = candidate.len(),
            events_written = validated.plan.len(),
            dropped = validated.rejected.len(),
            "Plan persisted"
        );

        Ok(PersistReport {
            events_written: validated.plan.len(),
            rejected: validated.rejected,
        })
    }

    /// Push the persisted plan to the calendar, one insert per event
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        let _guard = self.locks.acquire(&self.plan_key).await;

        let document = self
            .store
            .read(&self.plan_key)
            .await
            .map_err(SyncError::Storage)?
            .ok_or(SyncError::PlanNotFound)?;

        let calendar_id = &self.settings.calendar_id;
        let mut created = Vec::with_capacity(document.events.len());
        let mut failed = Vec::new();

        for (index, event) in document.events.iter().enumerate() {
            let body = CalendarEventBody::from(event);
            match self.calendar.insert_event(calendar_id, &body).await {
                Ok(event) => created.push(event),
                Err(cause) => {
                    tracing::warn!(
                        key = %self.plan_key,
                        index,
                        summary = %body.summary,
                        error = %cause,
                        "Calendar rejected event"
                    );
                    match self.settings.sync_policy {
                        SyncPolicy::FailFast => {
                            return Err(SyncError::SyncFailure { cause, created });
                        }
                        SyncPolicy::ContinueOnError => failed.push(FailedEvent {
                            index,
                            summary: body.summary,
                            cause,
                        }),
                    }
                }
            }
        }

        if !failed.is_empty() {
            return Err(SyncError::PartialSync { created, failed });
        }

        tracing::info!(key = %self.plan_key, created = created.len(), "Plan synced");
        Ok(SyncReport { created })
    }
}

impl fmt::Debug for ToolInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolInvoker")
            .field("plan_key", &self.plan_key)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
