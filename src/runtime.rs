//! Runtime for executing planning sessions
//!
//! `SessionManager` is the registry; each entry is a `SessionHandle` owning
//! one `ConversationSession` behind an async mutex, so a session only ever
//! advances on one task at a time.

mod executor;
mod snapshot;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{ConversationSession, SessionOutcome};
pub use snapshot::{SessionSnapshot, SnapshotError, SNAPSHOT_VERSION};
pub use traits::*;

use crate::config::SessionConfig;
use crate::state_machine::{
    Message, SessionContext, SessionPhase, ToolStatus, TransitionError, TurnSelector,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Session {0} is busy")]
    Busy(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("Snapshot storage failed: {0}")]
    Storage(String),
    #[error("No snapshot store configured")]
    NoSnapshotStore,
}

/// Handle to one registered session
pub struct SessionHandle {
    id: String,
    config: SessionConfig,
    plan_key: String,
    session: Mutex<ConversationSession>,
    cancel: CancellationToken,
}

impl SessionHandle {
    fn new(
        id: &str,
        config: SessionConfig,
        roster: crate::agents::Roster,
        selector: TurnSelector,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let context = SessionContext::new(id, config.max_turns)
            .with_sentinel(config.termination_sentinel.clone());
        let session = ConversationSession::new(context, roster, selector, sink)
            .with_turn_timeout(config.turn_timeout);

        Self {
            id: id.to_string(),
            plan_key: config.plan_key_for(id),
            config,
            session: Mutex::new(session),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn plan_key(&self) -> &str {
        &self.plan_key
    }

    /// Seed `opening` and run the session to termination
    pub async fn run(&self, opening: impl Into<String>) -> Result<SessionOutcome, SessionError> {
        let mut session = self.session.lock().await;
        Ok(session.run(opening, &self.cancel).await?)
    }

    /// Continue a restored session
    pub async fn resume(&self) -> Result<SessionOutcome, SessionError> {
        let mut session = self.session.lock().await;
        Ok(session.resume(&self.cancel).await?)
    }

    /// Ask the session to stop at its next turn boundary. Permanent for this
    /// handle.
    pub fn cancel(&self) {
        tracing::info!(session_id = %self.id, "Cancellation requested");
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.session.lock().await.phase().clone()
    }

    pub async fn history(&self) -> Vec<Message> {
        self.session.lock().await.history().to_vec()
    }

    pub async fn tool_status(&self) -> ToolStatus {
        self.session.lock().await.tool_status()
    }

    /// Serialize the session. Fails with `Busy` while a run is in progress.
    pub fn save_state(&self) -> Result<String, SessionError> {
        let session = self
            .session
            .try_lock()
            .map_err(|_| SessionError::Busy(self.id.clone()))?;
        Ok(session.snapshot(&self.plan_key).to_blob()?)
    }

    /// Replace the session's state from a blob. On any failure the session is
    /// left as it was.
    pub fn load_state(&self, blob: &str) -> Result<(), SessionError> {
        let snapshot = SessionSnapshot::from_blob(blob)?;
        if snapshot.plan_key != self.plan_key {
            return Err(SnapshotError::Inconsistent(format!(
                "snapshot uses plan slot {}, session uses {}",
                snapshot.plan_key, self.plan_key
            ))
            .into());
        }
        let mut session = self
            .session
            .try_lock()
            .map_err(|_| SessionError::Busy(self.id.clone()))?;
        session.restore(snapshot)?;
        Ok(())
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("plan_key", &self.plan_key)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Registry of sessions keyed by id
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
    factory: Arc<dyn ParticipantFactory>,
    sink: Arc<dyn NotificationSink>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    selector: TurnSelector,
}

impl SessionManager {
    pub fn new(factory: Arc<dyn ParticipantFactory>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            factory,
            sink,
            snapshots: None,
            selector: TurnSelector::new(),
        }
    }

    #[must_use]
    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = Some(store);
        self
    }

    #[must_use]
    pub fn with_selector(mut self, selector: TurnSelector) -> Self {
        self.selector = selector;
        self
    }

    fn build(&self, id: &str, config: SessionConfig) -> SessionHandle {
        let roster = self.factory.roster(id, &config);
        SessionHandle::new(id, config, roster, self.selector.clone(), self.sink.clone())
    }

    /// Register a new session. An existing session with the same id is
    /// replaced.
    pub async fn create(&self, id: &str, config: SessionConfig) -> Arc<SessionHandle> {
        let handle = Arc::new(self.build(id, config));
        let previous = self
            .sessions
            .write()
            .await
            .insert(id.to_string(), handle.clone());

        if previous.is_some() {
            tracing::warn!(session_id = %id, "Replaced existing session");
        } else {
            tracing::info!(session_id = %id, plan_key = %handle.plan_key(), "Created session");
        }
        handle
    }

    pub async fn get(&self, id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Unregister a session and cancel it
    pub async fn remove(&self, id: &str) -> Option<Arc<SessionHandle>> {
        let removed = self.sessions.write().await.remove(id);
        if let Some(handle) = &removed {
            handle.cancel();
            tracing::info!(session_id = %id, "Removed session");
        }
        removed
    }

    /// Copy of the registry, ordered by id
    pub async fn list(&self) -> Vec<Arc<SessionHandle>> {
        let mut handles: Vec<_> = self.sessions.read().await.values().cloned().collect();
        handles.sort_by(|a, b| a.id.cmp(&b.id));
        handles
    }

    fn snapshot_store(&self) -> Result<&Arc<dyn SnapshotStore>, SessionError> {
        self.snapshots.as_ref().ok_or(SessionError::NoSnapshotStore)
    }

    /// Write the session's snapshot to the configured store
    pub async fn persist_snapshot(&self, id: &str) -> Result<(), SessionError> {
        let store = self.snapshot_store()?;
        let handle = self
            .get(id)
            .await
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        let blob = handle.save_state()?;
        store
            .save_snapshot(id, &blob)
            .await
            .map_err(SessionError::Storage)?;
        tracing::info!(session_id = %id, bytes = blob.len(), "Snapshot persisted");
        Ok(())
    }

    /// Load a stored snapshot. A registered session is restored in place;
    /// otherwise a new one is registered from the snapshot's settings on top
    /// of `base`. Nothing is registered or changed if loading fails.
    pub async fn restore_snapshot(
        &self,
        id: &str,
        base: SessionConfig,
    ) -> Result<Arc<SessionHandle>, SessionError> {
        let store = self.snapshot_store()?;
        let blob = store
            .load_snapshot(id)
            .await
            .map_err(SessionError::Storage)?
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        if let Some(handle) = self.get(id).await {
            handle.load_state(&blob)?;
            return Ok(handle);
        }

        let snapshot = SessionSnapshot::from_blob(&blob)?;
        let config = SessionConfig {
            max_turns: snapshot.max_turns,
            termination_sentinel: snapshot.termination_sentinel.clone(),
            plan_key: (snapshot.plan_key != id).then(|| snapshot.plan_key.clone()),
            ..base
        };
        let handle = Arc::new(self.build(id, config));
        handle
            .session
            .try_lock()
            .map_err(|_| SessionError::Busy(id.to_string()))?
            .restore(snapshot)?;

        self.sessions
            .write()
            .await
            .insert(id.to_string(), handle.clone());
        tracing::info!(session_id = %id, "Session restored from snapshot");
        Ok(handle)
    }
}
