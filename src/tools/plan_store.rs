//! Keyed storage for persisted plans
//!
//! Each key holds at most one plan document. Writers overwrite (last write
//! wins); `SlotLocks` serializes persist/sync per key across sessions.

use crate::plan::PlanDocument;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};

/// Durable plan storage
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Replace the plan stored under `key`
    async fn write(&self, key: &str, plan: &PlanDocument) -> Result<(), String>;

    /// Read the plan under `key`, `None` if nothing was ever written
    async fn read(&self, key: &str) -> Result<Option<PlanDocument>, String>;
}

#[async_trait]
impl<T: PlanStore + ?Sized> PlanStore for Arc<T> {
    async fn write(&self, key: &str, plan: &PlanDocument) -> Result<(), String> {
        (**self).write(key, plan).await
    }

    async fn read(&self, key: &str) -> Result<Option<PlanDocument>, String> {
        (**self).read(key).await
    }
}

/// Process-local store; documents are kept serialized so reads see exactly
/// what a durable store would return.
#[derive(Default)]
pub struct InMemoryPlanStore {
    slots: RwLock<HashMap<String, String>>,
}

impl InMemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanStore for InMemoryPlanStore {
    async fn write(&self, key: &str, plan: &PlanDocument) -> Result<(), String> {
        let json = serde_json::to_string(plan).map_err(|e| e.to_string())?;
        self.slots.write().await.insert(key.to_string(), json);
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<PlanDocument>, String> {
        let slots = self.slots.read().await;
        slots
            .get(key)
            .map(|json| serde_json::from_str(json).map_err(|e| e.to_string()))
            .transpose()
    }
}

/// One async lock per storage key
#[derive(Default)]
pub struct SlotLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SlotLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`; released when the guard drops
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            // Held or awaited locks have a guard or waiter holding a clone
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Keys with a lock entry
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
