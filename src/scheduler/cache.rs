//! In-memory cache for triggers with persistence.
//!
//! Wraps a `TriggerStore` trait implementation with an in-memory map so the
//! execution tick and the discovery dedup check never touch the disk on the
//! read path. Writes go to the persistence backend first and are only
//! published to the cache once durable.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::store::TriggerStore;

use super::error::{Result, SchedulerError};
use super::trigger::{Trigger, TriggerId};

/// In-memory cache for triggers with persistence.
#[derive(Clone)]
pub struct TriggerCache {
    inner: Arc<RwLock<TriggerCacheInner>>,
    /// Underlying persistence store.
    persistence: Arc<dyn TriggerStore>,
}

struct TriggerCacheInner {
    /// Cached triggers by id.
    triggers: HashMap<TriggerId, Trigger>,
}

impl TriggerCache {
    /// Create a new cache with the given persistence backend.
    pub fn new(persistence: Arc<dyn TriggerStore>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(TriggerCacheInner {
                triggers: HashMap::new(),
            })),
            persistence,
        }
    }

    /// Load all triggers from disk.
    ///
    /// Call this on startup to restore pending triggers. Returns the number
    /// of triggers recovered.
    pub async fn load(&self) -> Result<usize> {
        let triggers = self
            .persistence
            .list()
            .await
            .map_err(|e| SchedulerError::Storage(e.to_string()))?;

        let mut inner = self.inner.write().await;
        let loaded = triggers.len();
        for trigger in triggers {
            inner.triggers.insert(trigger.id.clone(), trigger);
        }

        if loaded > 0 {
            info!(loaded, "Recovered pending triggers");
        }

        Ok(loaded)
    }

    /// Insert or replace a trigger.
    ///
    /// Replacing overwrites `fire_at` and `payload` for the same id, which
    /// keeps re-scheduling idempotent. The write is persisted before the
    /// cache is updated; a failed persist leaves the cache untouched.
    pub async fn upsert(&self, trigger: Trigger) -> Result<()> {
        let id = trigger.id.clone();

        // Persist to disk first
        self.persistence
            .save(&trigger)
            .await
            .map_err(|e| SchedulerError::Storage(e.to_string()))?;

        // Then publish to cache
        let mut inner = self.inner.write().await;
        inner.triggers.insert(id.clone(), trigger);

        debug!(trigger_id = %id, "Stored trigger");
        Ok(())
    }

    /// Whether a trigger with this id is pending.
    pub async fn exists(&self, id: &str) -> bool {
        let inner = self.inner.read().await;
        inner.triggers.contains_key(id)
    }

    /// All pending triggers with `fire_at <= now`, in no particular order.
    pub async fn due(&self, now: DateTime<Utc>) -> Vec<Trigger> {
        let inner = self.inner.read().await;
        inner
            .triggers
            .values()
            .filter(|t| t.fire_at <= now)
            .cloned()
            .collect()
    }

    /// Atomically claim a trigger for execution.
    ///
    /// Removes the trigger from the cache under the write lock and reports
    /// whether it was still present, so two workers racing on the same due
    /// trigger resolve to exactly one winner. The winner's removal is then
    /// unlinked from disk; if the unlink fails the claim is reported as a
    /// storage error and the leftover file is recovered (and fires late) on
    /// the next process start.
    pub async fn claim(&self, id: &str) -> Result<Option<Trigger>> {
        let removed = {
            let mut inner = self.inner.write().await;
            inner.triggers.remove(id)
        };

        let Some(trigger) = removed else {
            return Ok(None);
        };

        self.persistence
            .delete(id)
            .await
            .map_err(|e| SchedulerError::Storage(e.to_string()))?;

        debug!(trigger_id = %id, "Claimed trigger");
        Ok(Some(trigger))
    }

    /// Number of pending triggers.
    pub async fn pending_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.triggers.len()
    }
}
