//! Common test utilities.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempDir;
use tokio::sync::Mutex;

use gridwatch::notify::{Notifier, NotifyError};
use gridwatch::races::RaceSession;
use gridwatch::scheduler::{SchedulerConfig, SchedulerHandle, SchedulerService, Trigger};
use gridwatch::store::{FileTriggerStore, StorageError, StorageResult, TriggerStore};

/// Channel id used by all test schedulers.
pub const TEST_CHANNEL: i64 = -1001000000000;

/// Notifier that records every delivery instead of talking to Telegram.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(i64, String)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, channel_id: i64, text: &str) -> Result<(), NotifyError> {
        self.sent.lock().await.push((channel_id, text.to_string()));
        Ok(())
    }
}

/// Store that rejects saves for ids with a given prefix and delegates
/// everything else to a real file store.
pub struct FailingTriggerStore {
    inner: FileTriggerStore,
    fail_prefix: String,
}

impl FailingTriggerStore {
    pub fn new(dir: std::path::PathBuf, fail_prefix: &str) -> Self {
        Self {
            inner: FileTriggerStore::new(dir),
            fail_prefix: fail_prefix.to_string(),
        }
    }
}

#[async_trait]
impl TriggerStore for FailingTriggerStore {
    async fn list(&self) -> StorageResult<Vec<Trigger>> {
        self.inner.list().await
    }

    async fn load(&self, id: &str) -> StorageResult<Option<Trigger>> {
        self.inner.load(id).await
    }

    async fn save(&self, trigger: &Trigger) -> StorageResult<()> {
        if trigger.id.starts_with(&self.fail_prefix) {
            return Err(StorageError::file_io(
                format!("{}.yaml", trigger.id),
                std::io::Error::other("disk full"),
            ));
        }
        self.inner.save(trigger).await
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        self.inner.delete(id).await
    }
}

/// Build a session starting at the given instant.
pub fn session(id: &str, name: &str, start: DateTime<Utc>) -> RaceSession {
    RaceSession {
        id: id.to_string(),
        name: name.to_string(),
        start_at: start.timestamp_millis(),
    }
}

/// Start a scheduler service over a fresh trigger directory.
pub async fn start_scheduler(
    temp_dir: &TempDir,
    notifier: Arc<dyn Notifier>,
    tick: Duration,
) -> SchedulerHandle {
    let store = Arc::new(FileTriggerStore::new(temp_dir.path().join("triggers")));
    start_scheduler_with_store(store, notifier, tick).await
}

/// Start a scheduler service over an explicit store.
pub async fn start_scheduler_with_store(
    store: Arc<dyn TriggerStore>,
    notifier: Arc<dyn Notifier>,
    tick: Duration,
) -> SchedulerHandle {
    let config = SchedulerConfig {
        store,
        notifier,
        channel_id: TEST_CHANNEL,
        lead_hours: 8,
        tick,
    };

    SchedulerService::new(config).start().await.unwrap()
}
