//! Scheduler service for executing pending triggers.
//!
//! Runs as a background task: a fixed tick asks the trigger cache for due
//! triggers and fires each one at most once via the notification sink.
//! Scheduling itself (computing fire times and freezing payloads) happens
//! through the handle and needs no cooperation from the loop, since the
//! next tick will pick up whatever became due.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::notify::Notifier;
use crate::races::RaceSession;
use crate::store::TriggerStore;

use super::cache::TriggerCache;
use super::error::Result;
use super::trigger::{Trigger, TriggerKind};

/// Default execution loop resolution.
pub const DEFAULT_TICK: Duration = Duration::from_secs(30);

/// Maximum concurrent deliveries.
///
/// Bounds the sink calls when many triggers come due on the same tick.
const MAX_CONCURRENT_DELIVERIES: usize = 5;

// ============================================================================
// Public API
// ============================================================================

/// Handle for interacting with the scheduler service.
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    cache: TriggerCache,
    lead_hours: i64,
}

impl SchedulerHandle {
    /// Schedule both notifications for a session.
    ///
    /// Writes a LEAD trigger `lead_hours` before the session start and a
    /// START trigger at the start itself. A trigger whose fire time is
    /// already in the past is silently skipped. Re-scheduling a known
    /// session overwrites the same records, so calling this twice for the
    /// same session never duplicates anything. Returns the number of
    /// triggers written.
    pub async fn schedule_session(&self, session: &RaceSession, event_name: &str) -> Result<usize> {
        let Some(start_at) = session.start_time() else {
            warn!(
                session_id = %session.id,
                start_at = session.start_at,
                "Session start not representable, skipping"
            );
            return Ok(0);
        };

        let now = Utc::now();
        let mut written = 0;

        for kind in [TriggerKind::Lead, TriggerKind::Start] {
            let fire_at = match kind {
                TriggerKind::Lead => match lead_fire_time(start_at, self.lead_hours) {
                    Some(at) => at,
                    None => {
                        warn!(
                            session_id = %session.id,
                            lead_hours = self.lead_hours,
                            "Lead fire time not representable, skipping"
                        );
                        continue;
                    }
                },
                TriggerKind::Start => start_at,
            };

            // Never create a trigger that is already in the past
            if fire_at <= now {
                debug!(
                    session_id = %session.id,
                    kind = kind.tag(),
                    fire_at = %fire_at,
                    "Fire time already passed, skipping"
                );
                continue;
            }

            let payload = match kind {
                TriggerKind::Lead => {
                    lead_message(&session.name, event_name, self.lead_hours, start_at)
                }
                TriggerKind::Start => start_message(&session.name, event_name),
            };

            self.cache
                .upsert(Trigger {
                    id: Trigger::id_for(&session.id, kind),
                    fire_at,
                    payload,
                })
                .await?;
            written += 1;
        }

        Ok(written)
    }

    /// Whether a session already has its START trigger pending.
    ///
    /// Discovery treats START presence as "this session is already
    /// processed" and skips both kinds when it holds.
    pub async fn is_scheduled(&self, session_id: &str) -> bool {
        self.cache
            .exists(&Trigger::id_for(session_id, TriggerKind::Start))
            .await
    }

    /// Number of pending triggers.
    pub async fn pending_count(&self) -> usize {
        self.cache.pending_count().await
    }

    /// Shutdown the scheduler.
    ///
    /// Waits for the loop to stop and for in-flight deliveries to finish
    /// before returning. A claimed trigger has no record on disk anymore,
    /// so it must be sent before the process is allowed to exit.
    pub async fn shutdown(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .command_tx
            .send(SchedulerCommand::Shutdown { reply: reply_tx })
            .await
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }
}

/// Configuration for the scheduler service.
pub struct SchedulerConfig {
    /// Storage backend for trigger persistence.
    pub store: Arc<dyn TriggerStore>,
    /// Sink that delivers fired payloads.
    pub notifier: Arc<dyn Notifier>,
    /// Channel the notifications are published to.
    pub channel_id: i64,
    /// Advance-warning offset in hours.
    pub lead_hours: i64,
    /// Execution loop resolution.
    pub tick: Duration,
}

/// Commands the service loop reacts to.
enum SchedulerCommand {
    Shutdown { reply: oneshot::Sender<()> },
}

/// The scheduler service.
pub struct SchedulerService {
    cache: TriggerCache,
    config: SchedulerConfig,
    /// Bounds concurrent sink deliveries.
    deliveries: Arc<Semaphore>,
}

impl SchedulerService {
    /// Create a new scheduler service.
    pub fn new(config: SchedulerConfig) -> Self {
        let cache = TriggerCache::new(config.store.clone());
        Self {
            cache,
            config,
            deliveries: Arc::new(Semaphore::new(MAX_CONCURRENT_DELIVERIES)),
        }
    }

    /// Start the scheduler service.
    ///
    /// Recovers persisted triggers from disk, spawns the execution loop and
    /// returns a handle for interacting with the service.
    pub async fn start(self) -> Result<SchedulerHandle> {
        let (command_tx, command_rx) = mpsc::channel(16);

        self.cache.load().await?;

        let handle = SchedulerHandle {
            command_tx,
            cache: self.cache.clone(),
            lead_hours: self.config.lead_hours,
        };

        tokio::spawn(self.run(command_rx));

        Ok(handle)
    }

    /// Main service loop.
    async fn run(self, mut command_rx: mpsc::Receiver<SchedulerCommand>) {
        info!(
            tick_secs = self.config.tick.as_secs(),
            "Scheduler service started"
        );

        let mut tick = tokio::time::interval(self.config.tick);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut inflight = JoinSet::new();

        let reply = loop {
            tokio::select! {
                _ = tick.tick() => self.fire_due(&mut inflight).await,
                cmd = command_rx.recv() => match cmd {
                    Some(SchedulerCommand::Shutdown { reply }) => {
                        info!("Scheduler service shutting down");
                        break Some(reply);
                    }
                    None => break None,
                },
            }
        };

        // Wait for in-flight deliveries. Their triggers are already claimed
        // off the disk, so an abandoned task would lose the message.
        while inflight.join_next().await.is_some() {}

        if let Some(reply) = reply {
            let _ = reply.send(());
        }

        info!("Scheduler service stopped");
    }

    /// Fire every trigger whose time has arrived.
    ///
    /// Each due trigger is handed to its own worker so a slow delivery
    /// never holds back the rest; the semaphore keeps the fan-out bounded.
    async fn fire_due(&self, inflight: &mut JoinSet<()>) {
        // Reap finished delivery tasks
        while inflight.try_join_next().is_some() {}

        let due = self.cache.due(Utc::now()).await;
        if due.is_empty() {
            return;
        }

        debug!(count = due.len(), "Triggers due this tick");

        for trigger in due {
            let cache = self.cache.clone();
            let notifier = self.config.notifier.clone();
            let channel_id = self.config.channel_id;
            let deliveries = self.deliveries.clone();

            inflight.spawn(async move {
                let _permit = match deliveries.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                fire_trigger(&cache, notifier.as_ref(), channel_id, &trigger.id).await;
            });
        }
    }
}

/// Claim and deliver a single trigger.
///
/// The claim is the at-most-once gate: whichever worker removes the record
/// delivers it. Delivery failure is logged and never retried; the trigger
/// stays removed either way.
async fn fire_trigger(
    cache: &TriggerCache,
    notifier: &dyn Notifier,
    channel_id: i64,
    trigger_id: &str,
) {
    let trigger = match cache.claim(trigger_id).await {
        Ok(Some(trigger)) => trigger,
        // Another worker won the claim
        Ok(None) => return,
        Err(e) => {
            warn!(trigger_id = %trigger_id, error = %e, "Failed to claim trigger");
            return;
        }
    };

    match notifier.send(channel_id, &trigger.payload).await {
        Ok(()) => info!(trigger_id = %trigger.id, "Notification delivered"),
        Err(e) => {
            error!(trigger_id = %trigger.id, error = %e, "Delivery failed, trigger dropped");
        }
    }
}

/// Advance-warning instant for a session start.
///
/// `None` when the configured offset pushes the instant outside the
/// representable range.
fn lead_fire_time(start_at: DateTime<Utc>, lead_hours: i64) -> Option<DateTime<Utc>> {
    let lead = chrono::Duration::try_hours(lead_hours)?;
    start_at.checked_sub_signed(lead)
}

// ============================================================================
// Message templates
// ============================================================================

/// Advance-warning text, frozen into the LEAD trigger's payload.
fn lead_message(
    session_name: &str,
    event_name: &str,
    lead_hours: i64,
    start_at: DateTime<Utc>,
) -> String {
    let local_start = start_at.with_timezone(&Local).format("%H:%M hs del %d/%m");
    format!(
        "🏎️ *¡Atención!* La sesión **{}** de **{}** comienza en {} horas (a las {}).",
        session_name, event_name, lead_hours, local_start
    )
}

/// Start announcement text, frozen into the START trigger's payload.
fn start_message(session_name: &str, event_name: &str) -> String {
    format!(
        "🟢 *¡Arrancó!* La sesión **{}** de **{}** ha comenzado.",
        session_name, event_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyError;
    use crate::store::FileTriggerStore;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct NullNotifier;

    #[async_trait]
    impl Notifier for NullNotifier {
        async fn send(&self, _channel_id: i64, _text: &str) -> std::result::Result<(), NotifyError> {
            Ok(())
        }
    }

    async fn start_test_scheduler(temp_dir: &TempDir, lead_hours: i64) -> SchedulerHandle {
        let store = Arc::new(FileTriggerStore::new(temp_dir.path().join("triggers")));
        SchedulerService::new(SchedulerConfig {
            store,
            notifier: Arc::new(NullNotifier),
            channel_id: -1001234,
            lead_hours,
            tick: DEFAULT_TICK,
        })
        .start()
        .await
        .unwrap()
    }

    /// Truncate to millisecond precision, matching the wire format.
    fn ms(at: DateTime<Utc>) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap()
    }

    fn test_session(id: &str, start_at: DateTime<Utc>) -> RaceSession {
        RaceSession {
            id: id.to_string(),
            name: "Clasificación".to_string(),
            start_at: start_at.timestamp_millis(),
        }
    }

    #[tokio::test]
    async fn schedules_lead_and_start_with_exact_fire_times() {
        let temp_dir = TempDir::new().unwrap();
        let handle = start_test_scheduler(&temp_dir, 8).await;

        let start = ms(Utc::now() + chrono::Duration::hours(10));
        let session = test_session("s1", start);

        let written = handle
            .schedule_session(&session, "GP de Mónaco")
            .await
            .unwrap();
        assert_eq!(written, 2);

        let lead_at = start - chrono::Duration::hours(8);
        let due_at_lead = handle.cache.due(lead_at).await;
        assert_eq!(due_at_lead.len(), 1);
        assert_eq!(due_at_lead[0].id, "s1_LEAD");
        assert_eq!(due_at_lead[0].fire_at, lead_at);

        let due_at_start = handle.cache.due(start).await;
        assert_eq!(due_at_start.len(), 2);
        let start_trigger = due_at_start.iter().find(|t| t.id == "s1_START").unwrap();
        assert_eq!(start_trigger.fire_at, start);
    }

    #[tokio::test]
    async fn scheduling_twice_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let handle = start_test_scheduler(&temp_dir, 8).await;

        let session = test_session("s1", ms(Utc::now() + chrono::Duration::hours(10)));

        handle.schedule_session(&session, "GP").await.unwrap();
        handle.schedule_session(&session, "GP").await.unwrap();

        assert_eq!(handle.pending_count().await, 2);
    }

    #[tokio::test]
    async fn past_session_creates_no_triggers() {
        let temp_dir = TempDir::new().unwrap();
        let handle = start_test_scheduler(&temp_dir, 8).await;

        let session = test_session("old", Utc::now() - chrono::Duration::seconds(1));

        let written = handle.schedule_session(&session, "GP").await.unwrap();
        assert_eq!(written, 0);
        assert_eq!(handle.pending_count().await, 0);
    }

    #[tokio::test]
    async fn lead_in_past_still_schedules_start() {
        let temp_dir = TempDir::new().unwrap();
        let handle = start_test_scheduler(&temp_dir, 8).await;

        // Start is 2h away, so the 8h lead window is already gone
        let session = test_session("s1", ms(Utc::now() + chrono::Duration::hours(2)));

        let written = handle.schedule_session(&session, "GP").await.unwrap();
        assert_eq!(written, 1);
        assert!(handle.is_scheduled("s1").await);
        assert!(!handle.cache.exists("s1_LEAD").await);
    }

    #[tokio::test]
    async fn unrepresentable_lead_offset_still_schedules_start() {
        let temp_dir = TempDir::new().unwrap();
        let handle = start_test_scheduler(&temp_dir, i64::MAX).await;

        let session = test_session("s1", ms(Utc::now() + chrono::Duration::hours(10)));

        let written = handle.schedule_session(&session, "GP").await.unwrap();
        assert_eq!(written, 1);
        assert!(handle.is_scheduled("s1").await);
        assert!(!handle.cache.exists("s1_LEAD").await);
    }

    #[tokio::test]
    async fn unrepresentable_start_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let handle = start_test_scheduler(&temp_dir, 8).await;

        let session = RaceSession {
            id: "weird".to_string(),
            name: "FP1".to_string(),
            start_at: i64::MAX,
        };

        let written = handle.schedule_session(&session, "GP").await.unwrap();
        assert_eq!(written, 0);
    }

    #[tokio::test]
    async fn payload_is_frozen_at_schedule_time() {
        let temp_dir = TempDir::new().unwrap();
        let handle = start_test_scheduler(&temp_dir, 8).await;

        let start = ms(Utc::now() + chrono::Duration::hours(10));
        let session = test_session("s1", start);
        handle
            .schedule_session(&session, "GP de Mónaco")
            .await
            .unwrap();

        let lead = handle
            .cache
            .claim("s1_LEAD")
            .await
            .unwrap()
            .expect("lead trigger must exist");
        assert!(lead.payload.contains("Clasificación"));
        assert!(lead.payload.contains("GP de Mónaco"));
        assert!(lead.payload.contains("8 horas"));

        // Claiming removed it
        assert!(!handle.cache.exists("s1_LEAD").await);
    }

    #[test]
    fn lead_message_format() {
        let start = Utc::now() + chrono::Duration::hours(10);
        let text = lead_message("Carrera", "GP de España", 8, start);

        assert!(text.starts_with("🏎️ *¡Atención!* La sesión **Carrera** de **GP de España**"));
        assert!(text.contains("comienza en 8 horas"));
        assert!(text.contains("hs del"));
    }

    #[test]
    fn start_message_format() {
        let text = start_message("Carrera", "GP de España");
        assert_eq!(
            text,
            "🟢 *¡Arrancó!* La sesión **Carrera** de **GP de España** ha comenzado."
        );
    }
}
