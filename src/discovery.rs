//! Session discovery loop.
//!
//! Bridges the race calendar to the scheduler: on a fixed interval (and on
//! demand via the bot), fetches upcoming sessions, skips the ones already
//! scheduled, and hands the new ones to the scheduler engine.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::races::{FetchError, RaceSource};
use crate::scheduler::SchedulerHandle;

// ============================================================================
// Public API
// ============================================================================

/// Handle for interacting with the discovery service.
#[derive(Clone)]
pub struct DiscoveryHandle {
    command_tx: mpsc::Sender<DiscoveryCommand>,
}

impl DiscoveryHandle {
    /// Request an immediate discovery pass, independent of the timer.
    pub async fn kick(&self) {
        let _ = self.command_tx.send(DiscoveryCommand::RunNow).await;
    }

    /// Shutdown the discovery loop.
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(DiscoveryCommand::Shutdown).await;
    }
}

/// Configuration for the discovery service.
pub struct DiscoveryConfig {
    /// Where sessions come from.
    pub source: Arc<dyn RaceSource>,
    /// Engine that receives new sessions.
    pub scheduler: SchedulerHandle,
    /// Category filter applied to fetched events.
    pub category_id: String,
    /// Forward window queried per pass, in days.
    pub days_ahead: i64,
    /// Periodic pass interval.
    pub interval: Duration,
}

/// Commands the loop reacts to.
enum DiscoveryCommand {
    RunNow,
    Shutdown,
}

/// Counts from one discovery pass.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Future sessions seen in the configured category.
    pub sessions_seen: usize,
    /// Sessions that were not yet scheduled and got triggers written.
    pub sessions_scheduled: usize,
    /// Total triggers written.
    pub triggers_written: usize,
}

/// The discovery service.
pub struct DiscoveryService {
    config: DiscoveryConfig,
}

impl DiscoveryService {
    /// Create a new discovery service.
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    /// Start the discovery loop.
    ///
    /// The interval's first tick fires immediately, so a fresh process runs
    /// a pass at boot instead of waiting a full interval. Afterwards the
    /// loop alternates between the timer and manual kicks; both paths are
    /// safe to overlap since scheduling is idempotent.
    pub fn start(self) -> DiscoveryHandle {
        let (command_tx, command_rx) = mpsc::channel(16);
        let handle = DiscoveryHandle { command_tx };

        tokio::spawn(run(self.config, command_rx));

        handle
    }
}

// ============================================================================
// Loop internals
// ============================================================================

/// Main service loop.
async fn run(config: DiscoveryConfig, mut command_rx: mpsc::Receiver<DiscoveryCommand>) {
    info!(
        interval_secs = config.interval.as_secs(),
        "Discovery loop started"
    );

    let mut tick = tokio::time::interval(config.interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tick.tick() => run_pass(&config).await,
            cmd = command_rx.recv() => match cmd {
                Some(DiscoveryCommand::RunNow) => run_pass(&config).await,
                Some(DiscoveryCommand::Shutdown) | None => {
                    info!("Discovery loop shutting down");
                    break;
                }
            },
        }
    }

    info!("Discovery loop stopped");
}

/// One pass with failure containment.
///
/// A fetch error degrades to "no sessions this round"; the loop lives to
/// try again at the next interval.
async fn run_pass(config: &DiscoveryConfig) {
    match run_once(config).await {
        Ok(report) => {
            if report.sessions_scheduled > 0 {
                info!(
                    seen = report.sessions_seen,
                    scheduled = report.sessions_scheduled,
                    triggers = report.triggers_written,
                    "Scheduled notifications for new sessions"
                );
            } else {
                info!(seen = report.sessions_seen, "No new sessions to schedule");
            }
        }
        Err(e) => warn!(error = %e, "Calendar fetch failed, retrying next cycle"),
    }
}

/// Run a single discovery pass.
///
/// Fetches the `[now, now + days_ahead]` window, filters to the configured
/// category, and schedules every future session that has no START trigger
/// yet. A storage failure for one session is logged and does not stop the
/// remaining sessions.
pub async fn run_once(config: &DiscoveryConfig) -> Result<DiscoveryReport, FetchError> {
    let now = Utc::now();
    // A window outside chrono's range degrades to "everything upcoming"
    let max = chrono::Duration::try_days(config.days_ahead)
        .and_then(|ahead| now.checked_add_signed(ahead))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    let races = config.source.fetch(now, max).await?;

    let mut report = DiscoveryReport::default();

    for race in races {
        if race.category_id != config.category_id {
            continue;
        }

        for session in &race.schedules {
            if session.id.is_empty() {
                debug!(event = %race.complete_name, "Session without id, skipping");
                continue;
            }

            let Some(start_at) = session.start_time() else {
                debug!(session_id = %session.id, "Session start not representable, skipping");
                continue;
            };

            // Only sessions that haven't started yet
            if start_at <= now {
                continue;
            }

            report.sessions_seen += 1;

            // START presence marks the session as already processed
            if config.scheduler.is_scheduled(&session.id).await {
                continue;
            }

            info!(
                session = %session.name,
                event = %race.complete_name,
                "New session found, scheduling notifications"
            );

            match config
                .scheduler
                .schedule_session(session, &race.complete_name)
                .await
            {
                Ok(written) => {
                    report.sessions_scheduled += 1;
                    report.triggers_written += written;
                }
                Err(e) => {
                    warn!(
                        session_id = %session.id,
                        error = %e,
                        "Failed to schedule session, will retry next pass"
                    );
                }
            }
        }
    }

    Ok(report)
}
