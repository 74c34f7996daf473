//! One-shot calendar check command.

use std::sync::Arc;

use anyhow::Result;

use gridwatch::bot;
use gridwatch::config::Config;
use gridwatch::discovery::{self, DiscoveryConfig};
use gridwatch::notify::TelegramNotifier;
use gridwatch::races::HttpRaceSource;
use gridwatch::scheduler::{DEFAULT_TICK, SchedulerConfig, SchedulerService};
use gridwatch::store::FileTriggerStore;

/// Run a single discovery pass and print what was scheduled.
///
/// Triggers that are already due fire during the pass, exactly as they
/// would right after a daemon restart. The closing shutdown waits for
/// those deliveries, so nothing claimed is dropped on exit.
pub async fn run() -> Result<()> {
    let config = Config::from_env()?;

    let bot = bot::build_bot(&config.telegram_token);

    let scheduler_config = SchedulerConfig {
        store: Arc::new(FileTriggerStore::new(config.state_dir.join("triggers"))),
        notifier: Arc::new(TelegramNotifier::new(bot)),
        channel_id: config.channel_id,
        lead_hours: config.lead_hours,
        tick: DEFAULT_TICK,
    };
    let scheduler = SchedulerService::new(scheduler_config).start().await?;

    let discovery_config = DiscoveryConfig {
        source: Arc::new(HttpRaceSource::new(config.api_url.clone())),
        scheduler: scheduler.clone(),
        category_id: config.category_id.clone(),
        days_ahead: config.api_days_ahead,
        interval: config.check_interval(),
    };

    let report = discovery::run_once(&discovery_config).await?;

    // Shut down first: the count below is only stable once every in-flight
    // delivery has claimed its trigger and finished.
    scheduler.shutdown().await;
    let pending = scheduler.pending_count().await;

    println!(
        "Sessions seen: {}, newly scheduled: {}, triggers written: {}, pending: {}",
        report.sessions_seen, report.sessions_scheduled, report.triggers_written, pending,
    );
    Ok(())
}
