//! Daemon command implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};

use gridwatch::bot;
use gridwatch::config::Config;
use gridwatch::discovery::{DiscoveryConfig, DiscoveryService};
use gridwatch::notify::TelegramNotifier;
use gridwatch::races::HttpRaceSource;
use gridwatch::scheduler::{DEFAULT_TICK, SchedulerConfig, SchedulerService};
use gridwatch::server::{self, AppState};
use gridwatch::store::FileTriggerStore;

pub async fn run() -> Result<()> {
    let config = Config::from_env()?;

    let bot = bot::build_bot(&config.telegram_token);

    // Scheduler first: it recovers persisted triggers before anything can
    // produce new ones.
    let scheduler_config = SchedulerConfig {
        store: Arc::new(FileTriggerStore::new(config.state_dir.join("triggers"))),
        notifier: Arc::new(TelegramNotifier::new(bot.clone())),
        channel_id: config.channel_id,
        lead_hours: config.lead_hours,
        tick: DEFAULT_TICK,
    };
    let scheduler = SchedulerService::new(scheduler_config).start().await?;
    info!("Scheduler service started");

    let discovery_config = DiscoveryConfig {
        source: Arc::new(HttpRaceSource::new(config.api_url.clone())),
        scheduler: scheduler.clone(),
        category_id: config.category_id.clone(),
        days_ahead: config.api_days_ahead,
        interval: config.check_interval(),
    };
    let discovery = DiscoveryService::new(discovery_config).start();
    info!("Discovery service started");

    let (dispatcher_shutdown, dispatcher_task) =
        bot::start(bot, discovery.clone(), scheduler.clone());
    info!("Telegram dispatcher started");

    let app = server::build_app(AppState {
        scheduler: scheduler.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(addr = %addr, "Starting health server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop producing triggers before stopping delivery.
    discovery.shutdown().await;
    scheduler.shutdown().await;
    match dispatcher_shutdown.shutdown() {
        Ok(done) => done.await,
        Err(e) => warn!("Telegram dispatcher already stopped: {}", e),
    }
    let _ = dispatcher_task.await;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
