//! Telegram command surface.
//!
//! Listens for operator commands in chats the bot participates in:
//! `/start` (greet and force a discovery pass), `/check` (force a pass)
//! and `/status` (pending trigger count). Channel notifications themselves
//! go out through [`crate::notify::TelegramNotifier`], not through this
//! dispatcher.

use teloxide::dispatching::ShutdownToken;
use teloxide::prelude::*;
use teloxide::update_listeners::Polling;
use tracing::{info, warn};

use crate::discovery::DiscoveryHandle;
use crate::scheduler::SchedulerHandle;

/// Build the bot client with sane network timeouts.
pub fn build_bot(token: &str) -> Bot {
    // Client timeout must exceed the long-polling timeout
    let client = teloxide::net::default_reqwest_settings()
        .timeout(std::time::Duration::from_secs(60))
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()
        .expect("failed to build HTTP client");
    Bot::with_client(token, client)
}

/// Start the command dispatcher.
///
/// Returns the dispatcher's shutdown token and the join handle of the
/// dispatch task.
pub fn start(
    bot: Bot,
    discovery: DiscoveryHandle,
    scheduler: SchedulerHandle,
) -> (ShutdownToken, tokio::task::JoinHandle<()>) {
    let handler = Update::filter_message().endpoint({
        move |bot: Bot, msg: Message| {
            let discovery = discovery.clone();
            let scheduler = scheduler.clone();
            async move {
                if let Err(e) = handle_message(&bot, &msg, &discovery, &scheduler).await {
                    warn!(error = %e, "Failed to handle command");
                }
                respond(())
            }
        }
    });

    let mut dispatcher = Dispatcher::builder(bot.clone(), handler).build();
    let shutdown_token = dispatcher.shutdown_token();

    let polling = Polling::builder(bot)
        .timeout(std::time::Duration::from_secs(30))
        .build();

    let task = tokio::spawn(async move {
        info!("Command dispatcher started");
        dispatcher
            .dispatch_with_listener(
                polling,
                teloxide::error_handlers::LoggingErrorHandler::with_custom_text(
                    "Telegram polling error (will retry)",
                ),
            )
            .await;
        info!("Command dispatcher stopped");
    });

    (shutdown_token, task)
}

async fn handle_message(
    bot: &Bot,
    msg: &Message,
    discovery: &DiscoveryHandle,
    scheduler: &SchedulerHandle,
) -> Result<(), teloxide::RequestError> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    match command_token(text) {
        "/start" => {
            let first_name = msg
                .from
                .as_ref()
                .map(|u| u.first_name.as_str())
                .unwrap_or("piloto");
            info!(user = first_name, "Received /start, forcing calendar check");
            bot.send_message(
                msg.chat.id,
                format!(
                    "¡Hola, {}! Soy el bot de notificaciones de F1. \
                     Estoy activo y publicaré los avisos en el canal configurado.",
                    first_name
                ),
            )
            .await?;
            discovery.kick().await;
        }
        "/check" => {
            info!("Received /check, forcing calendar check");
            bot.send_message(msg.chat.id, "Revisando el calendario ahora mismo.")
                .await?;
            discovery.kick().await;
        }
        "/status" => {
            let pending = scheduler.pending_count().await;
            bot.send_message(msg.chat.id, format!("Avisos pendientes: {}", pending))
                .await?;
        }
        _ => {}
    }

    Ok(())
}

/// First token of a message with any `@botname` suffix stripped, so
/// `/check@gridwatch_bot args` matches `/check`.
fn command_token(text: &str) -> &str {
    let token = text.split_whitespace().next().unwrap_or_default();
    token.split('@').next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_command() {
        assert_eq!(command_token("/start"), "/start");
        assert_eq!(command_token("/check now"), "/check");
    }

    #[test]
    fn strips_bot_mention() {
        assert_eq!(command_token("/status@gridwatch_bot"), "/status");
    }

    #[test]
    fn non_command_text_passes_through() {
        assert_eq!(command_token("hola"), "hola");
        assert_eq!(command_token(""), "");
    }
}
