//! Cerebot - Discord-IRC relay for the DCSS knowledge bots
//!
//! Relays `!`, `??` and similar commands typed in Discord to Sequell,
//! Gretell, Cheibriados and friends over IRC, and posts their replies back.

mod common;
mod config;
mod discord;
mod irc;
mod relay;

use anyhow::Result;
use tokio::signal;
use tracing::{debug, error, info, warn};

use config::{get_config_path, load_and_validate};
use discord::DiscordBotBuilder;
use irc::IrcSession;
use relay::{ChannelBundle, Router};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Cerebot v{} starting...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = get_config_path();
    info!("Loading configuration from {}...", config_path);

    let config = match load_and_validate(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("Please ensure {} exists and is properly formatted.", config_path);
            std::process::exit(1);
        }
    };

    info!("  IRC server: {}:{}", config.irc.hostname, config.irc.port);
    info!("  IRC nick: {}", config.irc.nick);
    info!("  TLS: {}", config.irc.use_ssl);
    info!("  SASL: {}", config.irc.sasl.is_some());
    for bot in config.bots.iter() {
        info!("  Bot: {}", bot.nick);
    }

    // ============================================================
    // Create channels for communication
    // ============================================================
    let channels = ChannelBundle::new();
    let shutdown_tx = channels.control.shutdown_tx;

    // ============================================================
    // Spawn tasks
    // ============================================================
    let router = Router::new(&config, channels.router.irc_tx, channels.router.discord_tx);
    let router_shutdown = channels.router.shutdown_rx;
    let router_events = channels.router.events_rx;
    let mut router_task = tokio::spawn(router.run(router_events, router_shutdown));

    let session = IrcSession::new(config.irc.clone(), channels.irc);
    let mut irc_task = tokio::spawn(session.run());

    info!("Starting Discord bot...");
    let discord_bot = DiscordBotBuilder::new(config.discord.clone(), channels.discord)
        .build()
        .await?;
    let mut discord_task = tokio::spawn(discord_bot.run());

    // ============================================================
    // Run until a signal or a fatal task exit
    // ============================================================
    let mut fatal = false;
    tokio::select! {
        biased;
        _ = shutdown_signal() => {
            info!("Shutdown signal received - closing connections...");
        }
        result = &mut irc_task => {
            match result {
                Ok(Ok(())) => info!("IRC session ended"),
                Ok(Err(e)) => {
                    error!("IRC session stopped: {}", e);
                    fatal = e.is_fatal();
                }
                Err(e) => {
                    error!("IRC task panicked: {}", e);
                    fatal = true;
                }
            }
        }
        result = &mut discord_task => {
            match result {
                Ok(Ok(())) => info!("Discord bot ended"),
                Ok(Err(e)) => {
                    error!("Discord bot stopped: {}", e);
                    fatal = true;
                }
                Err(e) => {
                    error!("Discord task panicked: {}", e);
                    fatal = true;
                }
            }
        }
        _ = &mut router_task => {
            warn!("Relay router stopped unexpectedly");
            fatal = true;
        }
    }

    // Stop everything still running (fire-and-forget - a closed channel means every task is gone)
    if let Err(e) = shutdown_tx.send(true) {
        debug!("Shutdown channel closed: {}", e);
    }

    let timeout = tokio::time::Duration::from_secs(5);
    let drain = async {
        if !irc_task.is_finished() {
            match (&mut irc_task).await {
                Ok(_) => info!("IRC session closed"),
                Err(e) => warn!("IRC task panicked: {}", e),
            }
        }
        if !discord_task.is_finished() {
            if let Err(e) = (&mut discord_task).await {
                warn!("Discord task panicked: {}", e);
            }
        }
        if !router_task.is_finished() {
            if let Err(e) = (&mut router_task).await {
                warn!("Router task panicked: {}", e);
            }
        }
    };
    if tokio::time::timeout(timeout, drain).await.is_err() {
        warn!("Graceful shutdown timed out");
    }

    info!("Exiting...");
    if fatal {
        std::process::exit(1);
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
