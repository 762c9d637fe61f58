//! Discord bot client abstraction.
//!
//! Provides a high-level interface for creating and running the Discord bot,
//! hiding serenity implementation details from the rest of the application.

use std::time::Duration;

use serenity::async_trait;
use serenity::gateway::{ConnectionStage, GatewayError, ShardStageUpdateEvent};
use serenity::http::{HttpBuilder, HttpError};
use serenity::model::channel::Message;
use serenity::model::event::ResumedEvent;
use serenity::model::gateway::{Presence, Ready};
use serenity::prelude::*;
use serenity::Client;

use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::common::error::AuthError;
use crate::common::reconnect::ReconnectPolicy;
use crate::common::{ConnectionState, DiscordAction};
use crate::config::relay::DiscordSettings;
use crate::discord::handler::RelayHandler;
use crate::discord::outbox;
use crate::relay::channels::{shutdown_requested, DiscordSideChannels};

#[derive(Debug, Clone)]
pub enum DiscordBotEvent {
    /// Bot connected and ready.
    Ready { context: Context, ready: Ready },
    /// Message received.
    Message { context: Context, message: Message },
    /// A member's presence changed.
    Presence { context: Context, presence: Presence },
    /// The gateway session moved to a new state.
    State(ConnectionState),
}

struct DiscordBotEvents {
    discord_events_tx: mpsc::UnboundedSender<DiscordBotEvent>,
}

impl DiscordBotEvents {
    fn new(discord_events_tx: mpsc::UnboundedSender<DiscordBotEvent>) -> Self {
        Self { discord_events_tx }
    }

    fn send(&self, event: DiscordBotEvent) {
        if let Err(error) = self.discord_events_tx.send(event) {
            warn!("Failed to process discord event: {}", error);
        }
    }
}

#[async_trait]
impl EventHandler for DiscordBotEvents {
    async fn ready(&self, context: Context, ready: Ready) {
        self.send(DiscordBotEvent::Ready { context, ready });
    }

    async fn resume(&self, _context: Context, _event: ResumedEvent) {
        info!("Discord session resumed");
        self.send(DiscordBotEvent::State(ConnectionState::Ready));
    }

    async fn message(&self, context: Context, message: Message) {
        self.send(DiscordBotEvent::Message { context, message });
    }

    async fn presence_update(&self, context: Context, presence: Presence) {
        self.send(DiscordBotEvent::Presence { context, presence });
    }

    async fn shard_stage_update(&self, _context: Context, event: ShardStageUpdateEvent) {
        debug!(shard = %event.shard_id, old = ?event.old, new = ?event.new, "Shard stage changed");
        self.send(DiscordBotEvent::State(stage_to_state(event.new)));
    }
}

/// Map a gateway stage onto the relay's connection states.
pub fn stage_to_state(stage: ConnectionStage) -> ConnectionState {
    match stage {
        ConnectionStage::Connected => ConnectionState::Ready,
        ConnectionStage::Connecting | ConnectionStage::Handshake => ConnectionState::Connecting,
        ConnectionStage::Identifying => ConnectionState::Authenticating,
        ConnectionStage::Resuming => ConnectionState::Reconnecting(Duration::ZERO),
        _ => ConnectionState::Disconnected,
    }
}

/// Whether serenity gave up because the token is bad.
fn is_invalid_token(error: &serenity::Error) -> bool {
    match error {
        serenity::Error::Gateway(GatewayError::InvalidAuthentication) => true,
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) => {
            response.status_code.as_u16() == 401
        }
        _ => false,
    }
}

/// Builder for creating the Discord bot.
pub struct DiscordBotBuilder {
    settings: DiscordSettings,
    channels: DiscordSideChannels,
}

impl DiscordBotBuilder {
    pub fn new(settings: DiscordSettings, channels: DiscordSideChannels) -> Self {
        Self { settings, channels }
    }

    /// Build the Discord bot.
    pub async fn build(self) -> anyhow::Result<DiscordBot> {
        let (discord_events_tx, discord_events_rx) = mpsc::unbounded_channel::<DiscordBotEvent>();

        let intents = intents(self.settings.streaming_role.is_some());
        let client = build_client(self.settings.token.expose(), intents, discord_events_tx.clone()).await?;

        let handler = RelayHandler::new(self.channels.events_tx, self.settings.streaming_role.clone());

        Ok(DiscordBot {
            client: Some(client),
            settings: self.settings,
            intents,
            handler,
            discord_events_rx,
            discord_events_tx,
            actions_rx: self.channels.actions_rx,
            shutdown_rx: self.channels.shutdown_rx,
        })
    }
}

fn intents(streaming_role: bool) -> GatewayIntents {
    let base = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILDS;

    if streaming_role {
        base | GatewayIntents::GUILD_MEMBERS | GatewayIntents::GUILD_PRESENCES
    } else {
        base
    }
}

async fn build_client(
    token: &str,
    intents: GatewayIntents,
    discord_events_tx: mpsc::UnboundedSender<DiscordBotEvent>,
) -> anyhow::Result<Client> {
    // Build a custom reqwest client with timeout settings
    let reqwest_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    // Build the Serenity HTTP client with our custom reqwest client
    let http = HttpBuilder::new(token).client(reqwest_client).build();

    let events = DiscordBotEvents::new(discord_events_tx);
    let client = serenity::client::ClientBuilder::new_with_http(http, intents)
        .event_handler(events)
        .await?;
    Ok(client)
}

pub struct DiscordBot {
    client: Option<Client>,
    settings: DiscordSettings,
    intents: GatewayIntents,
    handler: RelayHandler,
    discord_events_rx: mpsc::UnboundedReceiver<DiscordBotEvent>,
    discord_events_tx: mpsc::UnboundedSender<DiscordBotEvent>,
    actions_rx: mpsc::UnboundedReceiver<DiscordAction>,
    shutdown_rx: watch::Receiver<bool>,
}

impl DiscordBot {
    /// Run until shutdown. Only a rejected token ends this with an error.
    pub async fn run(mut self) -> Result<(), AuthError> {
        // Extract shard manager before we move client into run_connection
        let shard_manager = self.client.as_ref().map(|c| c.shard_manager.clone());
        let client = &mut self.client;
        let shutdown_rx = &mut self.shutdown_rx;
        let actions_rx = self.actions_rx;
        let (context_tx, context_rx) = watch::channel(None::<Context>);

        let result = tokio::select! {
            result = Self::run_connection(client, &self.settings, self.intents, &self.discord_events_tx) => result,
            _ = Self::process_events(&mut self.discord_events_rx, &self.handler, &context_tx) => Ok(()),
            _ = async {
                outbox::run(actions_rx, context_rx).await;
                // The router is gone; keep the gateway up until shutdown.
                std::future::pending::<()>().await
            } => Ok(()),
            _ = async {
                shutdown_requested(shutdown_rx).await;
                // Gracefully shutdown Discord gateway
                if let Some(ref manager) = shard_manager {
                    info!("Initiating graceful Discord shutdown...");
                    manager.shutdown_all().await;
                    info!("Discord shutdown complete");
                }
            } => Ok(()),
        };

        self.handler.publish_state(ConnectionState::Disconnected);
        info!("Discord task ended");
        result
    }

    async fn run_connection(
        client: &mut Option<Client>,
        settings: &DiscordSettings,
        intents: GatewayIntents,
        discord_events_tx: &mpsc::UnboundedSender<DiscordBotEvent>,
    ) -> Result<(), AuthError> {
        let policy = ReconnectPolicy::default();
        let mut backoff = policy.backoff();

        loop {
            info!("Connecting to Discord...");

            let mut client = match client.take() {
                Some(client) => client,
                None => {
                    // serenity mostly handles reconnections itself.
                    match build_client(settings.token.expose(), intents, discord_events_tx.clone()).await {
                        Ok(client) => client,
                        Err(e) => {
                            error!("Failed to rebuild Discord client: {}", e);
                            let delay = policy.next_delay(&mut backoff);
                            warn!("Retrying in {:.1}s...", delay.as_secs_f64());
                            sleep(delay).await;
                            continue;
                        }
                    }
                }
            };

            // Run the client
            let result = client.start().await;
            if let Err(error) = discord_events_tx.send(DiscordBotEvent::State(ConnectionState::Disconnected)) {
                warn!("Failed to process discord event: {}", error);
            }

            match result {
                Ok(()) => {
                    info!("Discord client disconnected normally");
                    return Ok(());
                }
                Err(e) if is_invalid_token(&e) => {
                    error!(error = %e, "Discord rejected the bot token");
                    return Err(AuthError::InvalidToken);
                }
                Err(e) => {
                    error!("Discord client error: {}", e);
                    let delay = policy.next_delay(&mut backoff);
                    warn!(
                        "Discord disconnected. Reconnecting in {:.1}s...",
                        delay.as_secs_f64(),
                    );
                    if let Err(error) =
                        discord_events_tx.send(DiscordBotEvent::State(ConnectionState::Reconnecting(delay)))
                    {
                        warn!("Failed to process discord event: {}", error);
                    }
                    sleep(delay).await;
                }
            }
        }
    }

    /// Forward gateway events. Nothing in here awaits Discord's REST API;
    /// router output goes through [`outbox::run`] with the context published
    /// on `context_tx`.
    async fn process_events(
        discord_events_rx: &mut mpsc::UnboundedReceiver<DiscordBotEvent>,
        handler: &RelayHandler,
        context_tx: &watch::Sender<Option<Context>>,
    ) {
        while let Some(event) = discord_events_rx.recv().await {
            match event {
                DiscordBotEvent::Ready { context, ready } => {
                    info!("Discord bot connected as {}", ready.user.name);
                    handler.publish_state(ConnectionState::Ready);
                    context_tx.send_replace(Some(context));
                }
                DiscordBotEvent::Message { context, message } => {
                    handler.handle_message(&context, message);
                }
                DiscordBotEvent::Presence { context, presence } => {
                    handler.handle_presence(&context, presence);
                }
                DiscordBotEvent::State(state) => handler.publish_state(state),
            }
        }
        debug!("Discord events channel closed.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_mapping() {
        assert_eq!(stage_to_state(ConnectionStage::Connected), ConnectionState::Ready);
        assert_eq!(stage_to_state(ConnectionStage::Handshake), ConnectionState::Connecting);
        assert_eq!(stage_to_state(ConnectionStage::Identifying), ConnectionState::Authenticating);
        assert!(matches!(
            stage_to_state(ConnectionStage::Resuming),
            ConnectionState::Reconnecting(_)
        ));
        assert_eq!(stage_to_state(ConnectionStage::Disconnected), ConnectionState::Disconnected);
    }

    #[test]
    fn test_presence_intent_only_with_streaming_role() {
        assert!(intents(true).contains(GatewayIntents::GUILD_PRESENCES));
        assert!(!intents(false).contains(GatewayIntents::GUILD_PRESENCES));
        assert!(intents(false).contains(GatewayIntents::MESSAGE_CONTENT));
    }

    #[test]
    fn test_invalid_authentication_is_fatal() {
        let error = serenity::Error::Gateway(GatewayError::InvalidAuthentication);
        assert!(is_invalid_token(&error));
        let error = serenity::Error::Gateway(GatewayError::InvalidShardData);
        assert!(!is_invalid_token(&error));
    }
}
