//! Discord event handling.
//!
//! Turns gateway events into router events. Nothing here decides what
//! gets relayed; that is the router's job.

use serenity::model::channel::Message;
use serenity::model::gateway::Presence;
use serenity::prelude::*;
use tokio::sync::mpsc;
use tracing::debug;

use crate::common::{Backend, ConnectionState, InboundMessage, RelayEvent, StateTracker};
use crate::discord::presence::StreamingRole;
use crate::discord::resolver::CommandTextResolver;
use crate::relay::commands;

/// Trim a message and rewrite Discord markup for IRC.
///
/// Built-in commands are left alone so a `<@id>` target survives for the
/// access checks. Returns `None` for empty messages.
pub fn prepare_content(raw: &str, resolve: impl FnOnce(&str) -> String) -> Option<String> {
    let content = raw.trim();
    if content.is_empty() {
        return None;
    }
    if commands::parse(content).is_some() {
        Some(content.to_string())
    } else {
        Some(resolve(content))
    }
}

pub struct RelayHandler {
    events_tx: mpsc::UnboundedSender<RelayEvent>,
    resolver: CommandTextResolver,
    streaming_role: Option<StreamingRole>,
    state: StateTracker,
}

impl RelayHandler {
    pub fn new(events_tx: mpsc::UnboundedSender<RelayEvent>, streaming_role: Option<String>) -> Self {
        Self {
            events_tx,
            resolver: CommandTextResolver::new(),
            streaming_role: streaming_role.map(StreamingRole::new),
            state: StateTracker::new(Backend::Discord),
        }
    }

    pub fn handle_message(&self, ctx: &Context, msg: Message) {
        // Ignore our own messages
        if msg.author.id == ctx.cache.current_user().id {
            return;
        }

        // Ignore bots
        if msg.author.bot {
            return;
        }

        let Some(content) = prepare_content(&msg.content, |text| {
            self.resolver.resolve(text, &ctx.cache)
        }) else {
            return;
        };

        self.forward(RelayEvent::Discord(InboundMessage {
            user_id: msg.author.id.get(),
            user_name: msg.author.name.clone(),
            channel_id: msg.channel_id.get(),
            guild_id: msg.guild_id.map(|id| id.get()),
            content,
        }));
    }

    /// Role updates take a few REST calls, so they run on their own task.
    pub fn handle_presence(&self, ctx: &Context, presence: Presence) {
        if let Some(role) = self.streaming_role.clone() {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                role.on_presence(&ctx, &presence).await;
            });
        }
    }

    pub fn publish_state(&self, state: ConnectionState) {
        self.state.set(state);
        self.forward(RelayEvent::DiscordState(state));
    }

    fn forward(&self, event: RelayEvent) {
        if let Err(e) = self.events_tx.send(event) {
            debug!("Router channel closed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_content_resolves_relayed_text() {
        let prepared = prepare_content("  !lg <@42>  ", |text| text.replace("<@42>", "gammafunk"));
        assert_eq!(prepared.as_deref(), Some("!lg gammafunk"));
    }

    #[test]
    fn test_prepare_content_keeps_builtin_targets() {
        let prepared = prepare_content("!addrole <@42> Tourney", |_| panic!("must not resolve"));
        assert_eq!(prepared.as_deref(), Some("!addrole <@42> Tourney"));
    }

    #[test]
    fn test_prepare_content_skips_empty() {
        assert!(prepare_content("   ", |text| text.to_string()).is_none());
    }

    #[test]
    fn test_publish_state() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = RelayHandler::new(tx, None);
        handler.publish_state(ConnectionState::Ready);
        assert!(matches!(
            rx.try_recv().unwrap(),
            RelayEvent::DiscordState(ConnectionState::Ready)
        ));
    }
}
