//! Delivery of router output to Discord.
//!
//! Runs beside the gateway event loop so a slow REST call never holds up
//! inbound messages.

use std::future::Future;

use serenity::builder::{CreateAllowedMentions, CreateMessage};
use serenity::model::channel::Message;
use serenity::model::id::ChannelId;
use serenity::prelude::*;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error};

use crate::common::error::DiscordError;
use crate::common::DiscordAction;
use crate::discord::commands;

/// Post `content` to a channel. Only user mentions may ping.
pub async fn post(ctx: &Context, channel_id: u64, content: &str) -> Result<Message, DiscordError> {
    let message = CreateMessage::new()
        .content(content)
        .allowed_mentions(CreateAllowedMentions::new().all_users(true));

    ChannelId::new(channel_id)
        .send_message(&ctx.http, message)
        .await
        .map_err(|source| DiscordError::SendFailed { channel_id, source })
}

/// Carry out one action. Failures are logged; the next action still runs.
pub async fn deliver(ctx: &Context, action: DiscordAction) {
    match action {
        DiscordAction::Post { channel_id, content } => match post(ctx, channel_id, &content).await {
            Ok(_) => debug!(channel = channel_id, "Posted to Discord"),
            Err(e) => error!(error = %e, "Failed to post to Discord"),
        },
        DiscordAction::Builtin(invocation) => {
            let command = invocation.command.name();
            if let Err(e) = commands::run(ctx, invocation).await {
                error!(command, error = %e, "Built-in command failed");
            }
        }
    }
}

/// Deliver actions in arrival order with the current gateway context.
/// Actions that arrive while Discord is not connected are dropped.
pub async fn run(
    actions_rx: mpsc::UnboundedReceiver<DiscordAction>,
    context_rx: watch::Receiver<Option<Context>>,
) {
    pump(actions_rx, context_rx, |ctx, action| async move { deliver(&ctx, action).await }).await;
}

async fn pump<C, F, Fut>(
    mut actions_rx: mpsc::UnboundedReceiver<DiscordAction>,
    context_rx: watch::Receiver<Option<C>>,
    mut send: F,
) where
    C: Clone,
    F: FnMut(C, DiscordAction) -> Fut,
    Fut: Future<Output = ()>,
{
    while let Some(action) = actions_rx.recv().await {
        let context = context_rx.borrow().clone();
        match context {
            Some(context) => send(context, action).await,
            None => debug!("Dropping Discord action - Discord not connected"),
        }
    }
    debug!("Discord action channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn post_action(channel_id: u64, content: &str) -> DiscordAction {
        DiscordAction::Post {
            channel_id,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_pump_drops_until_connected_then_keeps_order() {
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let (context_tx, context_rx) = watch::channel(None::<u32>);
        let delivered = Arc::new(Mutex::new(Vec::new()));

        let sink = delivered.clone();
        let task = tokio::spawn(pump(actions_rx, context_rx, move |context, action| {
            let sink = sink.clone();
            async move {
                if let DiscordAction::Post { channel_id, content } = action {
                    sink.lock().unwrap().push((context, channel_id, content));
                }
            }
        }));

        actions_tx.send(post_action(10, "before ready")).unwrap();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        context_tx.send(Some(1)).unwrap();
        actions_tx.send(post_action(20, "first")).unwrap();
        actions_tx.send(post_action(30, "second")).unwrap();
        drop(actions_tx);
        task.await.unwrap();

        assert_eq!(
            *delivered.lock().unwrap(),
            vec![(1, 20, "first".to_string()), (1, 30, "second".to_string())]
        );
    }

    #[tokio::test]
    async fn test_pump_waits_for_each_delivery() {
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let (_context_tx, context_rx) = watch::channel(Some(()));
        let log = Arc::new(Mutex::new(Vec::new()));

        let sink = log.clone();
        let task = tokio::spawn(pump(actions_rx, context_rx, move |_, action| {
            let sink = sink.clone();
            async move {
                if let DiscordAction::Post { channel_id, .. } = action {
                    sink.lock().unwrap().push(format!("start {}", channel_id));
                    tokio::task::yield_now().await;
                    sink.lock().unwrap().push(format!("end {}", channel_id));
                }
            }
        }));

        actions_tx.send(post_action(1, "a")).unwrap();
        actions_tx.send(post_action(2, "b")).unwrap();
        drop(actions_tx);
        task.await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["start 1", "end 1", "start 2", "end 2"]);
    }
}
